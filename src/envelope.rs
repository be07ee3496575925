//! The uniform response envelope every dispatch resolves to.
//!
//! Ordinary failures are data, not errors: connectivity loss, non-success
//! statuses, and malformed bodies all normalize into a structurally complete
//! [`Envelope`] with `success: false`. Callers branch on the flag instead of
//! matching error types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::TransportError;
use crate::http::request_id_from_headers;

/// Uniform result of a dispatched request.
///
/// Exactly one of the following holds: `data` is populated (`success: true`),
/// or `message`/`errors` describe the failure (`success: false`). The
/// structure is complete on every code path, whichever produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub meta: EnvelopeMeta,
    /// Field or category name mapped to its failure messages.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, Vec<String>>,
}

/// Request metadata carried on every envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeMeta {
    #[serde(default)]
    pub request_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// HTTP status code, absent when none was derivable (transport failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl Default for EnvelopeMeta {
    fn default() -> Self {
        Self {
            request_id: String::new(),
            timestamp: Utc::now(),
            code: None,
        }
    }
}

impl Envelope {
    /// Normalize a transport response into an envelope.
    ///
    /// `204` synthesizes an empty success without touching the body. A 2xx
    /// body is returned as parsed; any other status is folded into a failure
    /// using the richest message source available (body errors map > body
    /// message > status text). A body that fails to parse never raises.
    pub(crate) fn from_response(
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        explicit_request_id: Option<&str>,
    ) -> Self {
        if status == StatusCode::NO_CONTENT {
            let mut envelope = Self {
                success: true,
                message: String::new(),
                data: Value::Null,
                meta: EnvelopeMeta::default(),
                errors: BTreeMap::new(),
            };
            envelope.complete_meta(Some(status), Some(headers), explicit_request_id);
            return envelope;
        }

        let parsed = serde_json::from_slice::<Envelope>(body).ok();

        let mut envelope = if status.is_success() {
            match parsed {
                Some(envelope) => envelope,
                None => Self::failure(
                    "response body was not a valid envelope".to_string(),
                    BTreeMap::new(),
                ),
            }
        } else {
            match parsed {
                Some(parsed) => {
                    let message = if parsed.message.trim().is_empty() {
                        status_text(status)
                    } else {
                        parsed.message
                    };
                    let mut failure = Self::failure(message, parsed.errors);
                    failure.meta = parsed.meta;
                    failure
                }
                None => Self::failure(status_text(status), BTreeMap::new()),
            }
        };

        envelope.complete_meta(Some(status), Some(headers), explicit_request_id);
        envelope
    }

    /// Normalize a transport-level failure. No status metadata is available.
    pub(crate) fn from_transport_error(
        err: &TransportError,
        explicit_request_id: Option<&str>,
    ) -> Self {
        let mut envelope = Self::failure(err.to_string(), BTreeMap::new());
        envelope.complete_meta(None, None, explicit_request_id);
        envelope
    }

    /// Failure produced by the dispatcher itself, before any transport call
    /// (unresolvable path, unencodable header).
    pub(crate) fn internal_failure(
        message: impl Into<String>,
        explicit_request_id: Option<&str>,
    ) -> Self {
        let mut envelope = Self::failure(message.into(), BTreeMap::new());
        envelope.complete_meta(None, None, explicit_request_id);
        envelope
    }

    fn failure(message: String, errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            success: false,
            message,
            data: Value::Null,
            meta: EnvelopeMeta::default(),
            errors,
        }
    }

    /// Fill whatever metadata the response path left blank: a request id from
    /// the body, else the response header, else the caller's, else a fresh
    /// one; and the status code when one was derivable.
    fn complete_meta(
        &mut self,
        status: Option<StatusCode>,
        headers: Option<&HeaderMap>,
        explicit_request_id: Option<&str>,
    ) {
        if self.meta.request_id.trim().is_empty() {
            self.meta.request_id = headers
                .and_then(request_id_from_headers)
                .or_else(|| {
                    explicit_request_id
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| Uuid::new_v4().to_string());
        }
        if self.meta.code.is_none() {
            self.meta.code = status.map(|s| s.as_u16());
        }
    }
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}
