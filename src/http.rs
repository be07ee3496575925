use std::time::{Duration, SystemTime};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Serialize;

use crate::errors::Result;
use crate::REQUEST_ID_HEADER;

/// Throttle retry configuration.
///
/// A `429 Too Many Requests` response is retried up to `max_retries` times.
/// The wait before each retry honors the server's `Retry-After` hint when one
/// is present; otherwise the delay grows linearly as
/// `base_backoff * (attempt + 1)`.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Wait interval before throttle retry number `attempt` (0-indexed).
    pub(crate) fn throttle_delay(
        &self,
        headers: &HeaderMap,
        attempt: u32,
        now: SystemTime,
    ) -> Duration {
        parse_retry_after(headers, now)
            .unwrap_or_else(|| self.base_backoff.saturating_mul(attempt + 1))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(300),
        }
    }
}

/// Parse a `Retry-After` header as whole seconds or an HTTP-date.
///
/// A date in the past yields `Duration::ZERO`; an absent or unparseable value
/// yields `None` so the caller can fall back to its own schedule.
pub(crate) fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let raw_value = value.to_str().ok()?.trim();
    if let Ok(seconds) = raw_value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(raw_value).ok()?;
    match date.duration_since(now) {
        Ok(duration) => Some(duration),
        Err(_) => Some(Duration::ZERO),
    }
}

/// Request payload accepted by every dispatching verb.
///
/// JSON values are serialized and tagged `application/json`; raw text and
/// opaque byte payloads are sent untouched, with at most the content type the
/// caller supplied. Every variant is cloneable so retry attempts re-send the
/// identical payload.
#[derive(Clone, Debug)]
pub enum Body {
    Json(serde_json::Value),
    Text(String),
    Bytes {
        content_type: Option<String>,
        data: Vec<u8>,
    },
}

impl Body {
    /// Serialize any `Serialize` payload into a JSON body.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(payload)?))
    }

    pub fn text(payload: impl Into<String>) -> Self {
        Self::Text(payload.into())
    }

    pub fn bytes(data: Vec<u8>, content_type: Option<String>) -> Self {
        Self::Bytes { content_type, data }
    }

    pub(crate) fn to_vec(&self) -> Result<Vec<u8>> {
        match self {
            Body::Json(value) => Ok(serde_json::to_vec(value)?),
            Body::Text(text) => Ok(text.clone().into_bytes()),
            Body::Bytes { data, .. } => Ok(data.clone()),
        }
    }
}

/// Structured header/metadata list with validation.
#[derive(Clone, Debug, Default)]
pub struct HeaderList(Vec<HeaderEntry>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a header entry.
    ///
    /// # Panics
    /// Panics if the header key or value is empty or contains only whitespace.
    /// This is a fail-fast guard against configuration mistakes.
    pub fn push(&mut self, entry: HeaderEntry) {
        assert!(
            entry.is_valid(),
            "Invalid header: key and value must be non-empty (got key={:?}, value={:?})",
            entry.key,
            entry.value
        );
        self.0.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.0.iter()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: String, value: String) -> Self {
        Self { key, value }
    }

    pub fn is_valid(&self) -> bool {
        !(self.key.trim().is_empty() || self.value.trim().is_empty())
    }
}

pub(crate) fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(REQUEST_ID_HEADER) {
        if let Ok(s) = value.to_str() {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    if let Some(value) = headers.get("X-Request-Id") {
        if let Ok(s) = value.to_str() {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}
