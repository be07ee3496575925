use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};

use crate::auth::BoxFuture;
use crate::errors::{TransportError, TransportErrorKind};
use crate::http::Body;

/// One fully assembled transport attempt.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Body>,
}

/// What a transport attempt yields: status, headers, raw body.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// The network primitive under the dispatcher: perform one request, return
/// status, headers, and body, or fail with a [`TransportError`].
///
/// The dispatcher layers admission control, credential refresh, and throttle
/// retries on top; implementations stay per-attempt and stateless. Swap in a
/// custom implementation for tests or exotic environments.
pub trait Transport: Send + Sync {
    fn perform(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>>;
}

/// Default transport backed by a shared [`reqwest::Client`].
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn perform(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            let mut builder = self
                .http
                .request(request.method, request.url)
                .headers(request.headers);
            if let Some(body) = &request.body {
                let bytes = body.to_vec().map_err(|err| {
                    TransportError::new(
                        TransportErrorKind::Request,
                        format!("failed to encode request body: {err}"),
                    )
                })?;
                builder = builder.body(bytes);
            }

            let response = builder
                .send()
                .await
                .map_err(|err| TransportError::from_reqwest("request failed", err))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|err| TransportError::from_reqwest("failed to read response body", err))?
                .to_vec();

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}
