use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use tokio::time::sleep;

use crate::auth::{TenantResolver, TokenProvider};
use crate::envelope::Envelope;
use crate::errors::{Error, Result, TransportError};
use crate::http::{Body, HeaderList, RetryConfig};
use crate::limits::InFlightLimiter;
use crate::telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext, Telemetry};
use crate::transport::{ReqwestTransport, Transport, TransportRequest};
use crate::{
    CLIENT_HEADER, DEFAULT_BASE_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_REQUEST_TIMEOUT, REQUEST_ID_HEADER, TENANT_HEADER,
};

/// Client configuration consumed by [`Client::new`].
#[derive(Clone, Default)]
pub struct Config {
    pub base_url: Option<String>,
    /// Bearer credential source; requests go out unauthenticated without one.
    pub tokens: Option<Arc<dyn TokenProvider>>,
    /// Tenant identifier source; the tenant header is omitted without one.
    pub tenant: Option<Arc<dyn TenantResolver>>,
    /// Full custom transport. Takes precedence over `http_client`.
    pub transport: Option<Arc<dyn Transport>>,
    pub http_client: Option<reqwest::Client>,
    pub client_header: Option<String>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Throttle retry policy (defaults to 3 retries, linear fallback).
    pub retry: Option<RetryConfig>,
    /// Bound on simultaneous in-flight transport attempts (defaults to 5).
    pub max_in_flight: Option<usize>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Optional metrics callbacks.
    pub metrics: Option<MetricsCallbacks>,
}

/// Per-request options.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub request_id: Option<String>,
    pub headers: HeaderList,
}

impl RequestOptions {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push(crate::http::HeaderEntry::new(key.into(), value.into()));
        self
    }
}

/// Shared request dispatcher for the Ledgerline API.
///
/// Every verb resolves to an [`Envelope`]; ordinary failures (connectivity,
/// non-success statuses, malformed bodies) never surface as errors. Cloning
/// is cheap and all clones share one admission gate.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    base_url: String,
    transport: Arc<dyn Transport>,
    limiter: InFlightLimiter,
    tokens: Option<Arc<dyn TokenProvider>>,
    tenant: Option<Arc<dyn TenantResolver>>,
    client_header: Option<String>,
    retry: RetryConfig,
    default_headers: Option<HeaderList>,
    telemetry: Telemetry,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let base_source = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_source.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

        let transport: Arc<dyn Transport> = match cfg.transport {
            Some(transport) => transport,
            None => {
                let http = match cfg.http_client {
                    Some(client) => client,
                    None => reqwest::Client::builder()
                        .connect_timeout(cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                        .timeout(cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
                        .build()
                        .map_err(|err| {
                            TransportError::connect("failed to build http client", err)
                        })?,
                };
                Arc::new(ReqwestTransport::new(http))
            }
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(DEFAULT_CLIENT_HEADER.to_string()));

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                transport,
                limiter: InFlightLimiter::new(cfg.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT)),
                tokens: cfg.tokens,
                tenant: cfg.tenant,
                client_header,
                retry: cfg.retry.unwrap_or_default(),
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    pub async fn get(&self, path: &str) -> Envelope {
        self.dispatch(Method::GET, path, None, RequestOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, body: Body) -> Envelope {
        self.dispatch(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: Body) -> Envelope {
        self.dispatch(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch(&self, path: &str, body: Body) -> Envelope {
        self.dispatch(Method::PATCH, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Envelope {
        self.dispatch(Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    /// Full-control entry point behind the verb helpers.
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<Body>,
        options: RequestOptions,
    ) -> Envelope {
        self.inner.dispatch(method, path, body, options).await
    }
}

impl ClientInner {
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<Body>,
        options: RequestOptions,
    ) -> Envelope {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        let envelope = match self.resolve_url(path) {
            Ok(url) => {
                self.run(&method, &url, body, &options, &mut attempts)
                    .await
            }
            Err(err) => Envelope::internal_failure(err.to_string(), options.request_id.as_deref()),
        };

        if self.telemetry.http_enabled() {
            let context = RequestContext::new(method.as_str(), path)
                .with_request_id(Some(envelope.meta.request_id.clone()));
            self.telemetry.record_http(HttpRequestMetrics {
                latency: started.elapsed(),
                status: envelope.meta.code,
                error: (!envelope.success).then(|| envelope.message.clone()),
                attempts,
                context,
            });
        }

        envelope
    }

    /// The per-request state machine: admit, perform, release, then decide
    /// between refresh-retry, backoff-retry, and normalization.
    async fn run(
        &self,
        method: &Method,
        url: &Url,
        body: Option<Body>,
        options: &RequestOptions,
        attempts: &mut u32,
    ) -> Envelope {
        let explicit_id = options.request_id.as_deref();
        let mut refresh_attempted = false;
        let mut throttle_attempts: u32 = 0;

        loop {
            // Rebuilt every attempt so a rotated credential is picked up.
            let headers = match self.attempt_headers(options, body.as_ref()).await {
                Ok(headers) => headers,
                Err(err) => return Envelope::internal_failure(err.to_string(), explicit_id),
            };

            *attempts += 1;
            #[cfg(feature = "tracing")]
            tracing::debug!(method = %method, url = %url, attempt = *attempts, "dispatching request");

            // The slot covers exactly one transport call; it is released
            // before any retry decision, so a request sleeping out a backoff
            // holds no capacity.
            let outcome = {
                let permit = self.limiter.acquire().await;
                if permit.is_none() {
                    return Envelope::internal_failure("dispatcher is shutting down", explicit_id);
                }
                self.transport
                    .perform(TransportRequest {
                        method: method.clone(),
                        url: url.clone(),
                        headers,
                        body: body.clone(),
                    })
                    .await
            };

            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(method = %method, url = %url, error = %err, "transport failure");
                    return Envelope::from_transport_error(&err, explicit_id);
                }
            };

            if response.status == StatusCode::UNAUTHORIZED && !refresh_attempted {
                if let Some(tokens) = &self.tokens {
                    refresh_attempted = true;
                    match tokens.refresh().await {
                        Ok(_) => continue,
                        Err(_err) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(error = %_err, "credential refresh failed; signing out");
                            tokens.sign_out().await;
                            // The original 401 falls through to normalization.
                        }
                    }
                }
            }

            if response.status == StatusCode::TOO_MANY_REQUESTS
                && throttle_attempts < self.retry.max_retries
            {
                let delay =
                    self.retry
                        .throttle_delay(&response.headers, throttle_attempts, SystemTime::now());
                throttle_attempts += 1;
                #[cfg(feature = "tracing")]
                tracing::debug!(delay_ms = delay.as_millis() as u64, "throttled; backing off");
                sleep(delay).await;
                continue;
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(status = %response.status, "request resolved");
            return Envelope::from_response(
                response.status,
                &response.headers,
                &response.body,
                explicit_id,
            );
        }
    }

    async fn attempt_headers(
        &self,
        options: &RequestOptions,
        body: Option<&Body>,
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // Only a serialized JSON body gets a content type forced on it; raw
        // text and opaque byte payloads go out as the caller shaped them.
        match body {
            Some(Body::Json(_)) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Some(Body::Bytes {
                content_type: Some(content_type),
                ..
            }) => {
                let value = HeaderValue::from_str(content_type)
                    .map_err(|err| Error::Config(format!("invalid content type: {err}")))?;
                headers.insert(CONTENT_TYPE, value);
            }
            _ => {}
        }

        if let Some(client_header) = self.client_header.as_deref() {
            let value = HeaderValue::from_str(client_header)
                .map_err(|err| Error::Config(format!("invalid client header: {err}")))?;
            headers.insert(CLIENT_HEADER, value);
        }

        if let Some(id) = options.request_id.as_deref() {
            if !id.trim().is_empty() {
                let value = HeaderValue::from_str(id)
                    .map_err(|err| Error::Config(format!("invalid request id: {err}")))?;
                headers.insert(REQUEST_ID_HEADER, value);
            }
        }

        if let Some(tokens) = &self.tokens {
            if let Some(token) = tokens.current().await {
                let bearer = token.trim();
                let bearer = bearer
                    .strip_prefix("Bearer ")
                    .or_else(|| bearer.strip_prefix("bearer "))
                    .unwrap_or(bearer);
                let value = HeaderValue::from_str(&format!("Bearer {bearer}"))
                    .map_err(|err| Error::Config(format!("invalid bearer credential: {err}")))?;
                headers.insert(AUTHORIZATION, value);
            }
        }

        if let Some(tenant) = &self.tenant {
            if let Some(tenant_id) = tenant.tenant_id() {
                if !tenant_id.trim().is_empty() {
                    let value = HeaderValue::from_str(tenant_id.trim())
                        .map_err(|err| Error::Config(format!("invalid tenant id: {err}")))?;
                    headers.insert(TENANT_HEADER, value);
                }
            }
        }

        if let Some(defaults) = &self.default_headers {
            apply_header_list(&mut headers, defaults)?;
        }
        apply_header_list(&mut headers, &options.headers)?;

        Ok(headers)
    }

    fn resolve_url(&self, path: &str) -> Result<Url> {
        let url_text = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        };
        Url::parse(&url_text)
            .map_err(|err| Error::Config(format!("invalid request path {path:?}: {err}")))
    }
}

fn apply_header_list(headers: &mut HeaderMap, list: &HeaderList) -> Result<()> {
    for entry in list.iter() {
        if !entry.is_valid() {
            continue;
        }
        let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
            .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
        let value = HeaderValue::from_str(entry.value.trim())
            .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
        headers.insert(name, value);
    }
    Ok(())
}
