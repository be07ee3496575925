//! Rust client for the Ledgerline business-admin API.
//!
//! This crate is the shared request dispatcher under every Ledgerline API
//! call. It bounds outbound concurrency, coordinates credential refresh on
//! authorization failures, backs off on rate limits, and folds every outcome
//! into one uniform [`Envelope`] — callers branch on `success` instead of
//! catching errors.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ledgerline::{Body, Client, Config, FixedTenant, StaticToken};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ledgerline::Error> {
//!     let client = Client::new(Config {
//!         base_url: Some("https://api.example.com/api/v1".into()),
//!         tokens: Some(Arc::new(StaticToken::new("secret-token"))),
//!         tenant: Some(Arc::new(FixedTenant::new("bumdes-17"))),
//!         ..Default::default()
//!     })?;
//!
//!     let listing = client.get("/accounting/invoices").await;
//!     if listing.success {
//!         println!("invoices: {}", listing.data);
//!     } else {
//!         eprintln!("{} ({:?})", listing.message, listing.errors);
//!     }
//!
//!     let created = client
//!         .post(
//!             "/accounting/invoices",
//!             Body::json(&serde_json::json!({ "number": "INV-001" }))?,
//!         )
//!         .await;
//!     println!("created: {}", created.success);
//!     Ok(())
//! }
//! ```
//!
//! A `401` triggers a single credential refresh per call before the request
//! is replayed; a `429` is retried up to the configured budget, honoring the
//! server's `Retry-After` hint. Neither path holds a concurrency slot while
//! waiting, so a throttled endpoint cannot starve unrelated calls.

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.ledgerline.app/api/v1";

/// HTTP header name for request ID tracing.
pub const REQUEST_ID_HEADER: &str = "X-Ledgerline-Request-Id";

/// HTTP header name carrying the tenant identifier.
pub const TENANT_HEADER: &str = "X-Ledgerline-Tenant";

/// HTTP header identifying this client build.
pub(crate) const CLIENT_HEADER: &str = "X-Ledgerline-Client";

/// Default client header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str =
    concat!("ledgerline-rust/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Default bound on simultaneous in-flight transport attempts.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

mod auth;
mod client;
mod envelope;
mod errors;
mod http;
mod limits;
mod telemetry;
mod transport;

pub use auth::{BoxFuture, FixedTenant, SharedToken, StaticToken, TenantResolver, TokenProvider};
pub use client::{Client, Config, RequestOptions};
pub use envelope::{Envelope, EnvelopeMeta};
pub use errors::{Error, Result, TransportError, TransportErrorKind, ValidationError};
pub use http::{Body, HeaderEntry, HeaderList, RetryConfig};
pub use reqwest::{Method, StatusCode};
pub use telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
