//! Credential and tenant collaborators.
//!
//! Credential storage, the refresh-token exchange, and session termination
//! live outside this crate; the dispatcher only needs the seams below. The
//! bundled implementations cover the two common cases: a fixed credential
//! ([`StaticToken`]) and an interior-mutable store whose refresh delegates to
//! a caller-supplied exchange ([`SharedToken`]).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::{Error, Result, ValidationError};

/// Boxed future alias used by the async traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies the bearer credential attached to outbound requests.
///
/// `refresh` is invoked at most once per logical call, on the first
/// authorization failure; implementations adopt the new credential so the
/// retried attempt picks it up via `current`.
pub trait TokenProvider: Send + Sync {
    /// The current bearer credential, if one is available.
    fn current(&self) -> BoxFuture<'_, Option<String>>;

    /// Exchange the refresh credential for a new bearer credential and adopt
    /// it. Returns the new credential.
    fn refresh(&self) -> BoxFuture<'_, Result<String>>;

    /// Terminate the session. Invoked once after a failed refresh; the
    /// dispatcher ignores its outcome.
    fn sign_out(&self) -> BoxFuture<'_, ()>;
}

/// Resolves the tenant identifier sent with every request.
///
/// Browser deployments read it from a cookie; services usually pin it per
/// client instance ([`FixedTenant`]).
pub trait TenantResolver: Send + Sync {
    fn tenant_id(&self) -> Option<String>;
}

/// Tenant resolver that always returns the same identifier.
#[derive(Clone, Debug)]
pub struct FixedTenant(String);

impl FixedTenant {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self(tenant_id.into())
    }
}

impl TenantResolver for FixedTenant {
    fn tenant_id(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Fixed bearer credential with no refresh capability.
///
/// A 401 still triggers the refresh path once; it fails, the session is
/// signed out (a no-op here), and the original failure is reported.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticToken {
    fn current(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move { Some(self.token.clone()) })
    }

    fn refresh(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            Err(Error::CredentialRefresh(
                "no refresh credential configured".to_string(),
            ))
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {})
    }
}

type RotateFn = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;
type SignOutFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Mutable credential store backed by a caller-supplied refresh exchange.
///
/// `refresh` runs the exchange and adopts the returned credential; `sign_out`
/// clears the stored credential and fires the optional hook.
pub struct SharedToken {
    token: Mutex<Option<String>>,
    rotate: RotateFn,
    on_sign_out: Option<SignOutFn>,
}

impl SharedToken {
    pub fn new<F, Fut>(initial: Option<String>, rotate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            token: Mutex::new(initial),
            rotate: Arc::new(move || Box::pin(rotate())),
            on_sign_out: None,
        }
    }

    /// Register a session-termination hook, fired after the stored credential
    /// is cleared.
    pub fn with_sign_out<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_sign_out = Some(Arc::new(move || Box::pin(hook())));
        self
    }
}

impl TokenProvider for SharedToken {
    fn current(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move { self.token.lock().await.clone() })
    }

    fn refresh(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let token = (self.rotate)().await?;
            let token = token.trim();
            if token.is_empty() {
                return Err(Error::Validation(ValidationError::new(
                    "refresh exchange returned an empty credential",
                )));
            }
            *self.token.lock().await = Some(token.to_string());
            Ok(token.to_string())
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.token.lock().await.take();
            if let Some(hook) = &self.on_sign_out {
                hook().await;
            }
        })
    }
}
