//! Bearer credential sources.

use std::env;
use std::sync::Arc;

/// Supplies the bearer credential for authenticated calls.
///
/// Returning `None` means the operator is not signed in; callers surface
/// that as [`GatewayError::Unauthenticated`](crate::GatewayError) without
/// issuing the request.
pub trait TokenProvider: Send + Sync {
    /// Current credential, if any.
    fn token(&self) -> Option<String>;
}

impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    fn token(&self) -> Option<String> {
        (**self).token()
    }
}

/// A fixed credential.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// A provider that never has a credential.
    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the credential from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new("CRM_TOKEN")
    }
}

impl TokenProvider for EnvToken {
    fn token(&self) -> Option<String> {
        env::var(&self.var).ok().filter(|t| !t.trim().is_empty())
    }
}
