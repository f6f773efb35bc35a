//! Error types for catalog resolution.
//!
//! Only two failures are allowed to cross the catalog client boundary:
//! rate limiting and authentication. Everything else is logged where it is
//! detected and turned into "no result".

use std::time::Duration;

use thiserror::Error;

use crate::sources::spotify::url::EntityKind;

/// Errors returned by a [`CatalogClient`](crate::sources::spotify::client::CatalogClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The remote answered 429; nothing may be sent before `retry_after` elapses.
    #[error("catalog rate limit reached, retry after {}", humantime::format_duration(*retry_after))]
    RateLimited { retry_after: Duration },

    /// The catalog rejected the bearer token (HTTP 401).
    #[error("catalog authentication failed: {0}")]
    Unauthorized(String),

    /// No usable token could be obtained from the accounts service.
    #[error("access token unavailable: {0}")]
    TokenUnavailable(String),
}

/// Errors returned to whoever asked for a URL to be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("we are currently rate-limited, please try again in {}", humantime::format_duration(*retry_after))]
    RateLimited { retry_after: Duration },

    /// Token was invalid; a refresh has been triggered.
    #[error("our access token is currently invalid, we are validating our authorization, please try again shortly")]
    Unauthenticated,

    #[error("no {kind} found for id `{id}`")]
    NotFound { kind: EntityKind, id: String },
}

impl ResolveError {
    /// Whether the same request may succeed if issued again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolveError::RateLimited { .. } | ResolveError::Unauthenticated
        )
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        ResolveError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<CatalogError> for ResolveError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::RateLimited { retry_after } => ResolveError::RateLimited { retry_after },
            CatalogError::Unauthorized(_) | CatalogError::TokenUnavailable(_) => {
                ResolveError::Unauthenticated
            }
        }
    }
}
