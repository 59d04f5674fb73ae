//! Error taxonomy (§7). Variant names are the taxonomy categories, not
//! implementation details — callers match on them to decide retry vs.
//! surface-to-client behavior.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FishError {
    /// Input rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// Distinct sentinel from the store, never conflated with an I/O error.
    #[error("not found: {0}")]
    NotFound(String),

    /// Webhook signature missing or not matching the configured secret
    /// (§4.9.4, §7) — distinct from a malformed payload so transports can
    /// return 401 rather than 400 (§6.3).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No driver can currently satisfy the request; caller should leave the
    /// application in NEW for retry on the next election round.
    #[error("no capacity available: {0}")]
    Capacity(String),

    /// A provider call failed. `transient = true` means the engine should
    /// write a new NEW state; otherwise the retry cap has been hit.
    #[error("driver error: {0}")]
    Driver { message: String, transient: bool },

    /// Attempt to mutate an immutable entity.
    #[error("state error: {0}")]
    State(String),

    /// Election lost/stale — handled internally, never surfaced to a client.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The process cannot continue starting up.
    #[error("fatal startup error: {0}")]
    FatalStartup(String),

    #[error(transparent)]
    Store(#[from] sled::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FishResult<T> = Result<T, FishError>;

impl FishError {
    pub fn driver(message: impl Into<String>, transient: bool) -> Self {
        FishError::Driver {
            message: message.into(),
            transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FishError::NotFound(_))
    }

    /// Stable machine-readable code, used by the GraphQL/JSON error surfaces
    /// so clients can branch without parsing the message.
    pub fn code(&self) -> &'static str {
        match self {
            FishError::Validation(_) => "VALIDATION_ERROR",
            FishError::NotFound(_) => "NOT_FOUND",
            FishError::Unauthorized(_) => "UNAUTHORIZED",
            FishError::Capacity(_) => "CAPACITY_ERROR",
            FishError::Driver { .. } => "DRIVER_ERROR",
            FishError::State(_) => "STATE_ERROR",
            FishError::Concurrency(_) => "CONCURRENCY_ERROR",
            FishError::FatalStartup(_) => "FATAL_STARTUP",
            FishError::Store(_) => "STORE_ERROR",
            FishError::Io(_) => "IO_ERROR",
        }
    }

    /// Converts to a GraphQL error carrying the stable `code` as an
    /// extension, sanitizing store/io details rather than exposing them.
    pub fn extend(self) -> async_graphql::Error {
        let code = self.code();
        let message = match &self {
            FishError::Store(e) => {
                tracing::error!(error = %e, "store error");
                "an internal storage error occurred".to_string()
            }
            FishError::Io(e) => {
                tracing::error!(error = %e, "io error");
                "an internal i/o error occurred".to_string()
            }
            other => other.to_string(),
        };
        async_graphql::Error::new(message).extend_with(|_err, e| e.set("code", code))
    }
}
