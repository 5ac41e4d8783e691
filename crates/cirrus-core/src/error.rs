use thiserror::Error;

use crate::provider::ProviderError;

/// Top-level error type for cache, refresh and query operations.
#[derive(Debug, Error)]
pub enum InfoError {
    /// The requested attribute is not one of the canonical names.
    #[error("unsupported attribute: {0}")]
    UnsupportedAttribute(String),

    /// Product details were requested before the VM catalog was cached.
    /// Clients are expected to retry after the next refresh cycle.
    #[error("vms not yet cached for the key: {0}")]
    NotCached(String),

    /// No adapter is registered under the given provider identifier.
    #[error("invalid provider: {0}")]
    UnknownProvider(String),

    /// Price averaging needs at least one zone to divide by.
    #[error("zones must not be empty")]
    EmptyZones,

    /// The factory was handed an empty adapter set.
    #[error("could not create cloud info service")]
    NoProviders,

    /// The operation was cancelled before it could complete.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl InfoError {
    /// Whether retrying at a later tick can reasonably succeed.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Provider(error) => error.retryable(),
            Self::NotCached(_) | Self::Cancelled => true,
            _ => false,
        }
    }
}
