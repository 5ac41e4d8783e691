//! Provider adapter contract.
//!
//! Every cloud provider integration implements [`ProviderAdapter`]. The
//! core never talks to provider SDKs directly: it pulls raw catalog, zone
//! and price data through this trait, normalizes it and writes the cache.
//! Adapters are constructed once at startup and live for the process; from
//! the core's perspective they are stateless apart from the SDK clients
//! they hold internally.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::domain::{AttrValues, NetworkPerfMapper, Price, ProviderId, VmInfo};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// SDK or network I/O failure; the scheduler retries on the next tick.
    Transport,
    /// The provider cannot satisfy the request at all (e.g. no spot market).
    Unsupported,
    /// The provider returned data the core cannot normalize.
    InvalidData,
    Internal,
}

/// Structured adapter error surfaced unchanged through the query layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transport,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unsupported,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unknown_network_descriptor(raw: &str) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidData,
            message: format!("could not determine network performance for: [{raw}]"),
            retryable: false,
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidData,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Transport => "provider.transport",
            ProviderErrorKind::Unsupported => "provider.unsupported",
            ProviderErrorKind::InvalidData => "provider.invalid_data",
            ProviderErrorKind::Internal => "provider.internal",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// Capability surface every provider integration must expose.
///
/// All I/O methods return boxed futures so the trait stays object-safe;
/// implementations must be `Send + Sync` because adapters are shared across
/// the refresh and query paths.
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider identifier (`"amazon"`, `"oracle"`, ...).
    fn provider_id(&self) -> ProviderId;

    /// Services the provider exposes products for (`"compute"`, `"oke"`, ...).
    fn services(&self) -> Vec<String>;

    /// One-time warm load of long-lived prices:
    /// vm type, then region, to [`Price`].
    ///
    /// Called at startup and again at the long renewal cadence. Errors
    /// propagate to the caller instead of being swallowed.
    fn initialize(
        &self,
    ) -> BoxFuture<'_, Result<HashMap<String, HashMap<String, Price>>, ProviderError>>;

    /// Regions offering `service`, as id to display name.
    fn regions<'a>(
        &'a self,
        service: &'a str,
    ) -> BoxFuture<'a, Result<BTreeMap<String, String>, ProviderError>>;

    /// Availability zones of a region.
    fn zones<'a>(&'a self, region: &'a str) -> BoxFuture<'a, Result<Vec<String>, ProviderError>>;

    /// VM shapes available in a region. `ntw_perf` is the provider's raw
    /// descriptor; `ntw_class` is left unset for the core to resolve.
    fn products<'a>(
        &'a self,
        service: &'a str,
        region: &'a str,
    ) -> BoxFuture<'a, Result<Vec<VmInfo>, ProviderError>>;

    /// Distinct values of one attribute, named in the provider's own terms
    /// (see [`cpu_attr_name`](Self::cpu_attr_name) /
    /// [`memory_attr_name`](Self::memory_attr_name)); canonical-name
    /// aliasing is the core's responsibility.
    fn attribute_values<'a>(
        &'a self,
        service: &'a str,
        attr_name: &'a str,
    ) -> BoxFuture<'a, Result<AttrValues, ProviderError>>;

    /// Short-lived (spot) prices per vm type in a region.
    ///
    /// Providers without a spot market fail with an `Unsupported` error.
    fn current_prices<'a>(
        &'a self,
        region: &'a str,
    ) -> BoxFuture<'a, Result<HashMap<String, Price>, ProviderError>>;

    /// Whether a short-lived refresh is meaningful for this provider.
    fn has_short_lived_price_info(&self) -> bool;

    /// The provider's own name for the canonical `cpu` attribute.
    fn cpu_attr_name(&self) -> &str;

    /// The provider's own name for the canonical `memory` attribute.
    fn memory_attr_name(&self) -> &str;

    /// The provider-supplied network performance mapper.
    fn network_perf_mapper(&self) -> &NetworkPerfMapper;
}
