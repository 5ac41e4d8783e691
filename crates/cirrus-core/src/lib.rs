//! # Cirrus Core
//!
//! Provider-agnostic cache and aggregator for cloud VM shape and price
//! information.
//!
//! Heterogeneous provider catalogs (CPU count, memory, network class,
//! on-demand and spot prices) are normalized into one data model, cached
//! behind a TTL key/value store and served as filtered product listings.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Built-in provider adapters (EC2, OCI) |
//! | [`cache`] | TTL key/value store |
//! | [`config`] | Core configuration |
//! | [`domain`] | Canonical domain models and the network-class mapper |
//! | [`error`] | Error taxonomy |
//! | [`http_client`] | HTTP transport seam for adapters |
//! | [`keys`] | Canonical cache-key grammar |
//! | [`provider`] | Provider adapter contract |
//! | [`query`] | Query engine (read side) |
//! | [`refresh`] | Refresh engine (write side) |
//! | [`scheduler`] | Periodic renewal loops |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cirrus_core::{
//!     AwsAdapter, CacheStore, InfoConfig, OracleAdapter, QueryEngine, RefreshEngine, Scheduler,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InfoConfig::default();
//!     let store = CacheStore::new(config.cache_default_ttl());
//!     let refresh = Arc::new(RefreshEngine::new(
//!         &config,
//!         store.clone(),
//!         vec![Arc::new(AwsAdapter::default()), Arc::new(OracleAdapter::default())],
//!     )?);
//!
//!     let shutdown = CancellationToken::new();
//!     store.spawn_sweeper(config.cache_cleanup_interval(), shutdown.clone());
//!     Scheduler::new(Arc::clone(&refresh), &config).spawn(shutdown.clone());
//!
//!     let queries = QueryEngine::new(refresh);
//!     let zones = queries.get_zones(&shutdown, "aws", "us-east-1").await?;
//!     println!("{zones:?}");
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod keys;
pub mod provider;
pub mod query;
pub mod refresh;
pub mod scheduler;

mod flight;

// Re-export commonly used types at crate root for convenience

pub use adapters::{AwsAdapter, OracleAdapter};

pub use cache::{CacheStats, CacheStore, CacheValue};

pub use config::InfoConfig;

pub use domain::{
    Attribute, AttrValue, AttrValues, NetworkClass, NetworkPerfMapper, Price, ProductDetails,
    ProviderId, SpotPriceInfo, VmInfo, ZonePrice,
};

pub use error::InfoError;

pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient};

pub use provider::{BoxFuture, ProviderAdapter, ProviderError, ProviderErrorKind};

pub use query::QueryEngine;

pub use refresh::RefreshEngine;

pub use scheduler::Scheduler;
