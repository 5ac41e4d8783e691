//! Refresh engine: pulls data through provider adapters, normalizes it and
//! writes the cache at the canonical keys.
//!
//! Long-lived data (VM catalogs, zones, regions, attribute values,
//! on-demand prices) renews at hour cadence; short-lived data (spot
//! prices) at minute cadence. Every refresh holds the single-flight lock
//! of its cache key for the duration of the adapter call and the cache
//! write, so concurrent callers coalesce onto one upstream request.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, CacheValue};
use crate::config::InfoConfig;
use crate::domain::{Attribute, AttrValues, Price, ProviderId, VmInfo};
use crate::error::InfoError;
use crate::flight::FlightGroup;
use crate::keys;
use crate::provider::{ProviderAdapter, ProviderError};

pub struct RefreshEngine {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    store: CacheStore,
    flights: FlightGroup,
    long_ttl: Duration,
    short_ttl: Duration,
    call_timeout: Duration,
}

impl std::fmt::Debug for RefreshEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshEngine")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .field("long_ttl", &self.long_ttl)
            .field("short_ttl", &self.short_ttl)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl RefreshEngine {
    /// Builds the engine over the given adapter set.
    ///
    /// When `config.providers` is non-empty it acts as an allow-list; an
    /// empty effective set is a construction error, fatal at startup.
    pub fn new(
        config: &InfoConfig,
        store: CacheStore,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
    ) -> Result<Self, InfoError> {
        let adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>> = adapters
            .into_iter()
            .filter(|adapter| {
                config.providers.is_empty()
                    || config
                        .providers
                        .iter()
                        .any(|enabled| enabled.as_str() == adapter.provider_id().as_str())
            })
            .map(|adapter| (adapter.provider_id(), adapter))
            .collect();

        if adapters.is_empty() {
            return Err(InfoError::NoProviders);
        }

        Ok(Self {
            adapters,
            store,
            flights: FlightGroup::new(),
            long_ttl: config.long_refresh_interval(),
            // price entries must survive one missed short tick
            short_ttl: config.short_refresh_interval() * 2,
            call_timeout: config.adapter_call_timeout(),
        })
    }

    pub fn adapter(&self, provider: &str) -> Result<&Arc<dyn ProviderAdapter>, InfoError> {
        self.adapters
            .get(provider)
            .ok_or_else(|| InfoError::UnknownProvider(provider.to_owned()))
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.adapters.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Bounds an adapter call by the per-provider timeout and the caller's
    /// cancellation token. A timeout counts as a transport error.
    async fn guarded<T>(
        &self,
        token: &CancellationToken,
        what: &'static str,
        fut: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, InfoError> {
        tokio::select! {
            _ = token.cancelled() => Err(InfoError::Cancelled),
            outcome = tokio::time::timeout(self.call_timeout, fut) => match outcome {
                Ok(result) => result.map_err(InfoError::from),
                Err(_) => Err(ProviderError::transport(format!(
                    "{what} call exceeded the {}s adapter timeout",
                    self.call_timeout.as_secs()
                ))
                .into()),
            },
        }
    }

    /// Long-lived refresh of the VM catalog of `(provider, service, region)`.
    ///
    /// Records whose raw network descriptor does not map to a class are
    /// dropped, never cached unclassified. Zones renew alongside with the
    /// same TTL.
    pub async fn renew_vms(
        &self,
        token: &CancellationToken,
        provider: &str,
        service: &str,
        region: &str,
    ) -> Result<Vec<VmInfo>, InfoError> {
        let adapter = self.adapter(provider)?;
        let key = keys::vms_key(provider, service, region);

        let started = Instant::now();
        let guard = self.flights.acquire(&key).await;
        if guard.completed_since(started) {
            if let Some(CacheValue::Vms(vms)) = self.store.get(&key).await {
                debug!(key = %key, "coalesced onto a concurrent vm renewal");
                return Ok(vms);
            }
        }

        let raw = self
            .guarded(token, "products", adapter.products(service, region))
            .await?;

        let mapper = adapter.network_perf_mapper();
        let mut vms = Vec::with_capacity(raw.len());
        for mut vm in raw {
            match mapper.map(&vm.ntw_perf) {
                Ok(class) => {
                    vm.ntw_class = Some(class);
                    vms.push(vm);
                }
                Err(error) => warn!(
                    provider,
                    region,
                    vm_type = %vm.vm_type,
                    %error,
                    "dropping vm with unmapped network descriptor"
                ),
            }
        }

        if token.is_cancelled() {
            return Err(InfoError::Cancelled);
        }
        self.store
            .set(key.as_str(), CacheValue::Vms(vms.clone()), Some(self.long_ttl))
            .await;
        guard.mark_complete();
        drop(guard);

        if let Err(error) = self.renew_zones(token, provider, region).await {
            warn!(provider, region, %error, "zone renewal after vm refresh failed");
        }

        info!(provider, service, region, count = vms.len(), "renewed vm catalog");
        Ok(vms)
    }

    /// Long-lived refresh of a region's availability zones.
    pub async fn renew_zones(
        &self,
        token: &CancellationToken,
        provider: &str,
        region: &str,
    ) -> Result<Vec<String>, InfoError> {
        let adapter = self.adapter(provider)?;
        let key = keys::zones_key(provider, region);

        let started = Instant::now();
        let guard = self.flights.acquire(&key).await;
        if guard.completed_since(started) {
            if let Some(CacheValue::Zones(zones)) = self.store.get(&key).await {
                return Ok(zones);
            }
        }

        let zones = self.guarded(token, "zones", adapter.zones(region)).await?;

        if token.is_cancelled() {
            return Err(InfoError::Cancelled);
        }
        self.store
            .set(key.as_str(), CacheValue::Zones(zones.clone()), Some(self.long_ttl))
            .await;
        guard.mark_complete();

        Ok(zones)
    }

    /// Long-lived refresh of the regions offering `service`.
    pub async fn renew_regions(
        &self,
        token: &CancellationToken,
        provider: &str,
        service: &str,
    ) -> Result<BTreeMap<String, String>, InfoError> {
        let adapter = self.adapter(provider)?;
        let key = keys::regions_key(provider, service);

        let started = Instant::now();
        let guard = self.flights.acquire(&key).await;
        if guard.completed_since(started) {
            if let Some(CacheValue::Regions(regions)) = self.store.get(&key).await {
                return Ok(regions);
            }
        }

        let regions = self
            .guarded(token, "regions", adapter.regions(service))
            .await?;

        if token.is_cancelled() {
            return Err(InfoError::Cancelled);
        }
        self.store
            .set(
                key.as_str(),
                CacheValue::Regions(regions.clone()),
                Some(self.long_ttl),
            )
            .await;
        guard.mark_complete();

        Ok(regions)
    }

    /// Long-lived refresh of the distinct values of a canonical attribute,
    /// translated to the provider's own attribute name.
    pub async fn renew_attr_values(
        &self,
        token: &CancellationToken,
        provider: &str,
        service: &str,
        attribute: Attribute,
    ) -> Result<AttrValues, InfoError> {
        let adapter = self.adapter(provider)?;
        let attr_name = match attribute {
            Attribute::Cpu => adapter.cpu_attr_name(),
            Attribute::Memory => adapter.memory_attr_name(),
        };
        let key = keys::attr_key(provider, service, attribute.as_str());

        let started = Instant::now();
        let guard = self.flights.acquire(&key).await;
        if guard.completed_since(started) {
            if let Some(CacheValue::AttrValues(values)) = self.store.get(&key).await {
                return Ok(values);
            }
        }

        let values = self
            .guarded(
                token,
                "attribute values",
                adapter.attribute_values(service, attr_name),
            )
            .await?;

        if token.is_cancelled() {
            return Err(InfoError::Cancelled);
        }
        self.store
            .set(
                key.as_str(),
                CacheValue::AttrValues(values.clone()),
                Some(self.long_ttl),
            )
            .await;
        guard.mark_complete();

        debug!(provider, service, attribute = %attribute, count = values.len(), "renewed attribute values");
        Ok(values)
    }

    /// Short-lived refresh of the spot prices of a region, written as one
    /// cache entry per vm type.
    ///
    /// On failure the previous entries stay in place and the error is
    /// reported upward. A provider without a spot market fails with its
    /// `Unsupported` error; skipping such providers is the scheduler's
    /// job, so the error reaches lazy callers verbatim.
    pub async fn renew_short_lived_prices(
        &self,
        token: &CancellationToken,
        provider: &str,
        region: &str,
    ) -> Result<HashMap<String, Price>, InfoError> {
        let adapter = self.adapter(provider)?;

        let started = Instant::now();
        let guard = self.flights.acquire(&keys::price_scope(provider, region)).await;
        if guard.completed_since(started) {
            debug!(provider, region, "coalesced onto a concurrent price renewal");
            return Ok(HashMap::new());
        }

        let prices = self
            .guarded(token, "current prices", adapter.current_prices(region))
            .await?;

        if token.is_cancelled() {
            return Err(InfoError::Cancelled);
        }
        for (vm_type, price) in &prices {
            self.store
                .set(
                    keys::price_key(provider, region, vm_type),
                    CacheValue::Price(price.clone()),
                    Some(self.short_ttl),
                )
                .await;
        }
        guard.mark_complete();

        debug!(provider, region, count = prices.len(), "renewed spot prices");
        Ok(prices)
    }

    /// Warm load of the long-lived on-demand prices, stored per
    /// `(region, vm type)` under the price keys. Errors propagate to the
    /// caller.
    pub async fn initialize(
        &self,
        token: &CancellationToken,
        provider: &str,
    ) -> Result<HashMap<String, HashMap<String, Price>>, InfoError> {
        let adapter = self.adapter(provider)?;
        info!(provider, "initializing price info");

        let all_prices = self
            .guarded(token, "initialize", adapter.initialize())
            .await?;

        if token.is_cancelled() {
            return Err(InfoError::Cancelled);
        }
        for (vm_type, by_region) in &all_prices {
            for (region, price) in by_region {
                self.store
                    .set(
                        keys::price_key(provider, region, vm_type),
                        CacheValue::Price(price.clone()),
                        Some(self.long_ttl),
                    )
                    .await;
            }
        }

        Ok(all_prices)
    }
}
