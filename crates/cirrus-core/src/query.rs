//! Query engine: serves client requests through the cache, triggering lazy
//! refreshes where the contract allows it.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::CacheValue;
use crate::domain::{Attribute, Price, ProductDetails, ProviderId, SpotPriceInfo};
use crate::error::InfoError;
use crate::keys;
use crate::refresh::RefreshEngine;

/// Arithmetic mean of the spot prices over the *supplied* zones list.
///
/// A zone without a spot price contributes zero and the divisor is the
/// supplied zone count, so four requested zones of which one is priced
/// divide that single price by four. Clients wanting a present-only
/// average must pre-filter the zones.
fn average_spot(spot: &SpotPriceInfo, zones: &[String]) -> f64 {
    let sum: f64 = zones
        .iter()
        .map(|zone| spot.get(zone).copied().unwrap_or(0.0))
        .sum();
    sum / zones.len() as f64
}

/// Read side of the service. Cheap to clone; shares the refresh engine and
/// its cache.
#[derive(Clone)]
pub struct QueryEngine {
    refresh: Arc<RefreshEngine>,
}

impl QueryEngine {
    pub fn new(refresh: Arc<RefreshEngine>) -> Self {
        Self { refresh }
    }

    pub fn refresh_engine(&self) -> Arc<RefreshEngine> {
        Arc::clone(&self.refresh)
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.refresh.providers()
    }

    /// Distinct values of a canonical attribute, ascending and duplicate
    /// free.
    ///
    /// `attribute` must be `"cpu"` or `"memory"`; anything else fails with
    /// `UnsupportedAttribute` before any provider is consulted.
    pub async fn get_attr_values(
        &self,
        token: &CancellationToken,
        provider: &str,
        service: &str,
        attribute: &str,
    ) -> Result<Vec<f64>, InfoError> {
        let attribute: Attribute = attribute.parse()?;
        // reject unknown providers on the cached path too
        self.refresh.adapter(provider)?;

        let key = keys::attr_key(provider, service, attribute.as_str());
        let values = match self.refresh.store().get(&key).await {
            Some(CacheValue::AttrValues(values)) => values,
            _ => {
                self.refresh
                    .renew_attr_values(token, provider, service, attribute)
                    .await?
            }
        };

        let mut floats = values.floats();
        floats.sort_by(f64::total_cmp);
        Ok(floats)
    }

    /// Availability zones of a region, read through the cache.
    pub async fn get_zones(
        &self,
        token: &CancellationToken,
        provider: &str,
        region: &str,
    ) -> Result<Vec<String>, InfoError> {
        self.refresh.adapter(provider)?;

        match self.refresh.store().get(&keys::zones_key(provider, region)).await {
            Some(CacheValue::Zones(zones)) => Ok(zones),
            _ => self.refresh.renew_zones(token, provider, region).await,
        }
    }

    /// Regions offering a service, read through the cache.
    pub async fn get_regions(
        &self,
        token: &CancellationToken,
        provider: &str,
        service: &str,
    ) -> Result<BTreeMap<String, String>, InfoError> {
        self.refresh.adapter(provider)?;

        match self
            .refresh
            .store()
            .get(&keys::regions_key(provider, service))
            .await
        {
            Some(CacheValue::Regions(regions)) => Ok(regions),
            _ => self.refresh.renew_regions(token, provider, service).await,
        }
    }

    /// On-demand price and zone-averaged spot price of one vm type.
    ///
    /// Fails only on an empty zones list (validation) or when the
    /// underlying price refresh fails; a vm type absent from the refreshed
    /// prices yields zeros, matching the contract that absence is not an
    /// error here.
    pub async fn get_price(
        &self,
        token: &CancellationToken,
        provider: &str,
        region: &str,
        vm_type: &str,
        zones: &[String],
    ) -> Result<(f64, f64), InfoError> {
        if zones.is_empty() {
            return Err(InfoError::EmptyZones);
        }
        self.refresh.adapter(provider)?;

        let key = keys::price_key(provider, region, vm_type);
        let price = match self.refresh.store().get(&key).await {
            Some(CacheValue::Price(price)) => price,
            _ => {
                self.refresh
                    .renew_short_lived_prices(token, provider, region)
                    .await?;
                // re-read rather than trusting the returned map: a
                // coalesced flight reports an empty map
                match self.refresh.store().get(&key).await {
                    Some(CacheValue::Price(price)) => price,
                    _ => Price::default(),
                }
            }
        };

        Ok((price.on_demand, average_spot(&price.spot, zones)))
    }

    /// Joined product listing of `(provider, service, region)`.
    ///
    /// Served strictly from cache: a cold catalog is a `NotCached` error,
    /// never a synchronous cloud query. Only VMs with a live price entry
    /// are emitted; the price entry's on-demand value wins over the
    /// catalog's. Ordering mirrors the cached catalog.
    pub async fn get_product_details(
        &self,
        provider: &str,
        service: &str,
        region: &str,
    ) -> Result<Vec<ProductDetails>, InfoError> {
        self.refresh.adapter(provider)?;

        let vms_key = keys::vms_key(provider, service, region);
        let Some(CacheValue::Vms(vms)) = self.refresh.store().get(&vms_key).await else {
            return Err(InfoError::NotCached(vms_key));
        };

        let mut details = Vec::with_capacity(vms.len());
        for vm in &vms {
            let Some(class) = vm.ntw_class else {
                debug!(vm_type = %vm.vm_type, "cached vm has no network class, skipping");
                continue;
            };
            match self
                .refresh
                .store()
                .get(&keys::price_key(provider, region, &vm.vm_type))
                .await
            {
                Some(CacheValue::Price(price)) => {
                    details.push(ProductDetails::join(vm, class, &price));
                }
                _ => {
                    debug!(vm_type = %vm.vm_type, "no price entry for vm, skipping");
                }
            }
        }

        Ok(details)
    }

    /// Warm load of the provider's long-lived prices. Errors propagate.
    pub async fn initialize(
        &self,
        token: &CancellationToken,
        provider: &str,
    ) -> Result<HashMap<String, HashMap<String, Price>>, InfoError> {
        self.refresh.initialize(token, provider).await
    }
}
