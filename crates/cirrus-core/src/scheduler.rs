//! Periodic renewal loops.
//!
//! Two cooperative timer tasks per provider: the long renewal loop
//! rebuilds catalogs and warm prices, the short loop refreshes spot
//! prices. Refresh errors never reach clients from here; they are logged
//! and the next tick retries.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::InfoConfig;
use crate::domain::{Attribute, ProviderId};
use crate::refresh::RefreshEngine;

pub struct Scheduler {
    refresh: Arc<RefreshEngine>,
    long_interval: Duration,
    short_interval: Duration,
}

impl Scheduler {
    pub fn new(refresh: Arc<RefreshEngine>, config: &InfoConfig) -> Self {
        Self {
            refresh,
            long_interval: config.long_refresh_interval(),
            short_interval: config.short_refresh_interval(),
        }
    }

    /// Spawns the per-provider loops. They stop when `token` is cancelled;
    /// the returned handles let the host await a clean shutdown.
    pub fn spawn(&self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for provider in self.refresh.providers() {
            handles.push(tokio::spawn(renewal_loop(
                Arc::clone(&self.refresh),
                provider.clone(),
                self.long_interval,
                token.clone(),
            )));
            handles.push(tokio::spawn(short_lived_loop(
                Arc::clone(&self.refresh),
                provider,
                self.short_interval,
                token.clone(),
            )));
        }
        handles
    }
}

/// Long-cadence loop: initialize, then renew regions, attribute values and
/// VM catalogs for every `(service, region)` the provider currently knows.
async fn renewal_loop(
    refresh: Arc<RefreshEngine>,
    provider: ProviderId,
    period: Duration,
    token: CancellationToken,
) {
    info!(provider = %provider, period_secs = period.as_secs(), "starting renewal loop");

    let mut ticker = tokio::time::interval(period);
    // a tick still running at the next fire time is skipped, never overlapped
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(provider = %provider, "stopping renewal loop");
                break;
            }
            _ = ticker.tick() => renew_provider(&refresh, &provider, &token).await,
        }
    }
}

async fn renew_provider(refresh: &RefreshEngine, provider: &ProviderId, token: &CancellationToken) {
    if let Err(error) = refresh.initialize(token, provider.as_str()).await {
        warn!(provider = %provider, %error, "price initialization failed");
    }

    let services = match refresh.adapter(provider.as_str()) {
        Ok(adapter) => adapter.services(),
        Err(error) => {
            warn!(provider = %provider, %error, "provider vanished from the registry");
            return;
        }
    };

    for service in services {
        for attribute in Attribute::ALL {
            if let Err(error) = refresh
                .renew_attr_values(token, provider.as_str(), &service, attribute)
                .await
            {
                warn!(provider = %provider, service = %service, %attribute, %error, "attribute renewal failed");
            }
        }

        let regions = match refresh.renew_regions(token, provider.as_str(), &service).await {
            Ok(regions) => regions,
            Err(error) => {
                warn!(provider = %provider, service = %service, %error, "region renewal failed");
                continue;
            }
        };

        for region in regions.keys() {
            if let Err(error) = refresh
                .renew_vms(token, provider.as_str(), &service, region)
                .await
            {
                warn!(provider = %provider, service = %service, region = %region, %error, "vm catalog renewal failed");
            }
        }
    }
}

/// Short-cadence loop: refresh spot prices for each known region of a
/// provider that reports short-lived data.
async fn short_lived_loop(
    refresh: Arc<RefreshEngine>,
    provider: ProviderId,
    period: Duration,
    token: CancellationToken,
) {
    match refresh.adapter(provider.as_str()) {
        Ok(adapter) if adapter.has_short_lived_price_info() => {}
        Ok(_) => {
            debug!(provider = %provider, "provider has no short-lived price info, loop not started");
            return;
        }
        Err(error) => {
            warn!(provider = %provider, %error, "provider vanished from the registry");
            return;
        }
    }

    info!(provider = %provider, period_secs = period.as_secs(), "starting short-lived price loop");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(provider = %provider, "stopping short-lived price loop");
                break;
            }
            _ = ticker.tick() => renew_provider_prices(&refresh, &provider, &token).await,
        }
    }
}

async fn renew_provider_prices(
    refresh: &RefreshEngine,
    provider: &ProviderId,
    token: &CancellationToken,
) {
    for region in known_regions(refresh, provider, token).await {
        if let Err(error) = refresh
            .renew_short_lived_prices(token, provider.as_str(), &region)
            .await
        {
            warn!(provider = %provider, region = %region, %error, "spot price renewal failed");
        }
    }
}

/// Union of the regions of every service the provider exposes.
async fn known_regions(
    refresh: &RefreshEngine,
    provider: &ProviderId,
    token: &CancellationToken,
) -> BTreeSet<String> {
    let services = match refresh.adapter(provider.as_str()) {
        Ok(adapter) => adapter.services(),
        Err(_) => return BTreeSet::new(),
    };

    let mut regions = BTreeSet::new();
    for service in services {
        match refresh.renew_regions(token, provider.as_str(), &service).await {
            Ok(by_id) => regions.extend(by_id.into_keys()),
            Err(error) => {
                warn!(provider = %provider, service = %service, %error, "region discovery failed");
            }
        }
    }
    regions
}
