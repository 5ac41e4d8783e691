//! End-to-end behavior of the refresh and query engines against a scripted
//! in-memory provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cirrus_core::cache::{CacheStore, CacheValue};
use cirrus_core::domain::{
    AttrValue, AttrValues, NetworkClass, NetworkPerfMapper, Price, ProviderId, SpotPriceInfo,
    VmInfo,
};
use cirrus_core::provider::{BoxFuture, ProviderAdapter, ProviderError};
use cirrus_core::{keys, InfoConfig, InfoError, QueryEngine, RefreshEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailWith {
    Products,
    CurrentPrices,
    AttributeValues,
    Zones,
    Regions,
    Initialize,
}

struct DummyAdapter {
    fail: Option<FailWith>,
    attr_values: AttrValues,
    vms: Vec<VmInfo>,
    mapper: NetworkPerfMapper,
}

impl Default for DummyAdapter {
    fn default() -> Self {
        Self {
            fail: None,
            attr_values: AttrValues::new(),
            vms: Vec::new(),
            mapper: NetworkPerfMapper::from_table(&[(NetworkClass::High, &["high"])]),
        }
    }
}

impl DummyAdapter {
    fn with_fail(fail: FailWith) -> Self {
        Self {
            fail: Some(fail),
            ..Self::default()
        }
    }

    fn with_attr_values(values: &[f64]) -> Self {
        Self {
            attr_values: values.iter().map(|v| AttrValue::new(*v)).collect(),
            ..Self::default()
        }
    }

    fn with_vms(vms: Vec<VmInfo>) -> Self {
        Self {
            vms,
            ..Self::default()
        }
    }
}

fn vm(vm_type: &str, cpus: f64, mem_gb: f64, ntw_perf: &str) -> VmInfo {
    VmInfo {
        vm_type: vm_type.to_owned(),
        cpus,
        mem_gb,
        ntw_perf: ntw_perf.to_owned(),
        ntw_class: None,
        on_demand_price: 0.0,
        spot_price: SpotPriceInfo::new(),
    }
}

fn dummy_prices() -> HashMap<String, Price> {
    HashMap::from([
        (
            String::from("c1.xlarge"),
            Price::new(0.52, SpotPriceInfo::from([(String::from("dummyZone1"), 0.164)])),
        ),
        (
            String::from("c4.2xlarge"),
            Price::new(0.4, SpotPriceInfo::from([(String::from("dummyZone2"), 0.12)])),
        ),
        (
            String::from("c3.large"),
            Price::new(0.11, SpotPriceInfo::from([(String::from("dummyZone1"), 0.053)])),
        ),
    ])
}

impl ProviderAdapter for DummyAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::new("dummy")
    }

    fn services(&self) -> Vec<String> {
        vec![String::from("dummyService")]
    }

    fn initialize(
        &self,
    ) -> BoxFuture<'_, Result<HashMap<String, HashMap<String, Price>>, ProviderError>> {
        Box::pin(async move {
            if self.fail == Some(FailWith::Initialize) {
                return Err(ProviderError::transport("initialization failed"));
            }
            Ok(dummy_prices()
                .into_iter()
                .map(|(vm_type, price)| {
                    (vm_type, HashMap::from([(String::from("dummyRegion"), price)]))
                })
                .collect())
        })
    }

    fn regions<'a>(
        &'a self,
        _service: &'a str,
    ) -> BoxFuture<'a, Result<BTreeMap<String, String>, ProviderError>> {
        Box::pin(async move {
            if self.fail == Some(FailWith::Regions) {
                return Err(ProviderError::transport("could not get regions"));
            }
            Ok(BTreeMap::from([
                (String::from("eu-central-1"), String::from("EU (Frankfurt)")),
                (String::from("eu-west-1"), String::from("EU (Ireland)")),
                (String::from("us-west-2"), String::from("US West (Oregon)")),
            ]))
        })
    }

    fn zones<'a>(&'a self, _region: &'a str) -> BoxFuture<'a, Result<Vec<String>, ProviderError>> {
        Box::pin(async move {
            if self.fail == Some(FailWith::Zones) {
                return Err(ProviderError::transport("could not get zones"));
            }
            Ok(vec![String::from("dummyZone1"), String::from("dummyZone2")])
        })
    }

    fn products<'a>(
        &'a self,
        _service: &'a str,
        _region: &'a str,
    ) -> BoxFuture<'a, Result<Vec<VmInfo>, ProviderError>> {
        Box::pin(async move {
            if self.fail == Some(FailWith::Products) {
                return Err(ProviderError::transport("could not get products"));
            }
            Ok(self.vms.clone())
        })
    }

    fn attribute_values<'a>(
        &'a self,
        _service: &'a str,
        attr_name: &'a str,
    ) -> BoxFuture<'a, Result<AttrValues, ProviderError>> {
        Box::pin(async move {
            if self.fail == Some(FailWith::AttributeValues) {
                return Err(ProviderError::transport("could not get attribute values"));
            }
            // the core must have translated to this provider's own names
            assert!(attr_name == "vcpu" || attr_name == "memory", "got {attr_name}");
            Ok(self.attr_values.clone())
        })
    }

    fn current_prices<'a>(
        &'a self,
        _region: &'a str,
    ) -> BoxFuture<'a, Result<HashMap<String, Price>, ProviderError>> {
        Box::pin(async move {
            if self.fail == Some(FailWith::CurrentPrices) {
                return Err(ProviderError::transport("could not get current prices"));
            }
            Ok(dummy_prices())
        })
    }

    fn has_short_lived_price_info(&self) -> bool {
        true
    }

    fn cpu_attr_name(&self) -> &str {
        "vcpu"
    }

    fn memory_attr_name(&self) -> &str {
        "memory"
    }

    fn network_perf_mapper(&self) -> &NetworkPerfMapper {
        &self.mapper
    }
}

fn service_with(adapter: DummyAdapter) -> (QueryEngine, Arc<RefreshEngine>) {
    let config = InfoConfig::default();
    let store = CacheStore::new(config.cache_default_ttl());
    let refresh = Arc::new(
        RefreshEngine::new(
            &config,
            store,
            vec![Arc::new(adapter) as Arc<dyn ProviderAdapter>],
        )
        .expect("adapters supplied"),
    );
    (QueryEngine::new(Arc::clone(&refresh)), refresh)
}

fn zone_list(names: &[&str]) -> Vec<String> {
    names.iter().map(|z| (*z).to_owned()).collect()
}

#[tokio::test]
async fn attr_values_come_back_sorted_for_both_canonical_names() {
    let (queries, _) = service_with(DummyAdapter::with_attr_values(&[16.0, 15.0, 17.0]));
    let token = CancellationToken::new();

    let cpus = queries
        .get_attr_values(&token, "dummy", "dummyService", "cpu")
        .await
        .expect("cpu values");
    assert_eq!(cpus, vec![15.0, 16.0, 17.0]);

    let memory = queries
        .get_attr_values(&token, "dummy", "dummyService", "memory")
        .await
        .expect("memory values");
    assert_eq!(memory, vec![15.0, 16.0, 17.0]);
}

#[tokio::test]
async fn unknown_attribute_is_rejected_before_the_provider_is_consulted() {
    let (queries, _) = service_with(DummyAdapter::with_attr_values(&[15.0]));
    let token = CancellationToken::new();

    let error = queries
        .get_attr_values(&token, "dummy", "dummyService", "invalid")
        .await
        .expect_err("not a canonical attribute");
    assert_eq!(error.to_string(), "unsupported attribute: invalid");
}

#[tokio::test]
async fn attr_value_transport_failure_propagates() {
    let (queries, _) = service_with(DummyAdapter::with_fail(FailWith::AttributeValues));
    let token = CancellationToken::new();

    let error = queries
        .get_attr_values(&token, "dummy", "dummyService", "cpu")
        .await
        .expect_err("transport failure");
    assert!(error.to_string().contains("could not get attribute values"));
}

#[tokio::test]
async fn price_averages_over_a_single_present_zone() {
    let (queries, _) = service_with(DummyAdapter::default());
    let token = CancellationToken::new();

    let (on_demand, avg_spot) = queries
        .get_price(&token, "dummy", "dummyRegion", "c3.large", &zone_list(&["dummyZone1"]))
        .await
        .expect("price resolves");
    assert_eq!(on_demand, 0.11);
    assert_eq!(avg_spot, 0.053);
}

#[tokio::test]
async fn price_divides_by_all_supplied_zones() {
    let (queries, _) = service_with(DummyAdapter::default());
    let token = CancellationToken::new();

    let zones = zone_list(&["dummyZone1", "dummyZone2", "dummyZone3", "dummyZone4"]);
    let (on_demand, avg_spot) = queries
        .get_price(&token, "dummy", "dummyRegion", "c3.large", &zones)
        .await
        .expect("price resolves");
    assert_eq!(on_demand, 0.11);
    assert_eq!(avg_spot, 0.01325);
}

#[tokio::test]
async fn price_without_a_matching_zone_averages_to_zero() {
    let (queries, _) = service_with(DummyAdapter::default());
    let token = CancellationToken::new();

    let zones = zone_list(&["dummyZone2", "dummyZone3", "dummyZone4"]);
    let (on_demand, avg_spot) = queries
        .get_price(&token, "dummy", "dummyRegion", "c3.large", &zones)
        .await
        .expect("price resolves");
    assert_eq!(on_demand, 0.11);
    assert_eq!(avg_spot, 0.0);
}

#[tokio::test]
async fn price_refresh_failure_propagates() {
    let (queries, _) = service_with(DummyAdapter::with_fail(FailWith::CurrentPrices));
    let token = CancellationToken::new();

    let error = queries
        .get_price(&token, "dummy", "dummyRegion", "c3.large", &zone_list(&["dummyZone1"]))
        .await
        .expect_err("refresh fails");
    assert!(error.to_string().contains("could not get current prices"));
}

#[tokio::test]
async fn empty_zone_list_is_a_validation_error() {
    let (queries, _) = service_with(DummyAdapter::default());
    let token = CancellationToken::new();

    let error = queries
        .get_price(&token, "dummy", "dummyRegion", "c3.large", &[])
        .await
        .expect_err("nothing to divide by");
    assert!(matches!(error, InfoError::EmptyZones));
}

#[tokio::test]
async fn zones_are_served_and_cached_read_through() {
    let (queries, refresh) = service_with(DummyAdapter::default());
    let token = CancellationToken::new();

    let zones = queries
        .get_zones(&token, "dummy", "dummyRegion")
        .await
        .expect("zones resolve");
    assert_eq!(zones, zone_list(&["dummyZone1", "dummyZone2"]));

    let cached = refresh
        .store()
        .get(&keys::zones_key("dummy", "dummyRegion"))
        .await;
    assert_eq!(cached, Some(CacheValue::Zones(zones)));
}

#[tokio::test]
async fn zone_refresh_failure_propagates() {
    let (queries, _) = service_with(DummyAdapter::with_fail(FailWith::Zones));
    let token = CancellationToken::new();

    let error = queries
        .get_zones(&token, "dummy", "dummyRegion")
        .await
        .expect_err("refresh fails");
    assert!(error.to_string().contains("could not get zones"));
}

#[tokio::test]
async fn regions_are_served_read_through_and_failures_propagate() {
    let (queries, _) = service_with(DummyAdapter::default());
    let token = CancellationToken::new();

    let regions = queries
        .get_regions(&token, "dummy", "dummyService")
        .await
        .expect("regions resolve");
    assert_eq!(regions.len(), 3);
    assert_eq!(
        regions.get("us-west-2").map(String::as_str),
        Some("US West (Oregon)")
    );

    let (failing, _) = service_with(DummyAdapter::with_fail(FailWith::Regions));
    let error = failing
        .get_regions(&token, "dummy", "dummyService")
        .await
        .expect_err("refresh fails");
    assert!(error.to_string().contains("could not get regions"));
}

#[tokio::test]
async fn unknown_provider_is_a_validation_error() {
    let (queries, _) = service_with(DummyAdapter::default());
    let token = CancellationToken::new();

    let error = queries
        .get_zones(&token, "nimbus", "dummyRegion")
        .await
        .expect_err("no such adapter");
    assert_eq!(error.to_string(), "invalid provider: nimbus");
}

#[tokio::test]
async fn initialize_returns_the_raw_map_and_warms_the_price_keys() {
    let (queries, refresh) = service_with(DummyAdapter::default());
    let token = CancellationToken::new();

    let prices = queries
        .initialize(&token, "dummy")
        .await
        .expect("initialize succeeds");
    assert_eq!(prices.len(), 3);

    let cached = refresh
        .store()
        .get(&keys::price_key("dummy", "dummyRegion", "c1.xlarge"))
        .await;
    let Some(CacheValue::Price(price)) = cached else {
        panic!("price entry expected after initialize");
    };
    assert_eq!(price.on_demand, 0.52);
    assert_eq!(price.spot.get("dummyZone1"), Some(&0.164));
}

#[tokio::test]
async fn initialize_failure_propagates() {
    let (queries, refresh) = service_with(DummyAdapter::with_fail(FailWith::Initialize));
    let token = CancellationToken::new();

    let error = queries
        .initialize(&token, "dummy")
        .await
        .expect_err("initialize fails");
    assert!(error.to_string().contains("initialization failed"));
    assert!(refresh.store().is_empty().await);
}

#[tokio::test]
async fn renewed_catalog_round_trips_into_product_details() {
    let vms = vec![
        vm("c1.xlarge", 8.0, 15.0, "high"),
        vm("c3.large", 2.0, 3.75, "high"),
        vm("c9.unmapped", 2.0, 4.0, "mystery descriptor"),
    ];
    let (queries, refresh) = service_with(DummyAdapter::with_vms(vms));
    let token = CancellationToken::new();

    let renewed = refresh
        .renew_vms(&token, "dummy", "dummyService", "dummyRegion")
        .await
        .expect("renewal succeeds");
    // the unmapped record is dropped, the rest keep adapter order
    assert_eq!(renewed.len(), 2);
    assert!(renewed.iter().all(|vm| vm.ntw_class == Some(NetworkClass::High)));

    refresh
        .renew_short_lived_prices(&token, "dummy", "dummyRegion")
        .await
        .expect("price renewal succeeds");

    let details = queries
        .get_product_details("dummy", "dummyService", "dummyRegion")
        .await
        .expect("details resolve");
    assert_eq!(details.len(), 2);
    assert_eq!(details[0].vm_type, "c1.xlarge");
    assert_eq!(details[0].ntw_class, NetworkClass::High);
    // price entry overwrites the catalog's on-demand value
    assert_eq!(details[0].on_demand_price, 0.52);
    assert_eq!(details[1].vm_type, "c3.large");
    assert_eq!(details[1].on_demand_price, 0.11);
}

#[tokio::test]
async fn product_details_emit_only_vms_with_a_price_entry() {
    let (queries, refresh) = service_with(DummyAdapter::default());

    let mut type1 = vm("type-1", 1.0, 2.0, "high");
    type1.ntw_class = Some(NetworkClass::High);
    type1.on_demand_price = 0.021;
    let mut type2 = vm("type-2", 2.0, 4.0, "high");
    type2.ntw_class = Some(NetworkClass::High);
    let mut type3 = vm("type-3", 2.0, 4.0, "high");
    type3.ntw_class = Some(NetworkClass::High);

    refresh
        .store()
        .set(
            keys::vms_key("dummy", "dummyService", "dummyRegion"),
            CacheValue::Vms(vec![type1, type2, type3]),
            None,
        )
        .await;
    refresh
        .store()
        .set(
            keys::price_key("dummy", "dummyRegion", "type-1"),
            CacheValue::Price(Price::new(
                0.023,
                SpotPriceInfo::from([(String::from("dummyZone"), 0.0069)]),
            )),
            None,
        )
        .await;
    refresh
        .store()
        .set(
            keys::price_key("dummy", "dummyRegion", "type-2"),
            CacheValue::Price(Price::new(
                0.043,
                SpotPriceInfo::from([(String::from("dummyZone"), 0.0087)]),
            )),
            None,
        )
        .await;

    let details = queries
        .get_product_details("dummy", "dummyService", "dummyRegion")
        .await
        .expect("details resolve");

    assert_eq!(details.len(), 2);
    assert_eq!(details[0].vm_type, "type-1");
    assert_eq!(details[0].cpus, 1.0);
    assert_eq!(details[0].mem_gb, 2.0);
    assert_eq!(details[0].on_demand_price, 0.023);
    assert_eq!(details[0].spot_price.len(), 1);
    assert_eq!(details[0].spot_price[0].zone, "dummyZone");
    assert_eq!(details[1].vm_type, "type-2");
    assert_eq!(details[1].on_demand_price, 0.043);

    // no intervening refresh: a second read is identical
    let again = queries
        .get_product_details("dummy", "dummyService", "dummyRegion")
        .await
        .expect("details resolve again");
    assert_eq!(details, again);
}

#[tokio::test]
async fn cold_product_details_fail_with_the_canonical_key() {
    let (queries, _) = service_with(DummyAdapter::default());

    let error = queries
        .get_product_details("dummy", "dummyService", "dummyRegion")
        .await
        .expect_err("nothing cached yet");
    assert_eq!(
        error.to_string(),
        "vms not yet cached for the key: \
         /cirrus.cloud/cloudinfo/providers/dummy/services/dummyService/regions/dummyRegion/vms"
    );
}

#[tokio::test]
async fn failed_catalog_renewal_leaves_the_cache_untouched() {
    let (_, refresh) = service_with(DummyAdapter::with_fail(FailWith::Products));
    let token = CancellationToken::new();

    let error = refresh
        .renew_vms(&token, "dummy", "dummyService", "dummyRegion")
        .await
        .expect_err("renewal fails");
    assert!(error.to_string().contains("could not get products"));
    assert!(refresh.store().is_empty().await);
}

#[tokio::test]
async fn renewing_an_unchanged_catalog_is_idempotent() {
    let vms = vec![vm("c3.large", 2.0, 3.75, "high")];
    let (_, refresh) = service_with(DummyAdapter::with_vms(vms));
    let token = CancellationToken::new();

    let first = refresh
        .renew_vms(&token, "dummy", "dummyService", "dummyRegion")
        .await
        .expect("first renewal");
    let second = refresh
        .renew_vms(&token, "dummy", "dummyService", "dummyRegion")
        .await
        .expect("second renewal");
    assert_eq!(first, second);

    let cached = refresh
        .store()
        .get(&keys::vms_key("dummy", "dummyService", "dummyRegion"))
        .await;
    assert_eq!(cached, Some(CacheValue::Vms(second)));
}
