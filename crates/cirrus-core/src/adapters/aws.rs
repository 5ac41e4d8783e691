//! Amazon EC2 adapter.
//!
//! Real mode reads two anonymous endpoints: the EC2 price-list offers file
//! per region (catalog and on-demand prices) and the public spot price
//! feed (short-lived prices). The feed is region-grained, so its price is
//! applied to each of the region's zones. Default mode serves a
//! deterministic fixture catalog for offline use.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::debug;

use crate::domain::{AttrValue, AttrValues, NetworkClass, NetworkPerfMapper, Price, ProviderId, SpotPriceInfo, VmInfo};
use crate::http_client::{HttpClient, HttpRequest, NoopHttpClient};
use crate::provider::{BoxFuture, ProviderAdapter, ProviderError};

const PROVIDER_ID: &str = "aws";
const SPOT_FEED_ENDPOINT: &str = "https://website.spot.ec2.aws.a2z.com/spot.json";

const REGION_NAMES: &[(&str, &str)] = &[
    ("us-east-1", "US East (N. Virginia)"),
    ("us-east-2", "US East (Ohio)"),
    ("us-west-1", "US West (N. California)"),
    ("us-west-2", "US West (Oregon)"),
    ("eu-west-1", "EU (Ireland)"),
    ("eu-central-1", "EU (Frankfurt)"),
    ("ap-southeast-1", "Asia Pacific (Singapore)"),
    ("ap-northeast-1", "Asia Pacific (Tokyo)"),
];

struct InstanceSpec {
    instance_type: &'static str,
    vcpus: f64,
    mem_gb: f64,
    ntw_perf: &'static str,
}

// offline fixture catalog; real mode replaces this with the offers file
const INSTANCE_SPECS: &[InstanceSpec] = &[
    InstanceSpec { instance_type: "t2.small", vcpus: 1.0, mem_gb: 2.0, ntw_perf: "Low to Moderate" },
    InstanceSpec { instance_type: "t3.medium", vcpus: 2.0, mem_gb: 4.0, ntw_perf: "Low to Moderate" },
    InstanceSpec { instance_type: "m4.large", vcpus: 2.0, mem_gb: 8.0, ntw_perf: "Moderate" },
    InstanceSpec { instance_type: "m4.10xlarge", vcpus: 40.0, mem_gb: 160.0, ntw_perf: "10 Gigabit" },
    InstanceSpec { instance_type: "m5.large", vcpus: 2.0, mem_gb: 8.0, ntw_perf: "Up to 10 Gigabit" },
    InstanceSpec { instance_type: "m5.xlarge", vcpus: 4.0, mem_gb: 16.0, ntw_perf: "Up to 10 Gigabit" },
    InstanceSpec { instance_type: "m5.24xlarge", vcpus: 96.0, mem_gb: 384.0, ntw_perf: "25 Gigabit" },
    InstanceSpec { instance_type: "c5.large", vcpus: 2.0, mem_gb: 4.0, ntw_perf: "Up to 10 Gigabit" },
    InstanceSpec { instance_type: "c5.xlarge", vcpus: 4.0, mem_gb: 8.0, ntw_perf: "Up to 10 Gigabit" },
    InstanceSpec { instance_type: "c5.18xlarge", vcpus: 72.0, mem_gb: 144.0, ntw_perf: "25 Gigabit" },
    InstanceSpec { instance_type: "r5.large", vcpus: 2.0, mem_gb: 16.0, ntw_perf: "Up to 10 Gigabit" },
    InstanceSpec { instance_type: "i3.large", vcpus: 2.0, mem_gb: 15.25, ntw_perf: "Up to 10 Gigabit" },
];

fn network_table() -> NetworkPerfMapper {
    NetworkPerfMapper::from_table(&[
        (NetworkClass::Low, &["Very Low", "Low", "Low to Moderate"]),
        (NetworkClass::Medium, &["Moderate", "High"]),
        (NetworkClass::High, &["Up to 10 Gigabit", "10 Gigabit"]),
        (NetworkClass::Extra, &["20 Gigabit", "25 Gigabit", "100 Gigabit"]),
    ])
}

fn offers_endpoint(region: &str) -> String {
    format!(
        "https://pricing.us-east-1.amazonaws.com/offers/v1.0/aws/AmazonEC2/current/{}/index.json",
        urlencoding::encode(region)
    )
}

/// EC2 adapter. Defaults to the deterministic fixture catalog behind
/// [`NoopHttpClient`]; a real client switches catalog and spot lookups to
/// the anonymous pricing endpoints.
pub struct AwsAdapter {
    http_client: Arc<dyn HttpClient>,
    mapper: NetworkPerfMapper,
    use_real_api: bool,
    // warm on-demand prices keyed "region/type", filled by initialize and
    // product fetches; current_prices reads it so spot entries keep their
    // on-demand component
    on_demand: Mutex<HashMap<String, f64>>,
}

impl Default for AwsAdapter {
    fn default() -> Self {
        Self {
            http_client: Arc::new(NoopHttpClient),
            mapper: network_table(),
            use_real_api: false,
            on_demand: Mutex::new(HashMap::new()),
        }
    }
}

impl AwsAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        let use_real_api = !http_client.is_mock();
        Self {
            http_client,
            use_real_api,
            ..Self::default()
        }
    }

    fn record_on_demand(&self, region: &str, vm_type: &str, price: f64) {
        self.on_demand
            .lock()
            .expect("on-demand price table is not poisoned")
            .insert(format!("{region}/{vm_type}"), price);
    }

    fn recall_on_demand(&self, region: &str, vm_type: &str) -> f64 {
        self.on_demand
            .lock()
            .expect("on-demand price table is not poisoned")
            .get(&format!("{region}/{vm_type}"))
            .copied()
            .unwrap_or(0.0)
    }

    fn region_zones(region: &str) -> Vec<String> {
        ["a", "b", "c"]
            .iter()
            .map(|suffix| format!("{region}{suffix}"))
            .collect()
    }

    async fn fetch_products(&self, region: &str) -> Result<Vec<VmInfo>, ProviderError> {
        if !self.use_real_api {
            let products = fixture_products(region);
            for vm in &products {
                self.record_on_demand(region, &vm.vm_type, vm.on_demand_price);
            }
            return Ok(products);
        }

        let request = HttpRequest::get(offers_endpoint(region));
        let response = self.http_client.execute(request).await.map_err(|e| {
            ProviderError::transport(format!("price list transport error: {}", e.message()))
        })?;
        if !response.is_success() {
            return Err(ProviderError::transport(format!(
                "price list returned status {}",
                response.status
            )));
        }

        let products = parse_offers(&response.body)?;
        for vm in &products {
            self.record_on_demand(region, &vm.vm_type, vm.on_demand_price);
        }
        debug!(region, count = products.len(), "parsed ec2 price list");
        Ok(products)
    }

    async fn fetch_spot_prices(&self, region: &str) -> Result<HashMap<String, f64>, ProviderError> {
        if !self.use_real_api {
            return Ok(fixture_products(region)
                .into_iter()
                .map(|vm| (vm.vm_type, fake_spot_price(region, vm.on_demand_price)))
                .collect());
        }

        let request = HttpRequest::get(SPOT_FEED_ENDPOINT);
        let response = self.http_client.execute(request).await.map_err(|e| {
            ProviderError::transport(format!("spot feed transport error: {}", e.message()))
        })?;
        if !response.is_success() {
            return Err(ProviderError::transport(format!(
                "spot feed returned status {}",
                response.status
            )));
        }

        parse_spot_feed(&response.body, region)
    }
}

impl ProviderAdapter for AwsAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::new(PROVIDER_ID)
    }

    fn services(&self) -> Vec<String> {
        vec![String::from("compute"), String::from("eks")]
    }

    fn initialize(
        &self,
    ) -> BoxFuture<'_, Result<HashMap<String, HashMap<String, Price>>, ProviderError>> {
        Box::pin(async move {
            let mut prices: HashMap<String, HashMap<String, Price>> = HashMap::new();
            for (region, _) in REGION_NAMES {
                let products = self.fetch_products(region).await?;
                for vm in products {
                    prices.entry(vm.vm_type).or_default().insert(
                        (*region).to_owned(),
                        Price::new(vm.on_demand_price, SpotPriceInfo::new()),
                    );
                }
            }
            Ok(prices)
        })
    }

    fn regions<'a>(
        &'a self,
        _service: &'a str,
    ) -> BoxFuture<'a, Result<BTreeMap<String, String>, ProviderError>> {
        Box::pin(async move {
            Ok(REGION_NAMES
                .iter()
                .map(|(id, name)| ((*id).to_owned(), (*name).to_owned()))
                .collect())
        })
    }

    fn zones<'a>(&'a self, region: &'a str) -> BoxFuture<'a, Result<Vec<String>, ProviderError>> {
        Box::pin(async move {
            if !REGION_NAMES.iter().any(|(id, _)| *id == region) {
                return Err(ProviderError::invalid_data(format!(
                    "unknown ec2 region: {region}"
                )));
            }
            Ok(Self::region_zones(region))
        })
    }

    fn products<'a>(
        &'a self,
        _service: &'a str,
        region: &'a str,
    ) -> BoxFuture<'a, Result<Vec<VmInfo>, ProviderError>> {
        Box::pin(async move {
            if !REGION_NAMES.iter().any(|(id, _)| *id == region) {
                return Err(ProviderError::invalid_data(format!(
                    "unknown ec2 region: {region}"
                )));
            }
            self.fetch_products(region).await
        })
    }

    fn attribute_values<'a>(
        &'a self,
        _service: &'a str,
        attr_name: &'a str,
    ) -> BoxFuture<'a, Result<AttrValues, ProviderError>> {
        Box::pin(async move {
            // the catalog is uniform across regions, any region works here
            let products = self.fetch_products("us-east-1").await?;
            let mut values = AttrValues::new();
            for vm in products {
                let value = match attr_name {
                    "vcpu" => vm.cpus,
                    "memory" => vm.mem_gb,
                    other => {
                        return Err(ProviderError::invalid_data(format!(
                            "unknown ec2 attribute name: {other}"
                        )))
                    }
                };
                values.push(AttrValue::new(value));
            }
            Ok(values)
        })
    }

    fn current_prices<'a>(
        &'a self,
        region: &'a str,
    ) -> BoxFuture<'a, Result<HashMap<String, Price>, ProviderError>> {
        Box::pin(async move {
            if !REGION_NAMES.iter().any(|(id, _)| *id == region) {
                return Err(ProviderError::invalid_data(format!(
                    "unknown ec2 region: {region}"
                )));
            }

            let spot = self.fetch_spot_prices(region).await?;
            let zones = Self::region_zones(region);

            let mut prices = HashMap::with_capacity(spot.len());
            for (vm_type, spot_price) in spot {
                let per_zone: SpotPriceInfo = zones
                    .iter()
                    .map(|zone| (zone.clone(), spot_price))
                    .collect();
                let on_demand = self.recall_on_demand(region, &vm_type);
                prices.insert(vm_type, Price::new(on_demand, per_zone));
            }
            Ok(prices)
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

fn fixture_products(region: &str) -> Vec<VmInfo> {
    INSTANCE_SPECS
        .iter()
        .map(|spec| VmInfo {
            vm_type: spec.instance_type.to_owned(),
            cpus: spec.vcpus,
            mem_gb: spec.mem_gb,
            ntw_perf: spec.ntw_perf.to_owned(),
            ntw_class: None,
            on_demand_price: fake_on_demand_price(region, spec.instance_type),
            spot_price: SpotPriceInfo::new(),
        })
        .collect()
}

fn string_seed(value: &str) -> u64 {
    value.bytes().fold(0_u64, |acc, byte| {
        acc.wrapping_mul(33).wrapping_add(byte as u64)
    })
}

fn fake_on_demand_price(region: &str, vm_type: &str) -> f64 {
    let seed = string_seed(region) ^ string_seed(vm_type);
    0.02 + (seed % 480) as f64 / 1_000.0
}

fn fake_spot_price(region: &str, on_demand: f64) -> f64 {
    // spot hovers around a third of on-demand in the fixture data
    let seed = string_seed(region);
    on_demand * (0.25 + (seed % 20) as f64 / 100.0)
}

// ---------------------------------------------------------------------------
// EC2 price-list offers file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OffersIndex {
    #[serde(default)]
    products: HashMap<String, OfferProduct>,
    #[serde(default)]
    terms: OfferTerms,
}

#[derive(Debug, Deserialize)]
struct OfferProduct {
    #[serde(rename = "productFamily", default)]
    product_family: Option<String>,
    #[serde(default)]
    attributes: OfferAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct OfferAttributes {
    #[serde(rename = "instanceType")]
    instance_type: Option<String>,
    vcpu: Option<String>,
    memory: Option<String>,
    #[serde(rename = "networkPerformance")]
    network_performance: Option<String>,
    #[serde(rename = "operatingSystem")]
    operating_system: Option<String>,
    tenancy: Option<String>,
    #[serde(rename = "preInstalledSw")]
    pre_installed_sw: Option<String>,
    capacitystatus: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OfferTerms {
    #[serde(rename = "OnDemand", default)]
    on_demand: HashMap<String, HashMap<String, OfferTerm>>,
}

#[derive(Debug, Deserialize)]
struct OfferTerm {
    #[serde(rename = "priceDimensions", default)]
    price_dimensions: HashMap<String, OfferPriceDimension>,
}

#[derive(Debug, Deserialize)]
struct OfferPriceDimension {
    #[serde(rename = "pricePerUnit", default)]
    price_per_unit: HashMap<String, String>,
}

impl OfferAttributes {
    /// Keep shared-tenancy Linux instances without pre-installed software,
    /// the same slice of the catalog everyone prices against.
    fn is_plain_linux_instance(&self) -> bool {
        self.operating_system.as_deref() == Some("Linux")
            && self.tenancy.as_deref() == Some("Shared")
            && self.pre_installed_sw.as_deref() == Some("NA")
            && self.capacitystatus.as_deref() == Some("Used")
    }
}

fn parse_offers(body: &str) -> Result<Vec<VmInfo>, ProviderError> {
    let index: OffersIndex = serde_json::from_str(body)
        .map_err(|e| ProviderError::invalid_data(format!("failed to parse price list: {e}")))?;

    let mut products = Vec::new();
    for (sku, product) in &index.products {
        if product.product_family.as_deref() != Some("Compute Instance")
            || !product.attributes.is_plain_linux_instance()
        {
            continue;
        }
        let attrs = &product.attributes;
        let (Some(instance_type), Some(vcpu), Some(memory), Some(ntw_perf)) = (
            attrs.instance_type.as_ref(),
            attrs.vcpu.as_ref(),
            attrs.memory.as_ref(),
            attrs.network_performance.as_ref(),
        ) else {
            continue;
        };

        let Ok(cpus) = vcpu.replace(',', "").parse::<f64>() else {
            continue;
        };
        let Some(mem_gb) = parse_memory_gib(memory) else {
            continue;
        };

        products.push(VmInfo {
            vm_type: instance_type.clone(),
            cpus,
            mem_gb,
            ntw_perf: ntw_perf.clone(),
            ntw_class: None,
            on_demand_price: on_demand_price_of(&index, sku),
            spot_price: SpotPriceInfo::new(),
        });
    }

    products.sort_by(|a, b| a.vm_type.cmp(&b.vm_type));
    Ok(products)
}

fn on_demand_price_of(index: &OffersIndex, sku: &str) -> f64 {
    index
        .terms
        .on_demand
        .get(sku)
        .into_iter()
        .flat_map(|terms| terms.values())
        .flat_map(|term| term.price_dimensions.values())
        .filter_map(|dimension| dimension.price_per_unit.get("USD"))
        .filter_map(|usd| usd.parse::<f64>().ok())
        .find(|price| *price > 0.0)
        .unwrap_or(0.0)
}

/// Parses price-list memory strings like `"16 GiB"` or `"1,952 GiB"`.
fn parse_memory_gib(memory: &str) -> Option<f64> {
    memory
        .replace(',', "")
        .trim()
        .trim_end_matches("GiB")
        .trim()
        .parse::<f64>()
        .ok()
}

// ---------------------------------------------------------------------------
// Spot price feed
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SpotFeed {
    config: SpotFeedConfig,
}

#[derive(Debug, Deserialize)]
struct SpotFeedConfig {
    #[serde(default)]
    regions: Vec<SpotFeedRegion>,
}

#[derive(Debug, Deserialize)]
struct SpotFeedRegion {
    region: String,
    #[serde(rename = "instanceTypes", default)]
    instance_types: Vec<SpotFeedInstanceType>,
}

#[derive(Debug, Deserialize)]
struct SpotFeedInstanceType {
    #[serde(default)]
    sizes: Vec<SpotFeedSize>,
}

#[derive(Debug, Deserialize)]
struct SpotFeedSize {
    size: String,
    #[serde(rename = "valueColumns", default)]
    value_columns: Vec<SpotFeedValueColumn>,
}

#[derive(Debug, Deserialize)]
struct SpotFeedValueColumn {
    name: String,
    #[serde(default)]
    prices: HashMap<String, String>,
}

fn parse_spot_feed(body: &str, region: &str) -> Result<HashMap<String, f64>, ProviderError> {
    let feed: SpotFeed = serde_json::from_str(body)
        .map_err(|e| ProviderError::invalid_data(format!("failed to parse spot feed: {e}")))?;

    let Some(feed_region) = feed
        .config
        .regions
        .iter()
        .find(|candidate| candidate.region == region)
    else {
        return Err(ProviderError::invalid_data(format!(
            "region {region} missing from the spot feed"
        )));
    };

    let mut prices = HashMap::new();
    for instance_type in &feed_region.instance_types {
        for size in &instance_type.sizes {
            let linux_price = size
                .value_columns
                .iter()
                .filter(|column| column.name == "linux")
                .filter_map(|column| column.prices.get("USD"))
                // the feed marks unavailable prices with "N/A*"
                .filter_map(|usd| usd.parse::<f64>().ok())
                .next();
            if let Some(price) = linux_price {
                prices.insert(size.size.clone(), price);
            }
        }
    }
    Ok(prices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_catalog_maps_every_descriptor() {
        let adapter = AwsAdapter::default();
        let products = adapter
            .products("compute", "us-east-1")
            .await
            .expect("fixture catalog");

        assert_eq!(products.len(), INSTANCE_SPECS.len());
        for vm in &products {
            assert!(vm.ntw_class.is_none());
            adapter
                .network_perf_mapper()
                .map(&vm.ntw_perf)
                .expect("ec2 network table covers the fixture");
            assert!(vm.on_demand_price > 0.0);
        }
    }

    #[tokio::test]
    async fn current_prices_cover_every_zone_and_keep_on_demand() {
        let adapter = AwsAdapter::default();
        assert!(adapter.has_short_lived_price_info());

        // products warm the internal on-demand table first
        let products = adapter
            .products("compute", "us-west-2")
            .await
            .expect("fixture catalog");
        let prices = adapter
            .current_prices("us-west-2")
            .await
            .expect("fixture prices");

        let m5 = products
            .iter()
            .find(|vm| vm.vm_type == "m5.large")
            .expect("fixture contains m5.large");
        let price = &prices["m5.large"];

        assert_eq!(price.on_demand, m5.on_demand_price);
        assert_eq!(price.spot.len(), 3);
        assert!(price.spot.contains_key("us-west-2a"));
        for spot in price.spot.values() {
            assert!(*spot > 0.0 && *spot < price.on_demand);
        }
    }

    #[tokio::test]
    async fn attribute_values_use_provider_names() {
        let adapter = AwsAdapter::default();

        let vcpus = adapter
            .attribute_values("compute", "vcpu")
            .await
            .expect("vcpu values");
        assert!(vcpus.len() < INSTANCE_SPECS.len(), "duplicates collapse");

        let error = adapter
            .attribute_values("compute", "cpu")
            .await
            .expect_err("ec2 names it vcpu");
        assert!(error.message().contains("unknown ec2 attribute name"));
    }

    #[test]
    fn parses_price_list_memory_strings() {
        assert_eq!(parse_memory_gib("16 GiB"), Some(16.0));
        assert_eq!(parse_memory_gib("1,952 GiB"), Some(1952.0));
        assert_eq!(parse_memory_gib("0.5 GiB"), Some(0.5));
        assert_eq!(parse_memory_gib("NA"), None);
    }

    #[test]
    fn parses_spot_feed_and_skips_unavailable_prices() {
        let body = r#"{
            "config": {
                "regions": [{
                    "region": "us-east-1",
                    "instanceTypes": [{
                        "sizes": [
                            {"size": "m5.large", "valueColumns": [{"name": "linux", "prices": {"USD": "0.0345"}}]},
                            {"size": "c5.large", "valueColumns": [{"name": "linux", "prices": {"USD": "N/A*"}}]},
                            {"size": "r5.large", "valueColumns": [{"name": "mswin", "prices": {"USD": "0.2"}}]}
                        ]
                    }]
                }]
            }
        }"#;

        let prices = parse_spot_feed(body, "us-east-1").expect("feed parses");
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["m5.large"], 0.0345);

        let error = parse_spot_feed(body, "eu-west-1").expect_err("region absent");
        assert!(error.message().contains("missing from the spot feed"));
    }

    #[test]
    fn parses_offers_index() {
        let body = r#"{
            "products": {
                "SKU1": {
                    "productFamily": "Compute Instance",
                    "attributes": {
                        "instanceType": "m5.large", "vcpu": "2", "memory": "8 GiB",
                        "networkPerformance": "Up to 10 Gigabit",
                        "operatingSystem": "Linux", "tenancy": "Shared",
                        "preInstalledSw": "NA", "capacitystatus": "Used"
                    }
                },
                "SKU2": {
                    "productFamily": "Storage",
                    "attributes": {}
                },
                "SKU3": {
                    "productFamily": "Compute Instance",
                    "attributes": {
                        "instanceType": "m5.windows", "vcpu": "2", "memory": "8 GiB",
                        "networkPerformance": "Up to 10 Gigabit",
                        "operatingSystem": "Windows", "tenancy": "Shared",
                        "preInstalledSw": "NA", "capacitystatus": "Used"
                    }
                }
            },
            "terms": {
                "OnDemand": {
                    "SKU1": {
                        "SKU1.TERM": {
                            "priceDimensions": {
                                "SKU1.TERM.DIM": {"pricePerUnit": {"USD": "0.0960000000"}}
                            }
                        }
                    }
                }
            }
        }"#;

        let products = parse_offers(body).expect("offers parse");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].vm_type, "m5.large");
        assert_eq!(products[0].cpus, 2.0);
        assert_eq!(products[0].mem_gb, 8.0);
        assert_eq!(products[0].on_demand_price, 0.096);
    }
}
