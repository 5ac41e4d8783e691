//! Oracle Cloud Infrastructure adapter.
//!
//! OCI's compute catalog is a fixed shape table; on-demand prices come from
//! the anonymous ITRA product endpoint, priced per part number and scaled
//! by OCPU count. Oracle has no spot market, so short-lived refreshes are
//! unsupported here.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::domain::{AttrValue, AttrValues, NetworkClass, NetworkPerfMapper, Price, ProviderId, SpotPriceInfo, VmInfo};
use crate::http_client::{HttpClient, HttpRequest, NoopHttpClient};
use crate::provider::{BoxFuture, ProviderAdapter, ProviderError};

const PROVIDER_ID: &str = "oracle";
const ITRA_ENDPOINT: &str = "https://itra.oraclecloud.com/itas/.anon/myservices/api/v1/products";
const PAY_AS_YOU_GO: &str = "PAY_AS_YOU_GO";

struct ShapeSpec {
    shape: &'static str,
    part_number: &'static str,
    cpus: f64,
    mem_gb: f64,
    ntw_perf: &'static str,
}

const SHAPE_SPECS: &[ShapeSpec] = &[
    ShapeSpec { shape: "VM.Standard1.1", part_number: "B88317", cpus: 1.0, mem_gb: 7.0, ntw_perf: "0.6 Gbps" },
    ShapeSpec { shape: "VM.Standard2.1", part_number: "B88514", cpus: 1.0, mem_gb: 15.0, ntw_perf: "1 Gbps" },
    ShapeSpec { shape: "VM.Standard1.2", part_number: "B88317", cpus: 2.0, mem_gb: 14.0, ntw_perf: "1.2 Gbps" },
    ShapeSpec { shape: "VM.Standard2.2", part_number: "B88514", cpus: 2.0, mem_gb: 30.0, ntw_perf: "2 Gbps" },
    ShapeSpec { shape: "VM.Standard1.4", part_number: "B88317", cpus: 4.0, mem_gb: 28.0, ntw_perf: "1.2 Gbps" },
    ShapeSpec { shape: "VM.Standard2.4", part_number: "B88514", cpus: 4.0, mem_gb: 60.0, ntw_perf: "4.1 Gbps" },
    ShapeSpec { shape: "VM.Standard1.8", part_number: "B88317", cpus: 8.0, mem_gb: 56.0, ntw_perf: "2.4 Gbps" },
    ShapeSpec { shape: "VM.Standard2.8", part_number: "B88514", cpus: 8.0, mem_gb: 120.0, ntw_perf: "8.2 Gbps" },
    ShapeSpec { shape: "VM.Standard1.16", part_number: "B88317", cpus: 16.0, mem_gb: 112.0, ntw_perf: "4.8 Gbps" },
    ShapeSpec { shape: "VM.Standard2.16", part_number: "B88514", cpus: 16.0, mem_gb: 240.0, ntw_perf: "16.4 Gbps" },
    ShapeSpec { shape: "VM.Standard2.24", part_number: "B88514", cpus: 24.0, mem_gb: 320.0, ntw_perf: "24.6 Gbps" },
    ShapeSpec { shape: "VM.DenseIO1.4", part_number: "B88316", cpus: 4.0, mem_gb: 60.0, ntw_perf: "1.2 Gbps" },
    ShapeSpec { shape: "VM.DenseIO1.8", part_number: "B88316", cpus: 8.0, mem_gb: 60.0, ntw_perf: "2.4 Gbps" },
    ShapeSpec { shape: "VM.DenseIO2.8", part_number: "B88516", cpus: 8.0, mem_gb: 120.0, ntw_perf: "8.2 Gbps" },
    ShapeSpec { shape: "VM.DenseIO1.16", part_number: "B88316", cpus: 16.0, mem_gb: 120.0, ntw_perf: "4.8 Gbps" },
    ShapeSpec { shape: "VM.DenseIO2.16", part_number: "B88516", cpus: 16.0, mem_gb: 240.0, ntw_perf: "16.4 Gbps" },
    ShapeSpec { shape: "VM.DenseIO2.24", part_number: "B88516", cpus: 24.0, mem_gb: 320.0, ntw_perf: "24.6 Gbps" },
];

const REGION_NAMES: &[(&str, &str)] = &[
    ("uk-london-1", "EU (London)"),
    ("eu-frankfurt-1", "EU (Frankfurt)"),
    ("us-ashburn-1", "US East (Ashburn)"),
    ("us-phoenix-1", "US West (Phoenix)"),
];

fn network_table() -> NetworkPerfMapper {
    NetworkPerfMapper::from_table(&[
        (NetworkClass::Low, &["0.6 Gbps"]),
        (NetworkClass::Medium, &["1 Gbps", "1.2 Gbps", "2 Gbps", "2.4 Gbps"]),
        (NetworkClass::High, &["4.1 Gbps", "4.8 Gbps", "8.2 Gbps"]),
        (NetworkClass::Extra, &["16.4 Gbps", "24.6 Gbps"]),
    ])
}

/// Oracle adapter. Defaults to deterministic offline pricing behind
/// [`NoopHttpClient`]; a real client switches ITRA lookups to the network.
pub struct OracleAdapter {
    http_client: Arc<dyn HttpClient>,
    mapper: NetworkPerfMapper,
    use_real_api: bool,
    // part-number prices are stable within a process lifetime
    part_prices: Mutex<HashMap<String, f64>>,
}

impl Default for OracleAdapter {
    fn default() -> Self {
        Self {
            http_client: Arc::new(NoopHttpClient),
            mapper: network_table(),
            use_real_api: false,
            part_prices: Mutex::new(HashMap::new()),
        }
    }
}

impl OracleAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        let use_real_api = !http_client.is_mock();
        Self {
            http_client,
            use_real_api,
            ..Self::default()
        }
    }

    /// PAY_AS_YOU_GO unit price of one part number.
    async fn part_price(&self, part_number: &str) -> Result<f64, ProviderError> {
        if let Some(price) = self
            .part_prices
            .lock()
            .expect("part price table is not poisoned")
            .get(part_number)
        {
            return Ok(*price);
        }

        let price = if self.use_real_api {
            self.fetch_itra_price(part_number).await?
        } else {
            fake_unit_price(part_number)
        };

        self.part_prices
            .lock()
            .expect("part price table is not poisoned")
            .insert(part_number.to_owned(), price);
        Ok(price)
    }

    async fn fetch_itra_price(&self, part_number: &str) -> Result<f64, ProviderError> {
        let endpoint = format!(
            "{ITRA_ENDPOINT}?partNumber={}",
            urlencoding::encode(part_number)
        );
        let request = HttpRequest::get(endpoint).with_header("accept", "application/json");

        let response = self.http_client.execute(request).await.map_err(|e| {
            ProviderError::transport(format!("itra transport error: {}", e.message()))
        })?;
        if !response.is_success() {
            return Err(ProviderError::transport(format!(
                "itra returned status {}",
                response.status
            )));
        }

        let parsed: ItraProductResponse = serde_json::from_str(&response.body).map_err(|e| {
            ProviderError::invalid_data(format!("failed to parse itra response: {e}"))
        })?;

        let price = parsed
            .items
            .iter()
            .flat_map(|item| item.prices.iter())
            .find(|price| price.model == PAY_AS_YOU_GO)
            .map(|price| price.value)
            .ok_or_else(|| {
                ProviderError::invalid_data(format!(
                    "no {PAY_AS_YOU_GO} price for part number {part_number}"
                ))
            })?;

        Ok(price)
    }
}

impl ProviderAdapter for OracleAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::new(PROVIDER_ID)
    }

    fn services(&self) -> Vec<String> {
        vec![String::from("compute"), String::from("oke")]
    }

    fn initialize(
        &self,
    ) -> BoxFuture<'_, Result<HashMap<String, HashMap<String, Price>>, ProviderError>> {
        Box::pin(async move {
            let mut prices: HashMap<String, HashMap<String, Price>> = HashMap::new();
            for spec in SHAPE_SPECS {
                let unit = self.part_price(spec.part_number).await?;
                let by_region = prices.entry(spec.shape.to_owned()).or_default();
                for (region, _) in REGION_NAMES {
                    by_region.insert(
                        (*region).to_owned(),
                        Price::new(unit * spec.cpus, SpotPriceInfo::new()),
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
                    "unknown oracle region: {region}"
                )));
            }
            // availability domains are numbered within the region
            Ok((1..=3).map(|ad| format!("{region}-AD-{ad}")).collect())
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
                    "unknown oracle region: {region}"
                )));
            }
            Ok(SHAPE_SPECS
                .iter()
                .map(|spec| VmInfo {
                    vm_type: spec.shape.to_owned(),
                    cpus: spec.cpus,
                    mem_gb: spec.mem_gb,
                    ntw_perf: spec.ntw_perf.to_owned(),
                    ntw_class: None,
                    on_demand_price: 0.0,
                    spot_price: SpotPriceInfo::new(),
                })
                .collect())
        })
    }

    fn attribute_values<'a>(
        &'a self,
        _service: &'a str,
        attr_name: &'a str,
    ) -> BoxFuture<'a, Result<AttrValues, ProviderError>> {
        Box::pin(async move {
            let mut values = AttrValues::new();
            for spec in SHAPE_SPECS {
                let value = match attr_name {
                    "cpu" => spec.cpus,
                    "memory" => spec.mem_gb,
                    other => {
                        return Err(ProviderError::invalid_data(format!(
                            "unknown oracle attribute name: {other}"
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
        _region: &'a str,
    ) -> BoxFuture<'a, Result<HashMap<String, Price>, ProviderError>> {
        Box::pin(async move {
            Err(ProviderError::unsupported(
                "oracle prices cannot be queried on the fly",
            ))
        })
    }

    fn has_short_lived_price_info(&self) -> bool {
        false
    }

    fn cpu_attr_name(&self) -> &str {
        "cpu"
    }

    fn memory_attr_name(&self) -> &str {
        "memory"
    }

    fn network_perf_mapper(&self) -> &NetworkPerfMapper {
        &self.mapper
    }
}

#[derive(Debug, Deserialize)]
struct ItraProductResponse {
    #[serde(default)]
    items: Vec<ItraProduct>,
}

#[derive(Debug, Deserialize)]
struct ItraProduct {
    #[serde(default)]
    prices: Vec<ItraPrice>,
}

#[derive(Debug, Deserialize)]
struct ItraPrice {
    model: String,
    value: f64,
}

fn fake_unit_price(part_number: &str) -> f64 {
    let seed = part_number.bytes().fold(0_u64, |acc, byte| {
        acc.wrapping_mul(33).wrapping_add(byte as u64)
    });
    0.015 + (seed % 40) as f64 / 1_000.0
}
