use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InfoError;
use crate::domain::network::NetworkClass;

/// Opaque provider identifier (`"amazon"`, `"oracle"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::borrow::Borrow<str> for ProviderId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Canonical attribute names accepted by the query layer.
///
/// Adapters use their own names for these two attributes; translation goes
/// through [`ProviderAdapter::cpu_attr_name`](crate::provider::ProviderAdapter::cpu_attr_name)
/// and [`ProviderAdapter::memory_attr_name`](crate::provider::ProviderAdapter::memory_attr_name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Cpu,
    Memory,
}

impl Attribute {
    pub const ALL: [Self; 2] = [Self::Cpu, Self::Memory];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = InfoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            other => Err(InfoError::UnsupportedAttribute(other.to_owned())),
        }
    }
}

/// Spot prices keyed by zone. A missing zone means the shape is not offered
/// there, not that it is free.
pub type SpotPriceInfo = BTreeMap<String, f64>;

/// One VM shape available in one region.
///
/// Adapters return this with `ntw_class` unset; the refresh engine resolves
/// the class through the provider's mapper before anything is cached, so a
/// cached record always carries `Some`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmInfo {
    #[serde(rename = "type")]
    pub vm_type: String,
    #[serde(rename = "cpusPerVm")]
    pub cpus: f64,
    #[serde(rename = "memPerVm")]
    pub mem_gb: f64,
    #[serde(rename = "ntwPerf")]
    pub ntw_perf: String,
    #[serde(rename = "ntwPerfCategory", skip_serializing_if = "Option::is_none")]
    pub ntw_class: Option<NetworkClass>,
    #[serde(rename = "onDemandPrice", default)]
    pub on_demand_price: f64,
    #[serde(rename = "spotPrice", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spot_price: SpotPriceInfo,
}

/// Long-lived on-demand price plus the short-lived per-zone spot prices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Price {
    #[serde(rename = "onDemandPrice")]
    pub on_demand: f64,
    #[serde(rename = "spotPrice", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spot: SpotPriceInfo,
}

impl Price {
    pub fn new(on_demand: f64, spot: SpotPriceInfo) -> Self {
        Self { on_demand, spot }
    }
}

/// One distinct numeric value of an attribute, with the provider's string
/// rendering of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrValue {
    pub value: f64,
    #[serde(rename = "strValue")]
    pub str_value: String,
}

impl AttrValue {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            str_value: format!("{value}"),
        }
    }
}

/// Ordered attribute values with value-uniqueness enforced on insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrValues(Vec<AttrValue>);

impl AttrValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `attr` unless a value with the same bit pattern is already
    /// present. Returns whether the value was inserted.
    pub fn push(&mut self, attr: AttrValue) -> bool {
        let duplicate = self
            .0
            .iter()
            .any(|existing| existing.value.to_bits() == attr.value.to_bits());
        if duplicate {
            return false;
        }
        self.0.push(attr);
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttrValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric values in insertion order.
    pub fn floats(&self) -> Vec<f64> {
        self.0.iter().map(|attr| attr.value).collect()
    }
}

impl FromIterator<AttrValue> for AttrValues {
    fn from_iter<I: IntoIterator<Item = AttrValue>>(iter: I) -> Self {
        let mut values = Self::new();
        for attr in iter {
            values.push(attr);
        }
        values
    }
}

impl IntoIterator for AttrValues {
    type Item = AttrValue;
    type IntoIter = std::vec::IntoIter<AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Spot price of one zone, as serialized in product details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePrice {
    pub zone: String,
    pub price: f64,
}

/// Wire shape returned to the upstream transport layer: a cached VM joined
/// with its current price entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    #[serde(rename = "type")]
    pub vm_type: String,
    #[serde(rename = "cpusPerVm")]
    pub cpus: f64,
    #[serde(rename = "memPerVm")]
    pub mem_gb: f64,
    #[serde(rename = "ntwPerf")]
    pub ntw_perf: String,
    #[serde(rename = "ntwPerfCategory")]
    pub ntw_class: NetworkClass,
    #[serde(rename = "onDemandPrice")]
    pub on_demand_price: f64,
    #[serde(rename = "spotPrice", default, skip_serializing_if = "Vec::is_empty")]
    pub spot_price: Vec<ZonePrice>,
}

impl ProductDetails {
    /// Joins a cached VM with its price entry. The price entry's on-demand
    /// value takes precedence over the catalog value.
    pub fn join(vm: &VmInfo, ntw_class: NetworkClass, price: &Price) -> Self {
        Self {
            vm_type: vm.vm_type.clone(),
            cpus: vm.cpus,
            mem_gb: vm.mem_gb,
            ntw_perf: vm.ntw_perf.clone(),
            ntw_class,
            on_demand_price: price.on_demand,
            spot_price: price
                .spot
                .iter()
                .map(|(zone, price)| ZonePrice {
                    zone: zone.clone(),
                    price: *price,
                })
                .collect(),
        }
    }
}
