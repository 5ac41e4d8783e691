//! Canonical domain types shared by adapters, the cache and the query layer.

pub mod models;
pub mod network;

pub use models::{
    Attribute, AttrValue, AttrValues, Price, ProductDetails, ProviderId, SpotPriceInfo, VmInfo,
    ZonePrice,
};
pub use network::{NetworkClass, NetworkPerfMapper};
