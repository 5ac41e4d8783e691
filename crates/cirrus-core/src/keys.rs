//! Canonical cache-key grammar.
//!
//! Every cached entry lives under one of four key shapes:
//!
//! ```text
//! /<org>/cloudinfo/providers/<provider>/services/<service>/regions/<region>/vms
//! /<org>/cloudinfo/providers/<provider>/regions/<region>/prices/<vmType>
//! /<org>/cloudinfo/providers/<provider>/regions/<region>/zones
//! /<org>/cloudinfo/providers/<provider>/services/<service>/attributes/<attr>
//! ```
//!
//! The grammar is bit-exact: keys double as lock identities for the
//! single-flight discipline and as client-visible diagnostics in
//! `NotCached` errors.

/// Organization segment of every cache key.
pub const ORG: &str = "cirrus.cloud";

/// Key of the VM catalog for a `(provider, service, region)` triple.
pub fn vms_key(provider: &str, service: &str, region: &str) -> String {
    format!("/{ORG}/cloudinfo/providers/{provider}/services/{service}/regions/{region}/vms")
}

/// Key of the short-lived price entry for one VM type in one region.
pub fn price_key(provider: &str, region: &str, vm_type: &str) -> String {
    format!("/{ORG}/cloudinfo/providers/{provider}/regions/{region}/prices/{vm_type}")
}

/// Key of the zone list of a region.
pub fn zones_key(provider: &str, region: &str) -> String {
    format!("/{ORG}/cloudinfo/providers/{provider}/regions/{region}/zones")
}

/// Key of the regions map of a `(provider, service)` pair.
pub fn regions_key(provider: &str, service: &str) -> String {
    format!("/{ORG}/cloudinfo/providers/{provider}/services/{service}/regions")
}

/// Lock identity for a region-wide price refresh. Never stored: the
/// per-type price entries live under [`price_key`], but the refresh that
/// writes them is one flight per region.
pub fn price_scope(provider: &str, region: &str) -> String {
    format!("/{ORG}/cloudinfo/providers/{provider}/regions/{region}/prices")
}

/// Key of the distinct attribute values of a `(provider, service)` pair.
pub fn attr_key(provider: &str, service: &str, attribute: &str) -> String {
    format!("/{ORG}/cloudinfo/providers/{provider}/services/{service}/attributes/{attribute}")
}
