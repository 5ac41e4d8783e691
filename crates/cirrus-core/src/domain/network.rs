use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::provider::ProviderError;

/// Normalized network performance category.
///
/// The set is closed: cross-provider filtering depends on every cached VM
/// carrying exactly one of these four classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    Low,
    Medium,
    High,
    Extra,
}

impl NetworkClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Extra => "extra",
        }
    }
}

impl Display for NetworkClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a provider's raw network descriptor strings to [`NetworkClass`].
///
/// Each adapter constructs its own mapper from an inverse table
/// (class to raw descriptors); the forward map is materialized once here.
/// Lookups are exact string comparisons, no case or whitespace
/// normalization, so the table must be exhaustive for the provider.
#[derive(Debug, Clone)]
pub struct NetworkPerfMapper {
    forward: HashMap<String, NetworkClass>,
}

impl NetworkPerfMapper {
    pub fn from_table(table: &[(NetworkClass, &[&str])]) -> Self {
        let mut forward = HashMap::new();
        for (class, descriptors) in table {
            for raw in *descriptors {
                forward.insert((*raw).to_owned(), *class);
            }
        }
        Self { forward }
    }

    /// Resolves a raw descriptor to its class.
    ///
    /// # Errors
    ///
    /// Fails when the descriptor is not in the provider's table. Callers in
    /// the refresh path drop the record rather than caching an unclassified
    /// one.
    pub fn map(&self, raw: &str) -> Result<NetworkClass, ProviderError> {
        self.forward
            .get(raw)
            .copied()
            .ok_or_else(|| ProviderError::unknown_network_descriptor(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> NetworkPerfMapper {
        NetworkPerfMapper::from_table(&[
            (NetworkClass::Low, &["0.6 Gbps"]),
            (NetworkClass::Medium, &["1 Gbps", "2 Gbps"]),
            (NetworkClass::Extra, &["24.6 Gbps"]),
        ])
    }

    #[test]
    fn maps_known_descriptors() {
        let mapper = mapper();
        assert_eq!(mapper.map("0.6 Gbps").expect("mapped"), NetworkClass::Low);
        assert_eq!(mapper.map("2 Gbps").expect("mapped"), NetworkClass::Medium);
        assert_eq!(mapper.map("24.6 Gbps").expect("mapped"), NetworkClass::Extra);
    }

    #[test]
    fn rejects_unknown_descriptor_without_normalizing() {
        let mapper = mapper();

        let error = mapper.map("10 Gigabit").expect_err("not in the table");
        assert!(error
            .message()
            .contains("could not determine network performance for: [10 Gigabit]"));

        // exact comparison only
        assert!(mapper.map("0.6 gbps").is_err());
        assert!(mapper.map(" 0.6 Gbps").is_err());
    }
}
