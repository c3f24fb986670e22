use serde::{Deserialize, Serialize};
use symstore_types::RawFormat;

/// What happens to records that are no longer referenced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Records stay in their collections forever.
    #[default]
    Never,
    /// After every update, records unreachable from any top-level loaded
    /// record are removed and their subscriptions cancelled.
    Unreachable,
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Raw record key names and transient marker.
    #[serde(flatten)]
    pub format: RawFormat,
    /// Eviction strategy for unreferenced records.
    pub eviction: EvictionPolicy,
}

impl StoreConfig {
    /// Default configuration with reachability eviction enabled.
    pub fn evicting() -> Self {
        Self {
            eviction: EvictionPolicy::Unreachable,
            ..Default::default()
        }
    }
}
