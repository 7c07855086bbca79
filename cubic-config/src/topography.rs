use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TopographyConfig {
    /// Topography is a cache. When set, its failures are flagged as recoverable
    /// so generation can recompute instead of aborting.
    pub best_effort: bool,
}

impl Default for TopographyConfig {
    fn default() -> Self {
        Self { best_effort: true }
    }
}
