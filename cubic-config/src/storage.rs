use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Page cache size of a single open region, in bytes
    pub cache_capacity_bytes: u64,
    /// Interval of the storage engine's background flusher thread. `None`
    /// (the default) runs no background thread.
    pub flush_every_ms: Option<u64>,
    pub mode: StorageMode,
    /// Flush to disk before every mutating call returns
    pub sync_writes: bool,
    /// Largest encoded chunk or topography blob accepted by a put
    pub max_payload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: 64 * 1024 * 1024,
            flush_every_ms: None,
            mode: StorageMode::LowSpace,
            sync_writes: true,
            max_payload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl StorageConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.cache_capacity_bytes == 0 {
            return Err("storage.cache_capacity_bytes must be greater than 0".to_string());
        }
        if self.max_payload_bytes == 0 {
            return Err("storage.max_payload_bytes must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageMode {
    #[default]
    LowSpace,
    HighThroughput,
}
