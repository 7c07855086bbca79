use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CompressionConfig {
    /// Codec used when the caller doesn't pick one
    pub algorithm: CompressionAlgorithm,
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::LZ4,
            level: 6,
        }
    }
}

impl CompressionConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        let max = self.algorithm.max_level();
        if self.level > max {
            return Err(format!(
                "compression level {} is out of range for {:?} (0..={max})",
                self.level, self.algorithm
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// Stored verbatim
    None,
    /// ZLib Compression
    ZLib,
    /// GZip Compression
    GZip,
    /// LZ4 frame compression
    LZ4,
    /// Zstandard compression
    Zstd,
    /// Brotli, slow to write but dense
    Brotli,
}

impl CompressionAlgorithm {
    pub const fn max_level(self) -> u32 {
        match self {
            Self::None => 0,
            Self::ZLib | Self::GZip => 9,
            Self::LZ4 => 16,
            Self::Zstd => 22,
            Self::Brotli => 11,
        }
    }
}
