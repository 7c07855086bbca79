use log::warn;
use thiserror::Error;

use crate::schema::CURRENT_VERSION;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Error while working with zlib compression: {0}")]
    ZlibError(std::io::Error),
    #[error("Error while working with Gzip compression: {0}")]
    GZipError(std::io::Error),
    #[error("Error while working with LZ4 compression: {0}")]
    LZ4Error(std::io::Error),
    #[error("Error while working with zstd compression: {0}")]
    ZstdError(std::io::Error),
    #[error("Error while working with Brotli compression: {0}")]
    BrotliError(std::io::Error),
    #[error("Stored record is {0} bytes, too short to hold a compression id")]
    TruncatedRecord(usize),
}

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Region schema version {found} is not supported (this engine reads up to {supported})")]
    UnsupportedVersion { found: i64, supported: i64 },
    #[error("Region metadata is corrupt: {0}")]
    CorruptMetadata(String),
    #[error("Stored payload is corrupt: {0}")]
    CorruptPayload(CompressionError),
    #[error("Malformed {len} byte key in the {table} table")]
    CorruptKey { table: &'static str, len: usize },
    #[error("Compression scheme {0} not recognised")]
    UnsupportedCodec(i32),
    #[error("Storage error: {0}")]
    IoFailure(#[from] sled::Error),
    #[error("Region file is already closed")]
    AlreadyClosed,
    #[error("Payload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: u64 },
}

impl From<std::io::Error> for RegionError {
    fn from(err: std::io::Error) -> Self {
        RegionError::IoFailure(sled::Error::Io(err))
    }
}

impl RegionError {
    pub(crate) fn unsupported_version(found: i64) -> Self {
        RegionError::UnsupportedVersion {
            found,
            supported: CURRENT_VERSION,
        }
    }
}

/// A failure in the topography cache.
///
/// Topography is never the source of truth, so a caller running generation
/// may decide to recompute instead of failing. The error is still reported
/// rather than folded into "absent", and `best_effort` records whether the
/// region was configured to allow that recovery.
#[derive(Error, Debug)]
#[error("Topography {operation} failed{}: {source}", scope(.key_id))]
pub struct TopographyError {
    pub operation: &'static str,
    /// The key id the operation was scoped to, `None` for whole table walks.
    pub key_id: Option<i32>,
    pub best_effort: bool,
    pub source: RegionError,
}

fn scope(key_id: &Option<i32>) -> String {
    match key_id {
        Some(key_id) => format!(" for key id {key_id}"),
        None => String::new(),
    }
}

impl TopographyError {
    /// Whether this can be handled as a cache miss.
    ///
    /// Using a closed region is a caller bug and is never recoverable.
    pub fn is_recoverable(&self) -> bool {
        self.best_effort && !matches!(self.source, RegionError::AlreadyClosed)
    }

    pub fn into_inner(self) -> RegionError {
        self.source
    }
}

pub trait RecoverTopography<T> {
    /// Turns a recoverable failure into `T::default()` (a miss, a no-op, zero
    /// removed rows) after logging it; anything else is passed through.
    fn or_cache_miss(self) -> Result<T, TopographyError>;
}

impl<T: Default> RecoverTopography<T> for Result<T, TopographyError> {
    fn or_cache_miss(self) -> Result<T, TopographyError> {
        match self {
            Err(err) if err.is_recoverable() => {
                warn!("{err}; continuing without cached topography");
                Ok(T::default())
            }
            other => other,
        }
    }
}
