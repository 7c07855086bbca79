//! Region based persistence for cubic chunk worlds.
//!
//! A region is one self-contained database holding three tables: metadata,
//! chunks and a topography cache. Open one with [`RegionFile::open`] or
//! [`RegionFile::create`] and reach the tables through the views it hands out.

pub mod chunk;
pub mod codec;
pub mod error;
pub mod key;
pub mod metadata;
mod header;
mod migration;
pub mod region;
pub mod schema;
mod scan;
pub mod topography;

pub use chunk::{ChunkKeys, ChunkStore};
pub use codec::{decode, encode, Compression};
pub use cubic_tag::{Tag, TagRecord};
pub use error::{CompressionError, RecoverTopography, RegionError, TopographyError};
pub use key::{ChunkPos, StoredRecord, TopographyPos};
pub use metadata::MetadataStore;
pub use region::{RegionFile, RegionState};
pub use topography::{TopographyCache, TopographyKeys};
