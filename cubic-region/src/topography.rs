//! Cached 2D surface data used while chunks of a region are being generated.
//!
//! Topography is a cache, not world state: losing any of it only forces the
//! generator to recompute. Its operations therefore report [`TopographyError`],
//! which carries the region's `best_effort` policy so the caller can choose
//! to carry on with [`RecoverTopography::or_cache_miss`]. Chunk table failures
//! are never softened this way.
//!
//! [`RecoverTopography::or_cache_miss`]: crate::error::RecoverTopography::or_cache_miss

use log::debug;

use crate::codec::{self, Compression};
use crate::error::{RegionError, TopographyError};
use crate::key::{StoredRecord, TopographyPos};
use crate::region::RegionFile;
use crate::scan::KeyScan;

pub struct TopographyCache<'a> {
    region: &'a RegionFile,
}

impl<'a> TopographyCache<'a> {
    pub(crate) fn new(region: &'a RegionFile) -> Self {
        Self { region }
    }

    fn fail(
        &self,
        operation: &'static str,
        key_id: impl Into<Option<i32>>,
    ) -> impl FnOnce(RegionError) -> TopographyError {
        let best_effort = self.region.best_effort_topography();
        let key_id = key_id.into();
        move |source| TopographyError {
            operation,
            key_id,
            best_effort,
            source,
        }
    }

    pub fn get_topography(&self, pos: TopographyPos) -> Result<Option<Vec<u8>>, TopographyError> {
        self.read(pos).map_err(self.fail("read", pos.key_id))
    }

    fn read(&self, pos: TopographyPos) -> Result<Option<Vec<u8>>, RegionError> {
        let Some(value) = self
            .region
            .with_tables(|tables| Ok(tables.topography.get(pos.to_key())?))?
        else {
            return Ok(None);
        };
        let record = StoredRecord::from_value(&value)?;
        codec::decode(record.compression, &record.data).map(Some)
    }

    /// Inserts or replaces the topography at `pos`, atomically.
    pub fn put_topography(
        &self,
        pos: TopographyPos,
        payload: &[u8],
        compression: Compression,
    ) -> Result<(), TopographyError> {
        self.write(pos, payload, compression)
            .map_err(self.fail("write", pos.key_id))
    }

    fn write(
        &self,
        pos: TopographyPos,
        payload: &[u8],
        compression: Compression,
    ) -> Result<(), RegionError> {
        let record = StoredRecord {
            compression: compression.id(),
            data: compression
                .compress_data(payload, self.region.compression_level())
                .map_err(std::io::Error::other)?,
        };
        self.region.check_payload_size(record.data.len())?;
        self.region.write_with(|tables| {
            tables.topography.insert(&pos.to_key()[..], record.to_value())?;
            debug!("Wrote topography {pos} ({} bytes)", record.data.len());
            Ok(())
        })
    }

    /// Removes the topography at `pos`. Removing a missing entry is not an error.
    pub fn delete_topography(&self, pos: TopographyPos) -> Result<(), TopographyError> {
        self.region
            .write_with(|tables| {
                tables.topography.remove(pos.to_key())?;
                Ok(())
            })
            .map_err(self.fail("delete", pos.key_id))
    }

    /// Removes every entry of the generation epoch `key_id` in one atomic batch,
    /// returning how many were removed. Other key ids are left alone.
    pub fn purge_key(&self, key_id: i32) -> Result<usize, TopographyError> {
        self.region
            .write_with(|tables| {
                let mut batch = sled::Batch::default();
                let mut removed = 0;
                for key in tables
                    .topography
                    .scan_prefix(TopographyPos::key_id_prefix(key_id))
                    .keys()
                {
                    batch.remove(key?);
                    removed += 1;
                }
                tables.topography.apply_batch(batch)?;
                debug!("Purged {removed} topography entries of key id {key_id}");
                Ok(removed)
            })
            .map_err(self.fail("purge", key_id))
    }

    pub fn contains_topography(&self, pos: TopographyPos) -> Result<bool, TopographyError> {
        self.region
            .with_tables(|tables| Ok(tables.topography.contains_key(pos.to_key())?))
            .map_err(self.fail("read", pos.key_id))
    }

    /// Stored positions, lazily, optionally limited to one key id.
    ///
    /// Walks in batches like [`ChunkStore::list_chunk_keys`].
    ///
    /// [`ChunkStore::list_chunk_keys`]: crate::ChunkStore::list_chunk_keys
    pub fn list_topography_keys(
        &self,
        key_id: Option<i32>,
    ) -> Result<TopographyKeys<'a>, TopographyError> {
        self.region
            .with_tables(|_| Ok(()))
            .map_err(self.fail("list", key_id))?;
        let prefix = key_id.map(TopographyPos::key_id_prefix);
        Ok(TopographyKeys {
            scan: KeyScan::new(
                self.region,
                |tables| &tables.topography,
                prefix.as_ref().map_or(&[][..], |prefix| &prefix[..]),
            ),
            key_id,
            best_effort: self.region.best_effort_topography(),
        })
    }
}

/// Iterator returned by [`TopographyCache::list_topography_keys`].
pub struct TopographyKeys<'a> {
    scan: KeyScan<'a>,
    key_id: Option<i32>,
    best_effort: bool,
}

impl Iterator for TopographyKeys<'_> {
    type Item = Result<TopographyPos, TopographyError>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.scan.next()?;
        Some(
            key.and_then(|key| TopographyPos::from_key(&key))
                .map_err(|source| TopographyError {
                    operation: "list",
                    key_id: self.key_id,
                    best_effort: self.best_effort,
                    source,
                }),
        )
    }
}
