use log::{debug, warn};

use crate::codec::{self, Compression};
use crate::error::RegionError;
use crate::key::{ChunkPos, StoredRecord};
use crate::region::RegionFile;
use crate::scan::KeyScan;

/// The durable chunk table of a region.
///
/// Every write is a single atomic insert or remove, so a reader sees either the
/// previous record or the new one. Chunks are never removed implicitly.
pub struct ChunkStore<'a> {
    region: &'a RegionFile,
}

impl<'a> ChunkStore<'a> {
    pub(crate) fn new(region: &'a RegionFile) -> Self {
        Self { region }
    }

    /// Decoded payload of the chunk at `pos`, or `None` if it was never written.
    pub fn get_chunk(&self, pos: ChunkPos) -> Result<Option<Vec<u8>>, RegionError> {
        let Some(record) = self.get_chunk_raw(pos)? else {
            return Ok(None);
        };
        let data = codec::decode(record.compression, &record.data)?;
        debug!(
            "Read chunk {pos} ({} -> {} bytes)",
            record.data.len(),
            data.len()
        );
        Ok(Some(data))
    }

    /// The stored record at `pos` without decoding it.
    pub fn get_chunk_raw(&self, pos: ChunkPos) -> Result<Option<StoredRecord>, RegionError> {
        let value = self
            .region
            .with_tables(|tables| Ok(tables.chunks.get(pos.to_key())?))?;
        value
            .map(|value| StoredRecord::from_value(&value))
            .transpose()
    }

    /// Encodes `payload` with `compression` and inserts or replaces the chunk at `pos`.
    pub fn put_chunk(
        &self,
        pos: ChunkPos,
        payload: &[u8],
        compression: Compression,
    ) -> Result<(), RegionError> {
        let data = compression
            .compress_data(payload, self.region.compression_level())
            .map_err(std::io::Error::other)?;
        self.store(
            pos,
            StoredRecord {
                compression: compression.id(),
                data,
            },
        )
    }

    /// Stores an already encoded record verbatim, e.g. when copying between regions.
    ///
    /// Unknown codec ids are accepted here; reading such a chunk back fails
    /// with [`RegionError::UnsupportedCodec`].
    pub fn put_chunk_raw(
        &self,
        pos: ChunkPos,
        compression: i32,
        data: Vec<u8>,
    ) -> Result<(), RegionError> {
        if Compression::from_id(compression).is_err() {
            warn!("Storing chunk {pos} with unknown compression id {compression}");
        }
        self.store(pos, StoredRecord { compression, data })
    }

    fn store(&self, pos: ChunkPos, record: StoredRecord) -> Result<(), RegionError> {
        self.region.check_payload_size(record.data.len())?;
        self.region.write_with(|tables| {
            tables.chunks.insert(&pos.to_key()[..], record.to_value())?;
            debug!("Wrote chunk {pos} ({} bytes)", record.data.len());
            Ok(())
        })
    }

    /// Removes the chunk at `pos`. Removing a missing chunk is not an error.
    pub fn delete_chunk(&self, pos: ChunkPos) -> Result<(), RegionError> {
        self.region.write_with(|tables| {
            if tables.chunks.remove(pos.to_key())?.is_some() {
                debug!("Deleted chunk {pos}");
            }
            Ok(())
        })
    }

    pub fn contains_chunk(&self, pos: ChunkPos) -> Result<bool, RegionError> {
        self.region
            .with_tables(|tables| Ok(tables.chunks.contains_key(pos.to_key())?))
    }

    /// Number of stored chunks. This walks the whole table.
    pub fn chunk_count(&self) -> Result<usize, RegionError> {
        self.region.with_tables(|tables| Ok(tables.chunks.len()))
    }

    /// Every stored chunk position, read lazily in key order.
    ///
    /// Each call starts a fresh walk over the table. Payloads are not decoded.
    /// Keys are fetched in batches, so chunks written or deleted during the walk
    /// may or may not be seen, and closing the region ends the walk with
    /// [`RegionError::AlreadyClosed`].
    pub fn list_chunk_keys(&self) -> Result<ChunkKeys<'a>, RegionError> {
        self.region.with_tables(|_| Ok(()))?;
        Ok(ChunkKeys {
            scan: KeyScan::new(self.region, |tables| &tables.chunks, &[]),
        })
    }
}

/// Iterator returned by [`ChunkStore::list_chunk_keys`].
pub struct ChunkKeys<'a> {
    scan: KeyScan<'a>,
}

impl Iterator for ChunkKeys<'_> {
    type Item = Result<ChunkPos, RegionError>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.scan.next()?;
        Some(key.and_then(|key| ChunkPos::from_key(&key)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use cubic_config::RegionConfiguration;
    use temp_dir::TempDir;

    use super::*;

    fn region(dir: &TempDir) -> RegionFile {
        RegionFile::create(dir.path().join("r.0.0"), &RegionConfiguration::default()).unwrap()
    }

    #[test]
    fn put_then_get_with_every_codec() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        let chunks = region.chunks();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 13) as u8).collect();

        for (i, codec) in Compression::ALL.into_iter().enumerate() {
            let pos = ChunkPos::new(i as i32, -(i as i32), 0);
            chunks.put_chunk(pos, &payload, codec).unwrap();
            assert_eq!(chunks.get_chunk(pos).unwrap().as_deref(), Some(&payload[..]));
            assert_eq!(
                chunks.get_chunk_raw(pos).unwrap().unwrap().compression,
                codec.id()
            );
        }
    }

    #[test]
    fn second_put_wins() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        let chunks = region.chunks();
        let pos = ChunkPos::new(-3, 70, 12);

        chunks.put_chunk(pos, b"before the player", Compression::LZ4).unwrap();
        chunks.put_chunk(pos, b"after", Compression::None).unwrap();
        assert_eq!(chunks.get_chunk(pos).unwrap(), Some(b"after".to_vec()));
        assert_eq!(chunks.chunk_count().unwrap(), 1);
    }

    #[test]
    fn missing_is_none() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        assert_eq!(
            region.chunks().get_chunk(ChunkPos::new(5, 5, 5)).unwrap(),
            None
        );
        assert!(!region.chunks().contains_chunk(ChunkPos::new(5, 5, 5)).unwrap());
    }

    #[test]
    fn delete_twice() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        let chunks = region.chunks();
        let pos = ChunkPos::new(1, 1, 1);

        chunks.put_chunk(pos, b"ore", Compression::ZLib).unwrap();
        chunks.delete_chunk(pos).unwrap();
        chunks.delete_chunk(pos).unwrap();
        chunks.delete_chunk(ChunkPos::new(100, 100, 100)).unwrap();
        assert_eq!(chunks.get_chunk(pos).unwrap(), None);
    }

    #[test]
    fn unregistered_codec() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        let chunks = region.chunks();
        let pos = ChunkPos::new(0, 0, 0);

        chunks.put_chunk_raw(pos, 99, b"from the future".to_vec()).unwrap();
        assert!(matches!(
            chunks.get_chunk(pos),
            Err(RegionError::UnsupportedCodec(99))
        ));
        // Still reachable for a raw copy
        assert_eq!(
            chunks.get_chunk_raw(pos).unwrap(),
            Some(StoredRecord {
                compression: 99,
                data: b"from the future".to_vec()
            })
        );
    }

    #[test]
    fn corrupt_payload() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        let chunks = region.chunks();
        let pos = ChunkPos::new(2, 0, 2);

        chunks
            .put_chunk_raw(pos, Compression::Zstd.id(), b"not zstd".to_vec())
            .unwrap();
        assert!(matches!(
            chunks.get_chunk(pos),
            Err(RegionError::CorruptPayload(_))
        ));

        region
            .with_tables(|tables| {
                tables.chunks.insert(&pos.to_key()[..], &[0, 0][..])?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(
            chunks.get_chunk(pos),
            Err(RegionError::CorruptPayload(_))
        ));
    }

    #[test]
    fn list_keys_is_restartable() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        let chunks = region.chunks();

        let mut expected = HashSet::new();
        for x in -2..2 {
            for y in -1..1 {
                for z in -2..2 {
                    let pos = ChunkPos::new(x, y, z);
                    chunks.put_chunk(pos, b"air", Compression::None).unwrap();
                    expected.insert(pos);
                }
            }
        }

        let first: HashSet<_> = chunks
            .list_chunk_keys()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(first, expected);

        chunks.delete_chunk(ChunkPos::new(0, 0, 0)).unwrap();
        expected.remove(&ChunkPos::new(0, 0, 0));

        let second: HashSet<_> = chunks
            .list_chunk_keys()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(second, expected);
    }

    #[test]
    fn list_keys_across_batches() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        let chunks = region.chunks();

        let total = crate::scan::SCAN_BATCH * 2 + 44;
        for i in 0..total as i32 {
            chunks
                .put_chunk(ChunkPos::new(i % 17 - 8, i / 17 - 8, -i), b"air", Compression::None)
                .unwrap();
        }

        let keys = chunks
            .list_chunk_keys()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(keys.len(), total);
        assert!(keys.windows(2).all(|pair| pair[0].to_key() < pair[1].to_key()));
    }

    #[test]
    fn list_keys_after_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0");
        let region = RegionFile::create(&path, &RegionConfiguration::default()).unwrap();
        let chunks = region.chunks();
        for x in 0..(crate::scan::SCAN_BATCH as i32 + 1) {
            chunks
                .put_chunk(ChunkPos::new(x, 0, 0), b"dirt", Compression::None)
                .unwrap();
        }

        let mut keys = chunks.list_chunk_keys().unwrap();
        assert_eq!(keys.next().unwrap().unwrap(), ChunkPos::new(0, 0, 0));

        // The live iterator must not keep the database locked
        region.close().unwrap();
        let reopened = RegionFile::open(&path, &RegionConfiguration::default()).unwrap();
        assert!(reopened.chunks().contains_chunk(ChunkPos::new(3, 0, 0)).unwrap());

        // Rest of the first batch is already buffered; after that the closed region shows
        let rest: Vec<_> = keys.by_ref().take(crate::scan::SCAN_BATCH).collect();
        assert!(matches!(
            rest.last(),
            Some(Err(RegionError::AlreadyClosed))
        ));
        assert!(keys.next().is_none());
        assert!(matches!(
            chunks.list_chunk_keys(),
            Err(RegionError::AlreadyClosed)
        ));
    }

    #[test]
    fn list_keys_of_empty_region() {
        let dir = TempDir::new().unwrap();
        let region = region(&dir);
        assert_eq!(region.chunks().list_chunk_keys().unwrap().count(), 0);
    }
}
