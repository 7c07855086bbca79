use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use cubic_config::{RegionConfiguration, StorageConfig, StorageMode};
use log::{debug, error, info};
use parking_lot::RwLock;
use sled::{Db, Tree};

use crate::chunk::ChunkStore;
use crate::codec::Compression;
use crate::error::RegionError;
use crate::header;
use crate::metadata::{self, MetadataStore};
use crate::migration;
use crate::schema::{CHUNKS_TREE, CURRENT_VERSION, METADATA_TREE, TOPOGRAPHY_TREE};
use crate::topography::TopographyCache;

/// Lifecycle of a [`RegionFile`].
///
/// `Unopened`, `Opening` and `Failed` only exist inside [`RegionFile::open`]:
/// a failed open returns the error and no handle, so a live handle is either
/// `Ready` or `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Unopened,
    Opening,
    Ready,
    Failed,
    Closed,
}

pub(crate) struct RegionTables {
    pub(crate) db: Db,
    pub(crate) metadata: Tree,
    pub(crate) chunks: Tree,
    pub(crate) topography: Tree,
}

impl RegionTables {
    /// Metadata must already have been validated.
    fn open(db: Db, metadata: Tree) -> Result<Self, RegionError> {
        let chunks = db.open_tree(CHUNKS_TREE)?;
        let topography = db.open_tree(TOPOGRAPHY_TREE)?;
        Ok(Self {
            db,
            metadata,
            chunks,
            topography,
        })
    }
}

/// One region of the world stored as a self-contained database.
///
/// All access to the underlying storage goes through this handle. The chunk,
/// topography and metadata views borrow it, so none of them can outlive it.
/// Calls take a shared lock for their duration; [`RegionFile::close`] takes it
/// exclusively, so closing waits for calls that are still running.
pub struct RegionFile {
    path: PathBuf,
    config: RegionConfiguration,
    tables: RwLock<Option<RegionTables>>,
}

fn storage_config(path: &Path, config: &StorageConfig) -> sled::Config {
    sled::Config::new()
        .path(path)
        .cache_capacity(config.cache_capacity_bytes)
        .flush_every_ms(config.flush_every_ms)
        .mode(match config.mode {
            StorageMode::LowSpace => sled::Mode::LowSpace,
            StorageMode::HighThroughput => sled::Mode::HighThroughput,
        })
}

fn transition(path: &Path, from: RegionState, to: RegionState) {
    debug!("Region {path:?}: {from:?} -> {to:?}");
}

impl RegionFile {
    /// Creates a brand new region at `path`, which must not exist yet.
    pub fn create(path: impl AsRef<Path>, config: &RegionConfiguration) -> Result<Self, RegionError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("region file {path:?} already exists"),
            )
            .into());
        }

        let db = storage_config(path, &config.storage)
            .create_new(true)
            .open()?;

        let tables = Self::initialize(path, db).inspect_err(|err| {
            error!("Failed to initialize region {path:?}: {err}");
            // We created it, so don't leave a half written region behind
            if let Err(err) = fs::remove_dir_all(path) {
                error!("Couldn't remove partial region {path:?}: {err}");
            }
        })?;

        info!("Created region file {path:?}");
        transition(path, RegionState::Unopened, RegionState::Ready);
        Ok(Self::ready(path, config, tables))
    }

    fn initialize(path: &Path, db: Db) -> Result<RegionTables, RegionError> {
        let metadata = db.open_tree(METADATA_TREE)?;
        metadata::seed(&metadata)?;
        let tables = RegionTables::open(db, metadata)?;
        tables.db.flush()?;
        header::write(path, CURRENT_VERSION)?;
        Ok(tables)
    }

    /// Opens an existing region, migrating it to the current schema if needed.
    pub fn open(path: impl AsRef<Path>, config: &RegionConfiguration) -> Result<Self, RegionError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("region file {path:?} does not exist"),
            )
            .into());
        }

        transition(path, RegionState::Unopened, RegionState::Opening);
        match Self::load(path, config) {
            Ok(tables) => {
                info!("Opened region file {path:?}");
                transition(path, RegionState::Opening, RegionState::Ready);
                Ok(Self::ready(path, config, tables))
            }
            Err(err) => {
                error!("Failed to open region {path:?}: {err}");
                transition(path, RegionState::Opening, RegionState::Failed);
                Err(err)
            }
        }
    }

    fn load(path: &Path, config: &RegionConfiguration) -> Result<RegionTables, RegionError> {
        // Opening the database writes to it, so refuse unreadable regions from the header alone
        let recorded = metadata::check_version(header::read(path)?)?;

        let db = storage_config(path, &config.storage).open()?;
        let metadata = db.open_tree(METADATA_TREE)?;
        let mut version = metadata::check_compatible(&metadata)?;
        if version < CURRENT_VERSION {
            version = migration::migrate(&db, &metadata, version)?;
            db.flush()?;
        }
        // Behind after a crash between a migration and its header update
        if recorded != version {
            header::write(path, version)?;
        }

        RegionTables::open(db, metadata)
    }

    /// Opens `path`, creating a new region there if nothing exists yet.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        config: &RegionConfiguration,
    ) -> Result<Self, RegionError> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path, config)
        } else {
            Self::create(path, config)
        }
    }

    fn ready(path: &Path, config: &RegionConfiguration, tables: RegionTables) -> Self {
        Self {
            path: path.to_path_buf(),
            config: config.clone(),
            tables: RwLock::new(Some(tables)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> RegionState {
        if self.tables.read().is_some() {
            RegionState::Ready
        } else {
            RegionState::Closed
        }
    }

    /// Codec configured for callers that don't need a specific one.
    pub fn default_compression(&self) -> Compression {
        self.config.compression.algorithm.into()
    }

    pub(crate) fn compression_level(&self) -> u32 {
        self.config.compression.level
    }

    pub(crate) fn best_effort_topography(&self) -> bool {
        self.config.topography.best_effort
    }

    pub fn metadata(&self) -> MetadataStore<'_> {
        MetadataStore::new(self)
    }

    pub fn chunks(&self) -> ChunkStore<'_> {
        ChunkStore::new(self)
    }

    pub fn topography(&self) -> TopographyCache<'_> {
        TopographyCache::new(self)
    }

    /// Runs `f` against the open tables, or fails if the region is closed.
    pub(crate) fn with_tables<T>(
        &self,
        f: impl FnOnce(&RegionTables) -> Result<T, RegionError>,
    ) -> Result<T, RegionError> {
        let guard = self.tables.read();
        let tables = guard.as_ref().ok_or(RegionError::AlreadyClosed)?;
        f(tables)
    }

    /// Like [`RegionFile::with_tables`], flushing afterwards when writes are synchronous.
    pub(crate) fn write_with<T>(
        &self,
        f: impl FnOnce(&RegionTables) -> Result<T, RegionError>,
    ) -> Result<T, RegionError> {
        self.with_tables(|tables| {
            let result = f(tables)?;
            if self.config.storage.sync_writes {
                tables.db.flush()?;
            }
            Ok(result)
        })
    }

    pub(crate) fn check_payload_size(&self, size: usize) -> Result<(), RegionError> {
        let limit = self.config.storage.max_payload_bytes;
        if size as u64 > limit {
            return Err(RegionError::PayloadTooLarge { size, limit });
        }
        Ok(())
    }

    /// Forces everything written so far to disk.
    pub fn flush(&self) -> Result<(), RegionError> {
        self.with_tables(|tables| {
            tables.db.flush()?;
            Ok(())
        })
    }

    pub fn size_on_disk(&self) -> Result<u64, RegionError> {
        self.with_tables(|tables| Ok(tables.db.size_on_disk()?))
    }

    /// Flushes and releases the region. Every later call fails with
    /// [`RegionError::AlreadyClosed`], including a second `close`.
    pub fn close(&self) -> Result<(), RegionError> {
        let mut guard = self.tables.write();
        let tables = guard.take().ok_or(RegionError::AlreadyClosed)?;
        transition(&self.path, RegionState::Ready, RegionState::Closed);

        let flushed = tables.db.flush();
        drop(tables);
        flushed?;

        info!("Closed region file {:?}", self.path);
        Ok(())
    }
}

impl Drop for RegionFile {
    fn drop(&mut self) {
        if let Some(tables) = self.tables.get_mut().take() {
            if let Err(err) = tables.db.flush() {
                error!("Failed to flush region {:?} on drop: {err}", self.path);
            }
        }
    }
}

impl fmt::Debug for RegionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionFile")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Barrier;
    use std::thread;

    use cubic_tag::Tag;
    use temp_dir::TempDir;

    use super::*;
    use crate::ChunkPos;
    use crate::schema::VERSION_KEY;

    fn config() -> RegionConfiguration {
        RegionConfiguration::default()
    }

    /// Every file below `dir` with its contents.
    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.insert(path.clone(), fs::read(&path).unwrap());
                }
            }
        }
        files
    }

    #[test]
    fn stone_survives_reopen() {
        let _ = env_logger::try_init();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0");

        let region = RegionFile::create(&path, &config()).unwrap();
        assert_eq!(region.state(), RegionState::Ready);
        region.metadata().set(VERSION_KEY, 1).unwrap();
        region
            .chunks()
            .put_chunk(ChunkPos::new(0, 0, 0), b"stone", Compression::None)
            .unwrap();
        region.close().unwrap();
        assert_eq!(region.state(), RegionState::Closed);

        let region = RegionFile::open(&path, &config()).unwrap();
        assert_eq!(
            region.chunks().get_chunk(ChunkPos::new(0, 0, 0)).unwrap(),
            Some(b"stone".to_vec())
        );
        // Opening migrated it forward
        assert_eq!(region.metadata().schema_version().unwrap(), CURRENT_VERSION);
        assert_eq!(header::read(&path).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn create_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0");
        RegionFile::create(&path, &config()).unwrap().close().unwrap();

        match RegionFile::create(&path, &config()) {
            Err(RegionError::IoFailure(sled::Error::Io(err))) => {
                assert_eq!(err.kind(), ErrorKind::AlreadyExists)
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn open_missing() {
        let dir = TempDir::new().unwrap();
        match RegionFile::open(dir.path().join("nope"), &config()) {
            Err(RegionError::IoFailure(sled::Error::Io(err))) => {
                assert_eq!(err.kind(), ErrorKind::NotFound)
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(!dir.path().join("nope").exists());
    }

    #[test]
    fn open_or_create_both_ways() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.1.-1");

        let region = RegionFile::open_or_create(&path, &config()).unwrap();
        region.metadata().set("seed", 7).unwrap();
        region.close().unwrap();

        let region = RegionFile::open_or_create(&path, &config()).unwrap();
        assert_eq!(region.metadata().get("seed").unwrap(), Some(Tag::Int(7)));
    }

    #[test]
    fn future_version_is_rejected_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0");

        let region = RegionFile::create(&path, &config()).unwrap();
        region
            .chunks()
            .put_chunk(ChunkPos::new(1, 2, 3), b"granite", Compression::ZLib)
            .unwrap();
        region
            .metadata()
            .set(VERSION_KEY, CURRENT_VERSION + 1)
            .unwrap();
        region.close().unwrap();
        drop(region);

        let before = snapshot(&path);
        assert!(matches!(
            RegionFile::open(&path, &config()),
            Err(RegionError::UnsupportedVersion { found, supported })
                if found == CURRENT_VERSION + 1 && supported == CURRENT_VERSION
        ));
        assert_eq!(snapshot(&path), before);

        // Still intact for a newer engine
        let db = sled::open(&path).unwrap();
        let metadata = db.open_tree(METADATA_TREE).unwrap();
        assert_eq!(
            metadata::read_version(&metadata).unwrap(),
            CURRENT_VERSION + 1
        );
        let chunks = db.open_tree(CHUNKS_TREE).unwrap();
        assert!(chunks
            .get(ChunkPos::new(1, 2, 3).to_key())
            .unwrap()
            .is_some());
    }

    #[test]
    fn foreign_database_is_corrupt_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not_a_region");
        {
            let db = sled::open(&path).unwrap();
            db.insert("hello", "world").unwrap();
            db.flush().unwrap();
        }

        let before = snapshot(&path);
        assert!(matches!(
            RegionFile::open(&path, &config()),
            Err(RegionError::CorruptMetadata(_))
        ));
        assert_eq!(snapshot(&path), before);
    }

    #[test]
    fn empty_directory_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        fs::create_dir(&path).unwrap();

        assert!(matches!(
            RegionFile::open(&path, &config()),
            Err(RegionError::CorruptMetadata(_))
        ));
        assert!(snapshot(&path).is_empty());
        assert!(RegionFile::open_or_create(&path, &config()).is_err());
    }

    #[test]
    fn header_catches_up_after_interrupted_migration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0");
        RegionFile::create(&path, &config()).unwrap().close().unwrap();

        // The table was migrated but the header update never happened
        header::write(&path, 1).unwrap();

        let region = RegionFile::open(&path, &config()).unwrap();
        assert_eq!(region.metadata().schema_version().unwrap(), CURRENT_VERSION);
        assert_eq!(header::read(&path).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn closed_region_rejects_everything() {
        let dir = TempDir::new().unwrap();
        let region = RegionFile::create(dir.path().join("r.0.0"), &config()).unwrap();
        let pos = ChunkPos::new(0, 0, 0);
        region.chunks().put_chunk(pos, b"dirt", Compression::LZ4).unwrap();
        region.close().unwrap();

        assert!(matches!(region.close(), Err(RegionError::AlreadyClosed)));
        assert!(matches!(
            region.chunks().get_chunk(pos),
            Err(RegionError::AlreadyClosed)
        ));
        assert!(matches!(
            region.chunks().put_chunk(pos, b"dirt", Compression::LZ4),
            Err(RegionError::AlreadyClosed)
        ));
        assert!(matches!(
            region.chunks().list_chunk_keys(),
            Err(RegionError::AlreadyClosed)
        ));
        assert!(matches!(
            region.metadata().get(VERSION_KEY),
            Err(RegionError::AlreadyClosed)
        ));
        assert!(matches!(region.flush(), Err(RegionError::AlreadyClosed)));

        let err = region
            .topography()
            .get_topography(crate::TopographyPos::new(0, 0, 0))
            .unwrap_err();
        assert!(matches!(err.source, RegionError::AlreadyClosed));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn readers_run_alongside_writer() {
        let dir = TempDir::new().unwrap();
        let region = RegionFile::create(dir.path().join("r.0.0"), &config()).unwrap();
        let pos = ChunkPos::new(4, -4, 4);
        let old = vec![1u8; 2048];
        let new = vec![2u8; 4096];
        region.chunks().put_chunk(pos, &old, Compression::Zstd).unwrap();

        let barrier = Barrier::new(3);
        thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    barrier.wait();
                    for _ in 0..200 {
                        let read = region.chunks().get_chunk(pos).unwrap().unwrap();
                        // Never a mix of the two
                        assert!(read == old || read == new);
                    }
                });
            }
            barrier.wait();
            region.chunks().put_chunk(pos, &new, Compression::GZip).unwrap();
        });

        assert_eq!(region.chunks().get_chunk(pos).unwrap(), Some(new));
    }

    #[test]
    fn close_waits_for_running_call() {
        let dir = TempDir::new().unwrap();
        let region = RegionFile::create(dir.path().join("r.0.0"), &config()).unwrap();

        let started = Barrier::new(2);
        thread::scope(|scope| {
            scope.spawn(|| {
                region
                    .with_tables(|tables| {
                        started.wait();
                        thread::sleep(std::time::Duration::from_millis(50));
                        tables.chunks.insert(&ChunkPos::new(9, 9, 9).to_key()[..], &[0u8; 4][..])?;
                        Ok(())
                    })
                    .unwrap();
            });
            started.wait();
            region.close().unwrap();
        });

        assert_eq!(region.state(), RegionState::Closed);
        let region = RegionFile::open(region.path(), &config()).unwrap();
        assert!(region
            .chunks()
            .contains_chunk(ChunkPos::new(9, 9, 9))
            .unwrap());
    }

    #[test]
    fn payload_limit() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.storage.max_payload_bytes = 16;
        let region = RegionFile::create(dir.path().join("r.0.0"), &config).unwrap();

        assert!(matches!(
            region
                .chunks()
                .put_chunk(ChunkPos::new(0, 0, 0), &[7; 64], Compression::None),
            Err(RegionError::PayloadTooLarge { size: 64, limit: 16 })
        ));
        assert!(!region.chunks().contains_chunk(ChunkPos::new(0, 0, 0)).unwrap());
    }

    #[test]
    fn default_compression_follows_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.compression.algorithm = cubic_config::CompressionAlgorithm::GZip;
        let region = RegionFile::create(dir.path().join("r.0.0"), &config).unwrap();
        assert_eq!(region.default_compression(), Compression::GZip);
        assert!(region.size_on_disk().unwrap() > 0);
    }
}
