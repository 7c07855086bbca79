use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use cubic_tag::{from_tag, to_tag, Tag};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Tree;

use crate::error::RegionError;
use crate::header;
use crate::region::RegionFile;
use crate::schema::{
    CREATED_AT_KEY, CURRENT_VERSION, MIMETYPE_KEY, OLDEST_READABLE_VERSION, REGION_MIMETYPE,
    VERSION_KEY,
};

pub(crate) fn encode_value(key: &str, value: &Tag) -> Result<Vec<u8>, RegionError> {
    value
        .to_bytes()
        .map_err(|err| RegionError::CorruptMetadata(format!("can't encode {key:?}: {err}")))
}

pub(crate) fn decode_value(key: &str, bytes: &[u8]) -> Result<Tag, RegionError> {
    Tag::from_bytes(bytes)
        .map_err(|err| RegionError::CorruptMetadata(format!("value of {key:?}: {err}")))
}

pub(crate) fn read_value(tree: &Tree, key: &str) -> Result<Option<Tag>, RegionError> {
    tree.get(key.as_bytes())?
        .map(|bytes| decode_value(key, &bytes))
        .transpose()
}

/// Interprets a raw `version` value.
pub(crate) fn decode_version(bytes: Option<&[u8]>) -> Result<i64, RegionError> {
    let bytes = bytes.ok_or_else(|| {
        RegionError::CorruptMetadata(format!("missing required {VERSION_KEY:?} key"))
    })?;
    decode_value(VERSION_KEY, bytes)?.as_int().ok_or_else(|| {
        RegionError::CorruptMetadata(format!("{VERSION_KEY:?} is not an integer"))
    })
}

pub(crate) fn read_version(tree: &Tree) -> Result<i64, RegionError> {
    decode_version(tree.get(VERSION_KEY.as_bytes())?.as_deref())
}

/// Writes the keys every new region starts with, in one batch.
pub(crate) fn seed(tree: &Tree) -> Result<(), RegionError> {
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs() as i64)
        .unwrap_or_default();

    let mut batch = sled::Batch::default();
    for (key, value) in [
        (VERSION_KEY, Tag::Int(CURRENT_VERSION)),
        (MIMETYPE_KEY, Tag::from(REGION_MIMETYPE)),
        (CREATED_AT_KEY, Tag::Int(created_at)),
    ] {
        batch.insert(key.as_bytes(), encode_value(key, &value)?);
    }
    tree.apply_batch(batch)?;
    Ok(())
}

/// Fails with [`RegionError::UnsupportedVersion`] unless this engine can read
/// (and, if needed, migrate) schema `version`.
pub(crate) fn check_version(version: i64) -> Result<i64, RegionError> {
    if !(OLDEST_READABLE_VERSION..=CURRENT_VERSION).contains(&version) {
        return Err(RegionError::unsupported_version(version));
    }
    Ok(version)
}

/// Checks that this engine can read the region, returning its schema version.
///
/// This only reads; nothing is written until the caller decides to migrate.
pub(crate) fn check_compatible(tree: &Tree) -> Result<i64, RegionError> {
    let version = check_version(read_version(tree)?)?;

    // Older files may predate the marker, but a different one means this isn't our format
    if let Some(mimetype) = read_value(tree, MIMETYPE_KEY)? {
        if mimetype.as_str() != Some(REGION_MIMETYPE) {
            return Err(RegionError::CorruptMetadata(format!(
                "unexpected {MIMETYPE_KEY:?} {mimetype:?}"
            )));
        }
    }

    Ok(version)
}

/// Engine bookkeeping stored alongside the world data.
///
/// Values are [`Tag`]s, so fields can be added to a record without a schema
/// migration.
pub struct MetadataStore<'a> {
    region: &'a RegionFile,
}

impl<'a> MetadataStore<'a> {
    pub(crate) fn new(region: &'a RegionFile) -> Self {
        Self { region }
    }

    pub fn get(&self, key: &str) -> Result<Option<Tag>, RegionError> {
        self.region
            .with_tables(|tables| read_value(&tables.metadata, key))
    }

    /// Inserts or overwrites `key`.
    ///
    /// Setting [`VERSION_KEY`] also updates the region header, which is what
    /// decides whether a later open is attempted at all.
    pub fn set(&self, key: &str, value: impl Into<Tag>) -> Result<(), RegionError> {
        let value = value.into();
        let bytes = encode_value(key, &value)?;
        self.region.write_with(|tables| {
            tables.metadata.insert(key.as_bytes(), bytes)?;
            debug!("Set metadata {key:?} in {:?}", self.region.path());
            if key == VERSION_KEY {
                // The header must never run ahead of the table
                tables.db.flush()?;
                match value.as_int() {
                    Some(version) => header::write(self.region.path(), version)?,
                    None => header::remove(self.region.path())?,
                }
            }
            Ok(())
        })
    }

    /// Serializes `value` into a [`Tag`] and stores it under `key`.
    pub fn put_value<T>(&self, key: &str, value: &T) -> Result<(), RegionError>
    where
        T: Serialize + ?Sized,
    {
        let tag = to_tag(value)
            .map_err(|err| RegionError::CorruptMetadata(format!("can't encode {key:?}: {err}")))?;
        self.set(key, tag)
    }

    /// Reads `key` back into a `T`.
    pub fn get_value<T>(&self, key: &str) -> Result<Option<T>, RegionError>
    where
        T: DeserializeOwned,
    {
        self.get(key)?
            .map(|tag| {
                from_tag(tag)
                    .map_err(|err| RegionError::CorruptMetadata(format!("value of {key:?}: {err}")))
            })
            .transpose()
    }

    /// Removes `key`, returning its last value. Nothing is ever removed implicitly.
    pub fn remove(&self, key: &str) -> Result<Option<Tag>, RegionError> {
        self.region.write_with(|tables| {
            let removed = tables.metadata.remove(key.as_bytes())?;
            if key == VERSION_KEY {
                header::remove(self.region.path())?;
            }
            removed
                .map(|bytes| decode_value(key, &bytes))
                .transpose()
        })
    }

    pub fn list_keys(&self) -> Result<BTreeSet<String>, RegionError> {
        self.region.with_tables(|tables| {
            tables
                .metadata
                .iter()
                .keys()
                .map(|key| {
                    let key = key?;
                    String::from_utf8(key.to_vec()).map_err(|_| RegionError::CorruptKey {
                        table: crate::schema::METADATA_TREE,
                        len: key.len(),
                    })
                })
                .collect()
        })
    }

    pub fn schema_version(&self) -> Result<i64, RegionError> {
        self.region
            .with_tables(|tables| read_version(&tables.metadata))
    }
}
