//! The header file kept next to the database inside a region directory.
//!
//! It mirrors the format marker and schema version stored in the metadata
//! table so that an open can be refused before the database is touched:
//! opening the database at all rewrites some of its files, and a region this
//! engine can't read must stay byte for byte as it was.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use cubic_tag::{Tag, TagRecord};
use log::debug;

use crate::error::RegionError;
use crate::schema::{HEADER_FILE, MIMETYPE_KEY, REGION_MIMETYPE, VERSION_KEY};

/// Reads the schema version recorded in the header of the region at `dir`.
///
/// Only reads. A missing header means `dir` is not a region.
pub(crate) fn read(dir: &Path) -> Result<i64, RegionError> {
    let path = dir.join(HEADER_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(RegionError::CorruptMetadata(format!(
                "{dir:?} has no region header"
            )));
        }
        Err(err) => return Err(err.into()),
    };

    let header = Tag::from_bytes(&bytes)
        .map_err(|err| RegionError::CorruptMetadata(format!("region header: {err}")))?;
    let record = header
        .as_record()
        .ok_or_else(|| RegionError::CorruptMetadata("region header is not a record".into()))?;
    if record.get_string(MIMETYPE_KEY) != Some(REGION_MIMETYPE) {
        return Err(RegionError::CorruptMetadata(format!(
            "unexpected {MIMETYPE_KEY:?} in region header"
        )));
    }
    record.get_int(VERSION_KEY).ok_or_else(|| {
        RegionError::CorruptMetadata(format!("region header has no {VERSION_KEY:?}"))
    })
}

/// Replaces the header of the region at `dir`.
pub(crate) fn write(dir: &Path, version: i64) -> Result<(), RegionError> {
    let mut record = TagRecord::new();
    record.put(MIMETYPE_KEY, REGION_MIMETYPE);
    record.put(VERSION_KEY, version);
    let bytes = Tag::Record(record)
        .to_bytes()
        .map_err(io::Error::other)?;

    // Write aside and rename, so a crash leaves either header intact
    let path = dir.join(HEADER_FILE);
    let staging = path.with_extension("tmp");
    fs::write(&staging, bytes)?;
    fs::rename(&staging, &path)?;
    debug!("Wrote region header {path:?} (version {version})");
    Ok(())
}

/// Removes the header, so the region is refused until a version is set again.
pub(crate) fn remove(dir: &Path) -> Result<(), RegionError> {
    match fs::remove_file(dir.join(HEADER_FILE)) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use temp_dir::TempDir;

    use super::*;

    #[test]
    fn written_header_reads_back() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), 2).unwrap();
        assert_eq!(read(dir.path()).unwrap(), 2);
        write(dir.path(), 7).unwrap();
        assert_eq!(read(dir.path()).unwrap(), 7);
        assert!(!dir.path().join(HEADER_FILE).with_extension("tmp").exists());
    }

    #[test]
    fn missing_or_foreign_header() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read(dir.path()),
            Err(RegionError::CorruptMetadata(_))
        ));

        fs::write(dir.path().join(HEADER_FILE), b"PK\x03\x04").unwrap();
        assert!(matches!(
            read(dir.path()),
            Err(RegionError::CorruptMetadata(_))
        ));

        let mut record = TagRecord::new();
        record.put(MIMETYPE_KEY, "image/png");
        record.put(VERSION_KEY, 2);
        fs::write(
            dir.path().join(HEADER_FILE),
            Tag::Record(record).to_bytes().unwrap(),
        )
        .unwrap();
        assert!(matches!(
            read(dir.path()),
            Err(RegionError::CorruptMetadata(_))
        ));

        remove(dir.path()).unwrap();
        remove(dir.path()).unwrap();
    }
}
