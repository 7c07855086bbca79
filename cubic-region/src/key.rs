//! Byte encodings of table keys and record values.
//!
//! Coordinates are stored big-endian with the sign bit flipped, so the byte
//! order of keys equals numeric order and everything under one topography key
//! id shares a 4 byte prefix.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::error::{CompressionError, RegionError};
use crate::schema::{CHUNKS_TREE, TOPOGRAPHY_TREE};

pub const CHUNK_KEY_LEN: usize = 12;
pub const TOPOGRAPHY_KEY_LEN: usize = 12;

const SIGN_FLIP: u32 = 0x8000_0000;

#[inline]
fn put_ordered_i32(buf: &mut impl BufMut, value: i32) {
    buf.put_u32(value as u32 ^ SIGN_FLIP);
}

#[inline]
fn get_ordered_i32(buf: &mut impl Buf) -> i32 {
    (buf.get_u32() ^ SIGN_FLIP) as i32
}

/// Position of a chunk on the chunk grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn to_key(self) -> [u8; CHUNK_KEY_LEN] {
        let mut key = [0; CHUNK_KEY_LEN];
        let mut buf = &mut key[..];
        put_ordered_i32(&mut buf, self.x);
        put_ordered_i32(&mut buf, self.y);
        put_ordered_i32(&mut buf, self.z);
        key
    }

    pub fn from_key(key: &[u8]) -> Result<Self, RegionError> {
        if key.len() != CHUNK_KEY_LEN {
            return Err(RegionError::CorruptKey {
                table: CHUNKS_TREE,
                len: key.len(),
            });
        }
        let mut buf = key;
        Ok(Self {
            x: get_ordered_i32(&mut buf),
            y: get_ordered_i32(&mut buf),
            z: get_ordered_i32(&mut buf),
        })
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

impl From<(i32, i32, i32)> for ChunkPos {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

/// Position of a topography column, scoped to one generation epoch (`key_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopographyPos {
    pub key_id: i32,
    pub x: i32,
    pub y: i32,
}

impl TopographyPos {
    pub const fn new(key_id: i32, x: i32, y: i32) -> Self {
        Self { key_id, x, y }
    }

    pub fn to_key(self) -> [u8; TOPOGRAPHY_KEY_LEN] {
        let mut key = [0; TOPOGRAPHY_KEY_LEN];
        let mut buf = &mut key[..];
        put_ordered_i32(&mut buf, self.key_id);
        put_ordered_i32(&mut buf, self.x);
        put_ordered_i32(&mut buf, self.y);
        key
    }

    /// The prefix shared by every row of `key_id`.
    pub fn key_id_prefix(key_id: i32) -> [u8; 4] {
        (key_id as u32 ^ SIGN_FLIP).to_be_bytes()
    }

    /// Decodes the first [`TOPOGRAPHY_KEY_LEN`] bytes of `key`. Longer keys
    /// only exist in schema 1 files, where a row sequence number follows.
    pub fn from_key_prefix(key: &[u8]) -> Result<Self, RegionError> {
        if key.len() < TOPOGRAPHY_KEY_LEN {
            return Err(RegionError::CorruptKey {
                table: TOPOGRAPHY_TREE,
                len: key.len(),
            });
        }
        let mut buf = key;
        Ok(Self {
            key_id: get_ordered_i32(&mut buf),
            x: get_ordered_i32(&mut buf),
            y: get_ordered_i32(&mut buf),
        })
    }

    pub fn from_key(key: &[u8]) -> Result<Self, RegionError> {
        if key.len() != TOPOGRAPHY_KEY_LEN {
            return Err(RegionError::CorruptKey {
                table: TOPOGRAPHY_TREE,
                len: key.len(),
            });
        }
        Self::from_key_prefix(key)
    }
}

impl fmt::Display for TopographyPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {},{}", self.key_id, self.x, self.y)
    }
}

/// A stored chunk or topography row: the codec id followed by the encoded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub compression: i32,
    pub data: Vec<u8>,
}

impl StoredRecord {
    pub fn to_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(4 + self.data.len());
        value.put_i32(self.compression);
        value.put_slice(&self.data);
        value
    }

    pub fn from_value(value: &[u8]) -> Result<Self, RegionError> {
        if value.len() < 4 {
            return Err(RegionError::CorruptPayload(
                CompressionError::TruncatedRecord(value.len()),
            ));
        }
        let mut buf = value;
        let compression = buf.get_i32();
        Ok(Self {
            compression,
            data: buf.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_matches_numeric_order() {
        let positions = [
            ChunkPos::new(i32::MIN, 0, 0),
            ChunkPos::new(-1, 5, 5),
            ChunkPos::new(0, -3, 7),
            ChunkPos::new(0, 0, -1),
            ChunkPos::new(0, 0, 0),
            ChunkPos::new(1, i32::MIN, 0),
            ChunkPos::new(i32::MAX, i32::MAX, i32::MAX),
        ];
        let mut keys: Vec<_> = positions.iter().map(|pos| pos.to_key()).collect();
        keys.sort();
        let decoded: Vec<_> = keys
            .iter()
            .map(|key| ChunkPos::from_key(key).unwrap())
            .collect();
        assert_eq!(decoded, positions);
    }

    #[test]
    fn topography_prefix() {
        let pos = TopographyPos::new(-7, 12, -40);
        let key = pos.to_key();
        assert_eq!(key[..4], TopographyPos::key_id_prefix(-7));
        assert_ne!(key[..4], TopographyPos::key_id_prefix(7));
        assert_eq!(TopographyPos::from_key(&key).unwrap(), pos);

        let mut legacy = key.to_vec();
        legacy.extend_from_slice(&9u64.to_be_bytes());
        assert!(TopographyPos::from_key(&legacy).is_err());
        assert_eq!(TopographyPos::from_key_prefix(&legacy).unwrap(), pos);
    }

    #[test]
    fn bad_key_length() {
        assert!(ChunkPos::from_key(&[0; 11]).is_err());
        assert!(ChunkPos::from_key(&[0; 13]).is_err());
    }

    #[test]
    fn record_value() {
        let record = StoredRecord {
            compression: 99,
            data: b"stone".to_vec(),
        };
        let value = record.to_value();
        assert_eq!(&value[..4], &[0, 0, 0, 99]);
        assert_eq!(StoredRecord::from_value(&value).unwrap(), record);

        assert!(matches!(
            StoredRecord::from_value(&[0, 0]),
            Err(RegionError::CorruptPayload(
                CompressionError::TruncatedRecord(2)
            ))
        ));
    }
}
