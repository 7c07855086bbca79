use bytes::Buf;

use crate::{Error, Result};

/// Bounds-checked big-endian reader over a borrowed buffer.
///
/// A failed read never consumes input.
#[derive(Debug)]
pub struct ReadAdaptor<'a> {
    bytes: &'a [u8],
}

impl<'a> ReadAdaptor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.bytes.len() < needed {
            return Err(Error::Incomplete {
                needed,
                available: self.bytes.len(),
            });
        }
        Ok(())
    }

    pub fn get_u8_be(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.bytes.get_u8())
    }

    pub fn get_u16_be(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.bytes.get_u16())
    }

    pub fn get_u32_be(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.bytes.get_u32())
    }

    pub fn get_i64_be(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.bytes.get_i64())
    }

    pub fn get_f64_be(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.bytes.get_f64())
    }

    /// Borrows the next `count` bytes.
    pub fn read_slice(&mut self, count: usize) -> Result<&'a [u8]> {
        self.ensure(count)?;
        let (head, tail) = self.bytes.split_at(count);
        self.bytes = tail;
        Ok(head)
    }

    /// Borrows everything that is left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.bytes)
    }

    /// A length prefixed (u16) UTF-8 string, as used for record field names.
    pub fn get_short_string(&mut self) -> Result<String> {
        let len = self.get_u16_be()? as usize;
        let bytes = self.read_slice(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| Error::InvalidUtf8)
    }
}
