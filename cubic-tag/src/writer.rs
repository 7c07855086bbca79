use bytes::BufMut;

use crate::{Error, Result};

/// Big-endian writer into an owned buffer.
///
/// Frame lengths are not known until a tag's payload has been written, so the
/// writer hands out a placeholder position that is patched afterwards.
#[derive(Debug, Default)]
pub struct WriteAdaptor {
    buf: Vec<u8>,
}

impl WriteAdaptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8_be(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16_be(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn write_u32_be(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn write_i64_be(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn write_f64_be(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    pub fn write_slice(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| Error::LargeLength(len))?;
        self.write_u32_be(len);
        Ok(())
    }

    pub fn write_short_string(&mut self, value: &str) -> Result<()> {
        let len = value.len();
        if len > u16::MAX as usize {
            return Err(Error::LargeLength(len));
        }
        self.write_u16_be(len as u16);
        self.write_slice(value.as_bytes());
        Ok(())
    }

    /// Reserves four bytes for a frame length and returns their position.
    pub fn begin_frame(&mut self) -> usize {
        let at = self.buf.len();
        self.buf.put_u32(0);
        at
    }

    /// Fills in the length reserved by [`WriteAdaptor::begin_frame`].
    pub fn end_frame(&mut self, at: usize) -> Result<()> {
        let len = self.buf.len() - at - 4;
        let len = u32::try_from(len).map_err(|_| Error::LargeLength(len))?;
        self.buf[at..at + 4].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}
