use std::io::{Read, Write};

use flate2::bufread::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};

use crate::error::{CompressionError, RegionError};

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_WINDOW_BITS: u32 = 22;

/// Codecs a blob can be stored with.
///
/// The numeric ids are written next to every record. Never change an
/// existing id; new codecs get a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Compression {
    /// Stored verbatim, readable without any codec support
    None = 0,
    /// ZLib Compression
    ZLib = 1,
    /// GZip Compression
    GZip = 2,
    /// LZ4 frame compression
    LZ4 = 3,
    /// Zstandard compression
    Zstd = 4,
    /// Brotli compression
    Brotli = 5,
}

impl Compression {
    pub const ALL: [Compression; 6] = [
        Compression::None,
        Compression::ZLib,
        Compression::GZip,
        Compression::LZ4,
        Compression::Zstd,
        Compression::Brotli,
    ];

    pub fn from_id(id: i32) -> Result<Self, RegionError> {
        match id {
            0 => Ok(Self::None),
            1 => Ok(Self::ZLib),
            2 => Ok(Self::GZip),
            3 => Ok(Self::LZ4),
            4 => Ok(Self::Zstd),
            5 => Ok(Self::Brotli),
            // Written by a newer engine, or garbage
            _ => Err(RegionError::UnsupportedCodec(id)),
        }
    }

    #[inline]
    pub const fn id(self) -> i32 {
        self as i32
    }

    pub fn decompress_data(&self, compressed_data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            Compression::None => Ok(compressed_data.to_vec()),
            Compression::ZLib => {
                let mut decoder = ZlibDecoder::new(compressed_data);
                let mut data = Vec::new();
                decoder
                    .read_to_end(&mut data)
                    .map_err(CompressionError::ZlibError)?;
                Ok(data)
            }
            Compression::GZip => {
                let mut decoder = GzDecoder::new(compressed_data);
                let mut data = Vec::new();
                decoder
                    .read_to_end(&mut data)
                    .map_err(CompressionError::GZipError)?;
                Ok(data)
            }
            Compression::LZ4 => {
                let mut decoder =
                    lz4::Decoder::new(compressed_data).map_err(CompressionError::LZ4Error)?;
                let mut data = Vec::new();
                decoder
                    .read_to_end(&mut data)
                    .map_err(CompressionError::LZ4Error)?;
                Ok(data)
            }
            Compression::Zstd => {
                zstd::decode_all(compressed_data).map_err(CompressionError::ZstdError)
            }
            Compression::Brotli => {
                let mut decoder = brotli::Decompressor::new(compressed_data, BROTLI_BUFFER_SIZE);
                let mut data = Vec::new();
                decoder
                    .read_to_end(&mut data)
                    .map_err(CompressionError::BrotliError)?;
                Ok(data)
            }
        }
    }

    /// `compression_level` is clamped to what the codec supports.
    pub fn compress_data(
        &self,
        uncompressed_data: &[u8],
        compression_level: u32,
    ) -> Result<Vec<u8>, CompressionError> {
        match self {
            Compression::None => Ok(uncompressed_data.to_vec()),
            Compression::ZLib => {
                let mut encoder = ZlibEncoder::new(
                    uncompressed_data,
                    flate2::Compression::new(compression_level.min(9)),
                );
                let mut data = Vec::new();
                encoder
                    .read_to_end(&mut data)
                    .map_err(CompressionError::ZlibError)?;
                Ok(data)
            }
            Compression::GZip => {
                let mut encoder = GzEncoder::new(
                    uncompressed_data,
                    flate2::Compression::new(compression_level.min(9)),
                );
                let mut data = Vec::new();
                encoder
                    .read_to_end(&mut data)
                    .map_err(CompressionError::GZipError)?;
                Ok(data)
            }
            Compression::LZ4 => {
                let mut compressed_data = Vec::new();
                let mut encoder = lz4::EncoderBuilder::new()
                    .level(compression_level.min(16))
                    .build(&mut compressed_data)
                    .map_err(CompressionError::LZ4Error)?;
                if let Err(err) = encoder.write_all(uncompressed_data) {
                    return Err(CompressionError::LZ4Error(err));
                }
                if let (_output, Err(err)) = encoder.finish() {
                    return Err(CompressionError::LZ4Error(err));
                }
                Ok(compressed_data)
            }
            Compression::Zstd => {
                zstd::encode_all(uncompressed_data, compression_level.min(22) as i32)
                    .map_err(CompressionError::ZstdError)
            }
            Compression::Brotli => {
                let mut encoder = brotli::CompressorWriter::new(
                    Vec::new(),
                    BROTLI_BUFFER_SIZE,
                    compression_level.min(11),
                    BROTLI_WINDOW_BITS,
                );
                encoder
                    .write_all(uncompressed_data)
                    .map_err(CompressionError::BrotliError)?;
                encoder.flush().map_err(CompressionError::BrotliError)?;
                Ok(encoder.into_inner())
            }
        }
    }
}

impl From<cubic_config::CompressionAlgorithm> for Compression {
    fn from(value: cubic_config::CompressionAlgorithm) -> Self {
        match value {
            cubic_config::CompressionAlgorithm::None => Self::None,
            cubic_config::CompressionAlgorithm::ZLib => Self::ZLib,
            cubic_config::CompressionAlgorithm::GZip => Self::GZip,
            cubic_config::CompressionAlgorithm::LZ4 => Self::LZ4,
            cubic_config::CompressionAlgorithm::Zstd => Self::Zstd,
            cubic_config::CompressionAlgorithm::Brotli => Self::Brotli,
        }
    }
}

/// Encodes `raw` with the codec registered under `codec_id`.
pub fn encode(codec_id: i32, raw: &[u8], level: u32) -> Result<Vec<u8>, RegionError> {
    Compression::from_id(codec_id)?
        .compress_data(raw, level)
        .map_err(|err| std::io::Error::other(err).into())
}

/// Decodes `bytes` with the codec registered under `codec_id`.
pub fn decode(codec_id: i32, bytes: &[u8]) -> Result<Vec<u8>, RegionError> {
    Compression::from_id(codec_id)?
        .decompress_data(bytes)
        .map_err(RegionError::CorruptPayload)
}
