use std::fmt::Display;

use serde::{de, ser};
use thiserror::Error;

pub mod deserializer;
pub mod reader;
pub mod record;
pub mod serializer;
pub mod tag;
pub mod writer;

pub use deserializer::from_tag;
pub use record::TagRecord;
pub use serializer::to_tag;
pub use tag::Tag;

// Ids are part of the on-disk format. Never renumber them, only append.
pub const INT_ID: u8 = 0x01;
pub const DOUBLE_ID: u8 = 0x02;
pub const STRING_ID: u8 = 0x03;
pub const BYTES_ID: u8 = 0x04;
pub const LIST_ID: u8 = 0x05;
pub const RECORD_ID: u8 = 0x06;

/// How deep lists and records may nest before decoding gives up.
pub const MAX_DEPTH: usize = 64;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Encountered the reserved tag id {0}")]
    UnknownTagId(u8),
    #[error("Tag data was cut short: needed {needed} bytes, {available} available")]
    Incomplete { needed: usize, available: usize },
    #[error("Length too large {0}")]
    LargeLength(usize),
    #[error("{0} unexpected bytes after the end of the tag")]
    TrailingBytes(usize),
    #[error("String is not valid UTF-8")]
    InvalidUtf8,
    #[error("Record field {0:?} appears more than once")]
    DuplicateField(String),
    #[error("Tags nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("Serde error: {0}")]
    SerdeError(String),
    #[error("Tags can't represent {0}")]
    UnsupportedType(String),
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::SerdeError(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::SerdeError(msg.to_string())
    }
}
