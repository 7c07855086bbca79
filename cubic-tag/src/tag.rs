use crate::reader::ReadAdaptor;
use crate::record::TagRecord;
use crate::writer::WriteAdaptor;
use crate::*;

/// A self-describing value.
///
/// Every tag is framed as `[id: u8][payload length: u32][payload]`, so readers
/// can carry tag types they do not understand as [`Tag::Opaque`] and write
/// them back unchanged.
#[derive(Clone, Debug, PartialEq)]
pub enum Tag {
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Box<[u8]>),
    List(Vec<Tag>),
    Record(TagRecord),
    /// A tag type introduced by a newer writer.
    Opaque { id: u8, data: Box<[u8]> },
}

impl Tag {
    /// Returns the numeric id associated with the data type.
    pub const fn get_type_id(&self) -> u8 {
        match self {
            Tag::Int(_) => INT_ID,
            Tag::Double(_) => DOUBLE_ID,
            Tag::String(_) => STRING_ID,
            Tag::Bytes(_) => BYTES_ID,
            Tag::List(_) => LIST_ID,
            Tag::Record(_) => RECORD_ID,
            Tag::Opaque { id, .. } => *id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = WriteAdaptor::new();
        self.serialize(&mut writer)?;
        Ok(writer.into_inner())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Tag> {
        let mut reader = ReadAdaptor::new(bytes);
        let tag = Self::deserialize(&mut reader, 0)?;
        match reader.remaining() {
            0 => Ok(tag),
            left => Err(Error::TrailingBytes(left)),
        }
    }

    pub fn serialize(&self, w: &mut WriteAdaptor) -> Result<()> {
        w.write_u8_be(self.get_type_id());
        let frame = w.begin_frame();
        self.serialize_data(w)?;
        w.end_frame(frame)
    }

    fn serialize_data(&self, w: &mut WriteAdaptor) -> Result<()> {
        match self {
            Tag::Int(int) => w.write_i64_be(*int),
            Tag::Double(double) => w.write_f64_be(*double),
            Tag::String(string) => w.write_slice(string.as_bytes()),
            Tag::Bytes(bytes) => w.write_slice(bytes),
            Tag::List(list) => {
                w.write_len(list.len())?;
                for tag in list {
                    tag.serialize(w)?;
                }
            }
            Tag::Record(record) => record.serialize_content(w)?,
            Tag::Opaque { data, .. } => w.write_slice(data),
        }
        Ok(())
    }

    pub fn deserialize(reader: &mut ReadAdaptor<'_>, depth: usize) -> Result<Tag> {
        if depth > MAX_DEPTH {
            return Err(Error::TooDeep);
        }

        let tag_id = reader.get_u8_be()?;
        let len = reader.get_u32_be()? as usize;
        let mut payload = ReadAdaptor::new(reader.read_slice(len)?);
        let tag = Self::deserialize_data(&mut payload, tag_id, depth)?;

        match payload.remaining() {
            0 => Ok(tag),
            left => Err(Error::TrailingBytes(left)),
        }
    }

    fn deserialize_data(reader: &mut ReadAdaptor<'_>, tag_id: u8, depth: usize) -> Result<Tag> {
        match tag_id {
            0 => Err(Error::UnknownTagId(tag_id)),
            INT_ID => Ok(Tag::Int(reader.get_i64_be()?)),
            DOUBLE_ID => Ok(Tag::Double(reader.get_f64_be()?)),
            STRING_ID => {
                let string =
                    std::str::from_utf8(reader.read_rest()).map_err(|_| Error::InvalidUtf8)?;
                Ok(Tag::String(string.to_owned()))
            }
            BYTES_ID => Ok(Tag::Bytes(reader.read_rest().into())),
            LIST_ID => {
                let len = reader.get_u32_be()? as usize;
                // Each element is at least a 5 byte frame; don't trust `len` for the allocation
                let mut list = Vec::with_capacity(len.min(reader.remaining() / 5));
                for _ in 0..len {
                    list.push(Self::deserialize(reader, depth + 1)?);
                }
                Ok(Tag::List(list))
            }
            RECORD_ID => Ok(Tag::Record(TagRecord::deserialize_content(reader, depth)?)),
            id => Ok(Tag::Opaque {
                id,
                data: reader.read_rest().into(),
            }),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Tag::Int(int) => Some(*int),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Tag::Double(double) => Some(*double),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(string) => Some(string.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Tag::Bytes(bytes) => Some(&bytes[..]),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Tag]> {
        match self {
            Tag::List(list) => Some(list.as_slice()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&TagRecord> {
        match self {
            Tag::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl From<i64> for Tag {
    fn from(value: i64) -> Self {
        Tag::Int(value)
    }
}

impl From<i32> for Tag {
    fn from(value: i32) -> Self {
        Tag::Int(value.into())
    }
}

impl From<u32> for Tag {
    fn from(value: u32) -> Self {
        Tag::Int(value.into())
    }
}

impl From<bool> for Tag {
    fn from(value: bool) -> Self {
        Tag::Int(value.into())
    }
}

impl From<f64> for Tag {
    fn from(value: f64) -> Self {
        Tag::Double(value)
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Tag::String(value)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag::String(value.to_owned())
    }
}

impl From<&[u8]> for Tag {
    fn from(value: &[u8]) -> Self {
        Tag::Bytes(value.into())
    }
}

impl From<Vec<u8>> for Tag {
    fn from(value: Vec<u8>) -> Self {
        Tag::Bytes(value.into_boxed_slice())
    }
}

impl From<Vec<Tag>> for Tag {
    fn from(value: Vec<Tag>) -> Self {
        Tag::List(value)
    }
}

impl From<TagRecord> for Tag {
    fn from(value: TagRecord) -> Self {
        Tag::Record(value)
    }
}
