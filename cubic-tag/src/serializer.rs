use serde::{Serialize, ser};

use crate::record::TagRecord;
use crate::tag::Tag;
use crate::{Error, Result};

/// Serializes any `T: Serialize` into a [`Tag`].
///
/// Structs and maps become records, sequences and tuples become lists, unit
/// variants become strings and other enum variants become a record with one
/// field named after the variant. `None` fields are left out of the record.
pub fn to_tag<T>(value: &T) -> Result<Tag>
where
    T: Serialize + ?Sized,
{
    value
        .serialize(Serializer)?
        .ok_or_else(|| Error::UnsupportedType("a missing value at the top level".to_string()))
}

/// Produces `None` for an absent optional value so the containing record can skip it.
pub struct Serializer;

fn present(tag: Option<Tag>) -> Result<Tag> {
    tag.ok_or_else(|| Error::UnsupportedType("a missing value inside a list".to_string()))
}

fn variant(name: &str, tag: Tag) -> Tag {
    let mut record = TagRecord::new();
    record.put(name, tag);
    Tag::Record(record)
}

impl ser::Serializer for Serializer {
    type Ok = Option<Tag>;
    type Error = Error;

    type SerializeSeq = SerializeList;
    type SerializeTuple = SerializeList;
    type SerializeTupleStruct = SerializeList;
    type SerializeTupleVariant = SerializeList;
    type SerializeMap = SerializeRecord;
    type SerializeStruct = SerializeRecord;
    type SerializeStructVariant = SerializeRecord;

    fn serialize_bool(self, v: bool) -> Result<Option<Tag>> {
        Ok(Some(Tag::from(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Option<Tag>> {
        self.serialize_i64(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<Option<Tag>> {
        self.serialize_i64(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<Option<Tag>> {
        self.serialize_i64(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<Option<Tag>> {
        Ok(Some(Tag::Int(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Option<Tag>> {
        self.serialize_i64(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<Option<Tag>> {
        self.serialize_i64(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<Option<Tag>> {
        self.serialize_i64(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<Option<Tag>> {
        let v = i64::try_from(v)
            .map_err(|_| Error::UnsupportedType(format!("u64 {v} does not fit an Int tag")))?;
        self.serialize_i64(v)
    }

    fn serialize_f32(self, v: f32) -> Result<Option<Tag>> {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<Option<Tag>> {
        Ok(Some(Tag::Double(v)))
    }

    fn serialize_char(self, v: char) -> Result<Option<Tag>> {
        Ok(Some(Tag::String(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Option<Tag>> {
        Ok(Some(Tag::from(v)))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Option<Tag>> {
        Ok(Some(Tag::from(v)))
    }

    fn serialize_none(self) -> Result<Option<Tag>> {
        Ok(None)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Option<Tag>>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Option<Tag>> {
        Ok(Some(Tag::Record(TagRecord::new())))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Option<Tag>> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Option<Tag>> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Option<Tag>>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant_name: &'static str,
        value: &T,
    ) -> Result<Option<Tag>>
    where
        T: ?Sized + Serialize,
    {
        let tag = present(value.serialize(self)?)?;
        Ok(Some(variant(variant_name, tag)))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeList> {
        Ok(SerializeList {
            variant: None,
            list: Vec::with_capacity(len.unwrap_or_default()),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeList> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SerializeList> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeList> {
        Ok(SerializeList {
            variant: Some(variant),
            list: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeRecord> {
        Ok(SerializeRecord::default())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<SerializeRecord> {
        self.serialize_map(None)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<SerializeRecord> {
        Ok(SerializeRecord {
            variant: Some(variant),
            ..Default::default()
        })
    }
}

pub struct SerializeList {
    variant: Option<&'static str>,
    list: Vec<Tag>,
}

impl SerializeList {
    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.list.push(present(value.serialize(Serializer)?)?);
        Ok(())
    }

    fn finish(self) -> Result<Option<Tag>> {
        let list = Tag::List(self.list);
        Ok(Some(match self.variant {
            Some(name) => variant(name, list),
            None => list,
        }))
    }
}

impl ser::SerializeSeq for SerializeList {
    type Ok = Option<Tag>;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Option<Tag>> {
        self.finish()
    }
}

impl ser::SerializeTuple for SerializeList {
    type Ok = Option<Tag>;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Option<Tag>> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for SerializeList {
    type Ok = Option<Tag>;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Option<Tag>> {
        self.finish()
    }
}

impl ser::SerializeTupleVariant for SerializeList {
    type Ok = Option<Tag>;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Option<Tag>> {
        self.finish()
    }
}

#[derive(Default)]
pub struct SerializeRecord {
    variant: Option<&'static str>,
    record: TagRecord,
    key: Option<String>,
}

impl SerializeRecord {
    fn field<T>(&mut self, name: &str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        if let Some(tag) = value.serialize(Serializer)? {
            self.record.put(name, tag);
        }
        Ok(())
    }

    fn finish(self) -> Result<Option<Tag>> {
        let record = Tag::Record(self.record);
        Ok(Some(match self.variant {
            Some(name) => variant(name, record),
            None => record,
        }))
    }
}

impl ser::SerializeMap for SerializeRecord {
    type Ok = Option<Tag>;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        match key.serialize(Serializer)? {
            Some(Tag::String(key)) => {
                self.key = Some(key);
                Ok(())
            }
            _ => Err(Error::UnsupportedType(
                "record keys must be strings".to_string(),
            )),
        }
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .key
            .take()
            .ok_or_else(|| Error::SerdeError("map value without a key".to_string()))?;
        self.field(&key, value)
    }

    fn end(self) -> Result<Option<Tag>> {
        self.finish()
    }
}

impl ser::SerializeStruct for SerializeRecord {
    type Ok = Option<Tag>;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.field(key, value)
    }

    fn end(self) -> Result<Option<Tag>> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for SerializeRecord {
    type Ok = Option<Tag>;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.field(key, value)
    }

    fn end(self) -> Result<Option<Tag>> {
        self.finish()
    }
}
