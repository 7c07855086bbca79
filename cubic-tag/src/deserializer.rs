use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Visitor};
use serde::{Deserializer as _, forward_to_deserialize_any};

use crate::tag::Tag;
use crate::{Error, Result};

/// Rebuilds a `T: Deserialize` from a [`Tag`] written by [`crate::to_tag`].
pub fn from_tag<T>(tag: Tag) -> Result<T>
where
    T: DeserializeOwned,
{
    T::deserialize(tag)
}

impl<'de> IntoDeserializer<'de, Error> for Tag {
    type Deserializer = Tag;

    fn into_deserializer(self) -> Tag {
        self
    }
}

impl<'de> de::Deserializer<'de> for Tag {
    type Error = Error;

    forward_to_deserialize_any! {
        i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes byte_buf
        seq tuple tuple_struct map struct identifier ignored_any
    }

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self {
            Tag::Int(int) => visitor.visit_i64(int),
            Tag::Double(double) => visitor.visit_f64(double),
            Tag::String(string) => visitor.visit_string(string),
            Tag::Bytes(bytes) => visitor.visit_byte_buf(bytes.into_vec()),
            Tag::List(list) => {
                let mut seq = SeqDeserializer::<_, Error>::new(list.into_iter());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            Tag::Record(record) => {
                let mut map = MapDeserializer::<_, Error>::new(record.into_iter());
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
            Tag::Opaque { id, .. } => Err(Error::UnsupportedType(format!(
                "tag id {id} is unknown to this version"
            ))),
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self {
            Tag::Int(int) => visitor.visit_bool(int != 0),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self {
            Tag::Record(record) if record.is_empty() => visitor.visit_unit(),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        // Absent options are simply missing from their record
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self {
            Tag::String(variant) => visitor.visit_enum(StringDeserializer::<Error>::new(variant)),
            Tag::Record(record) if record.len() == 1 => {
                let mut fields = record.into_iter();
                let Some((variant, value)) = fields.next() else {
                    return Err(Error::SerdeError("empty enum record".to_string()));
                };
                visitor.visit_enum(RecordVariant { variant, value })
            }
            _ => Err(Error::SerdeError(
                "enums are stored as a string or a single field record".to_string(),
            )),
        }
    }
}

struct RecordVariant {
    variant: String,
    value: Tag,
}

impl<'de> de::EnumAccess<'de> for RecordVariant {
    type Error = Error;
    type Variant = Tag;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Tag)>
    where
        V: de::DeserializeSeed<'de>,
    {
        let variant = seed.deserialize(StringDeserializer::<Error>::new(self.variant))?;
        Ok((variant, self.value))
    }
}

impl<'de> de::VariantAccess<'de> for Tag {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(self)
    }

    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        de::Deserializer::deserialize_any(self, visitor)
    }

    fn struct_variant<V>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        de::Deserializer::deserialize_any(self, visitor)
    }
}
