use std::collections::HashSet;

use crate::reader::ReadAdaptor;
use crate::tag::Tag;
use crate::writer::WriteAdaptor;
use crate::{Error, Result};

/// Named fields in insertion order. Field names are unique.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagRecord {
    fields: Vec<(String, Tag)>,
}

impl TagRecord {
    pub fn new() -> TagRecord {
        TagRecord { fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn serialize_content(&self, w: &mut WriteAdaptor) -> Result<()> {
        w.write_len(self.fields.len())?;
        for (name, tag) in &self.fields {
            w.write_short_string(name)?;
            tag.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize_content(reader: &mut ReadAdaptor<'_>, depth: usize) -> Result<TagRecord> {
        let len = reader.get_u32_be()? as usize;
        // Each field is at least a 2 byte name and a 5 byte frame
        let capacity = len.min(reader.remaining() / 7);
        let mut record = TagRecord {
            fields: Vec::with_capacity(capacity),
        };
        let mut seen = HashSet::with_capacity(capacity);

        for _ in 0..len {
            let name = reader.get_short_string()?;
            let tag = Tag::deserialize(reader, depth + 1)?;
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateField(name));
            }
            record.fields.push((name, tag));
        }

        Ok(record)
    }

    /// Sets `name`, replacing an existing value in place.
    pub fn put(&mut self, name: &str, value: impl Into<Tag>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Tag> {
        let index = self.fields.iter().position(|(key, _)| key == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(key, _)| key == name)
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, tag)| tag)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Tag::as_int)
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Tag::as_double)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Tag::as_str)
    }

    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(Tag::as_bytes)
    }

    pub fn get_list(&self, name: &str) -> Option<&[Tag]> {
        self.get(name).and_then(Tag::as_list)
    }

    pub fn get_record(&self, name: &str) -> Option<&TagRecord> {
        self.get(name).and_then(Tag::as_record)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.fields.iter().map(|(name, tag)| (name.as_str(), tag))
    }
}

impl FromIterator<(String, Tag)> for TagRecord {
    fn from_iter<T: IntoIterator<Item = (String, Tag)>>(iter: T) -> Self {
        let mut record = TagRecord::new();
        for (name, tag) in iter {
            record.put(&name, tag);
        }
        record
    }
}

impl IntoIterator for TagRecord {
    type Item = (String, Tag);
    type IntoIter = std::vec::IntoIter<(String, Tag)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
