//! Model info decoding
//!
//! The daemon describes models as JSON text: one object for a single model,
//! an array of objects for a listing. Each object becomes one
//! [`OptionStore`] with members in document order. The top-level shape must
//! match the call, and decoding is all-or-nothing.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

use crate::error::{Error, Result};
use crate::options::OptionStore;

/// Decode a listing: a non-empty top-level array of objects
pub fn decode_list(json: &str) -> Result<Vec<OptionStore>> {
    serde_json::from_str::<RecordList>(json)
        .map(|list| list.0)
        .map_err(|e| Error::protocol(format!("invalid model listing: {}", e)))
}

/// Decode a single record: a top-level object
pub fn decode_object(json: &str) -> Result<OptionStore> {
    serde_json::from_str::<Record>(json)
        .map(|record| record.0)
        .map_err(|e| Error::protocol(format!("invalid model record: {}", e)))
}

struct RecordList(Vec<OptionStore>);

impl<'de> Deserialize<'de> for RecordList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_seq(ListVisitor)
    }
}

struct ListVisitor;

impl<'de> Visitor<'de> for ListVisitor {
    type Value = RecordList;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-empty array of objects")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut records = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(Record(store)) = seq.next_element()? {
            records.push(store);
        }
        if records.is_empty() {
            return Err(de::Error::custom("empty array"));
        }
        Ok(RecordList(records))
    }
}

struct Record(OptionStore);

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object of scalar members")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut store = OptionStore::new();
        while let Some((key, ScalarText(value))) = map.next_entry::<String, ScalarText>()? {
            store.set(key, value);
        }
        Ok(Record(store))
    }
}

/// A string, number or boolean kept as its text form
struct ScalarText(String);

impl<'de> Deserialize<'de> for ScalarText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = ScalarText;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, number or boolean")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
        Ok(ScalarText(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(ScalarText(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
        Ok(ScalarText(v.to_string()))
    }
}
