//! Ordered option store
//!
//! A string-keyed bag of typed values that keeps insertion order. Used as
//! input for edge connection setup and as the decoded form of ML agent
//! metadata records.

use std::any::Any;
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// A single value held by an [`OptionStore`]
pub enum OptionValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
    /// Opaque caller value, released by its own `Drop`
    Custom(Box<dyn Any + Send + Sync>),
}

impl OptionValue {
    /// Wrap an arbitrary value
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        OptionValue::Custom(Box::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned view. Non-negative signed values are accepted too.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            OptionValue::UInt(n) => Some(*n),
            OptionValue::Int(n) if *n >= 0 => Some(*n as u64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(n) => Some(*n),
            OptionValue::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            OptionValue::Custom(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Short name of the held type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Str(_) => "string",
            OptionValue::Int(_) => "int",
            OptionValue::UInt(_) => "uint",
            OptionValue::Bool(_) => "bool",
            OptionValue::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Str(s) => f.debug_tuple("Str").field(s).finish(),
            OptionValue::Int(n) => f.debug_tuple("Int").field(n).finish(),
            OptionValue::UInt(n) => f.debug_tuple("UInt").field(n).finish(),
            OptionValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            OptionValue::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Str(s) => write!(f, "{}", s),
            OptionValue::Int(n) => write!(f, "{}", n),
            OptionValue::UInt(n) => write!(f, "{}", n),
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Custom(_) => write!(f, "<custom>"),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(value as i64)
    }
}

impl From<u64> for OptionValue {
    fn from(value: u64) -> Self {
        OptionValue::UInt(value)
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::UInt(value as u64)
    }
}

impl From<u16> for OptionValue {
    fn from(value: u16) -> Self {
        OptionValue::UInt(value as u64)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl Serialize for OptionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            OptionValue::Str(s) => serializer.serialize_str(s),
            OptionValue::Int(n) => serializer.serialize_i64(*n),
            OptionValue::UInt(n) => serializer.serialize_u64(*n),
            OptionValue::Bool(b) => serializer.serialize_bool(*b),
            OptionValue::Custom(_) => serializer.serialize_none(),
        }
    }
}

/// Insertion-ordered map of option values
#[derive(Debug, Default)]
pub struct OptionStore {
    entries: Vec<(String, OptionValue)>,
}

impl OptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value. An existing key keeps its position and the old value is
    /// dropped.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style variant of [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OptionValue::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for OptionStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = OptionStore::new();
        for (k, v) in iter {
            store.set(k, v);
        }
        store
    }
}

impl Serialize for OptionStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_insertion_order_kept() {
        let store = OptionStore::new()
            .with("zeta", "1")
            .with("alpha", 2u32)
            .with("mid", true);

        let keys: Vec<&str> = store.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut store = OptionStore::new().with("a", "x").with("b", "y");
        store.set("a", "z");

        assert_eq!(store.len(), 2);
        assert_eq!(store.keys().next(), Some("a"));
        assert_eq!(store.get_str("a"), Some("z"));
    }

    #[test]
    fn test_typed_accessors() {
        let store = OptionStore::new()
            .with("port", 3000u16)
            .with("neg", -1i64)
            .with("flag", false);

        assert_eq!(store.get("port").and_then(OptionValue::as_uint), Some(3000));
        assert_eq!(store.get("neg").and_then(OptionValue::as_uint), None);
        assert_eq!(store.get("neg").and_then(OptionValue::as_int), Some(-1));
        assert_eq!(store.get("flag").and_then(OptionValue::as_bool), Some(false));
        assert_eq!(store.get_str("port"), None);
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_custom_value_released_on_replace_and_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut store = OptionStore::new();
        store.set("handle", OptionValue::custom(DropCounter(drops.clone())));
        assert!(store.get("handle").unwrap().downcast_ref::<DropCounter>().is_some());

        store.set("handle", OptionValue::custom(DropCounter(drops.clone())));
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(store);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_serialize_preserves_order() {
        let store = OptionStore::new().with("version", "3").with("active", "T");
        let json = serde_json::to_string(&store).unwrap();
        assert_eq!(json, r#"{"version":"3","active":"T"}"#);
    }

    #[test]
    fn test_remove() {
        let mut store = OptionStore::new().with("a", 1i64).with("b", 2i64);
        assert!(store.remove("a").is_some());
        assert!(!store.contains("a"));
        assert!(store.remove("missing").is_none());
    }
}
