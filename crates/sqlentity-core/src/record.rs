//! Insertion-ordered field maps.
//!
//! Entities hold a handful of fields, so a vector with linear lookup keeps
//! both the insertion order (which drives output key order) and the
//! per-field cost small.

use crate::value::Value;

/// An insertion-ordered `name -> value` map.
///
/// With the default parameter this is the shape of a storage row: the input
/// to entity construction, the payload of inserts and updates, and the
/// origin snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<V = Value> {
    entries: Vec<(String, V)>,
}

impl<V> Record<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Insert or replace `name`. A replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        let name = name.into();
        if let Some(slot) = self.get_mut(&name) {
            return Some(std::mem::replace(slot, value));
        }
        self.entries.push((name, value));
        None
    }

    pub fn remove(&mut self, name: &str) -> Option<V> {
        let idx = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &V) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut V)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }
}

impl<V> Default for Record<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IntoIterator for Record<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for Record<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Build a [`Record`] from `name => value` pairs; values go through `Into`.
///
/// ```
/// use sqlentity_core::{record, Value};
///
/// let row = record! { "id" => 1_i64, "name" => "Ann" };
/// assert_eq!(row.get("name"), Some(&Value::from("Ann")));
/// ```
#[macro_export]
macro_rules! record {
    () => { <$crate::Record>::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut record: $crate::Record = $crate::Record::new();
        $( record.insert($name, ::core::convert::Into::into($value)); )+
        record
    }};
}
