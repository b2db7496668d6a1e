use std::collections::HashMap;
use std::hash::Hash as StdHash;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A map that preserves insertion order, used anywhere rendering must be
/// deterministic: `CREATE TABLE` column lists, `UPDATE ... SET` pairs.
///
/// Backed by a vector of pairs plus a sidecar index for O(1) lookup; a plain
/// `HashMap` would silently drop the order the SQL renderer depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedMap<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
}

impl<K, V> OrderedMap<K, V>
where
    K: StdHash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Inserts or replaces a value in-place, keeping its original position
    /// on replace and appending on first insert.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&pos) = self.index.get(&key) {
            let old = std::mem::replace(&mut self.entries[pos].1, value);
            Some(old)
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
            None
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Returns `true` if any key appears more than once among `keys` — used
    /// by `INSERT`'s column-list duplicate check.
    pub fn has_duplicates<'a>(keys: impl IntoIterator<Item = &'a K>) -> bool
    where
        K: 'a,
    {
        let mut seen = std::collections::HashSet::new();
        for k in keys {
            if !seen.insert(k) {
                return true;
            }
        }
        false
    }
}

impl<K, V> FromIterator<(K, V)> for OrderedMap<K, V>
where
    K: StdHash + Eq + Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<K, V> IntoIterator for OrderedMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Serializes as a JSON object in insertion order. Note that the canonical
/// transaction-signing serialization (catena-tx) re-derives a
/// `serde_json::Value` from the signed payload afterwards, which sorts
/// object keys regardless of the order emitted here — insertion order only
/// matters for human-facing/backend-rendering call sites.
impl<K, V> Serialize for OrderedMap<K, V>
where
    K: Serialize + StdHash + Eq,
    V: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, K, V> Deserialize<'de> for OrderedMap<K, V>
where
    K: Deserialize<'de> + StdHash + Eq + Clone,
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for OrderedMapVisitor<K, V>
        where
            K: Deserialize<'de> + StdHash + Eq + Clone,
            V: Deserialize<'de>,
        {
            type Value = OrderedMap<K, V>;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = OrderedMap::new();
                while let Some((k, v)) = access.next_entry()? {
                    out.insert(k, v);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

#[cfg(test)]
mod serde_tests {
    use super::*;

    #[test]
    fn serializes_as_json_object_in_insertion_order() {
        let mut m: OrderedMap<String, i32> = OrderedMap::new();
        m.insert("z".to_string(), 1);
        m.insert("a".to_string(), 2);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn deserializes_preserving_source_order() {
        let m: OrderedMap<String, i32> = serde_json::from_str(r#"{"z":1,"a":2}"#).unwrap();
        let keys: Vec<_> = m.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}
