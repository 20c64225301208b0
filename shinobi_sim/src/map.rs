// Ordered map with a tagged persisted form.
//
// Plain JSON objects can only have string keys and carry no marker telling
// the backfill merge to treat them as a unit. `TaggedMap` wraps a `BTreeMap`
// and persists as `{"@type": "Map", "value": [[key, value], ...]}` in key
// order, which round-trips any serde key type and merges atomically.

use crate::merge::TAG_KEY;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Tag value written into persisted map nodes.
pub const MAP_TAG: &str = "Map";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedMap<K: Ord, V>(pub BTreeMap<K, V>);

impl<K: Ord, V> TaggedMap<K, V> {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord, V> Default for TaggedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> std::ops::Deref for TaggedMap<K, V> {
    type Target = BTreeMap<K, V>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K: Ord, V> std::ops::DerefMut for TaggedMap<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K: Ord + Serialize, V: Serialize> Serialize for TaggedMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<(&K, &V)> = self.0.iter().collect();
        let mut node = serializer.serialize_struct("Map", 2)?;
        node.serialize_field(TAG_KEY, MAP_TAG)?;
        node.serialize_field("value", &entries)?;
        node.end()
    }
}

#[derive(Deserialize)]
struct MapRepr<K, V> {
    #[serde(rename = "@type")]
    tag: String,
    value: Vec<(K, V)>,
}

impl<'de, K, V> Deserialize<'de> for TaggedMap<K, V>
where
    K: Ord + Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = MapRepr::<K, V>::deserialize(deserializer)?;
        if repr.tag != MAP_TAG {
            return Err(D::Error::custom(format!(
                "expected @type {MAP_TAG:?}, found {:?}",
                repr.tag
            )));
        }
        let len = repr.value.len();
        let map: BTreeMap<K, V> = repr.value.into_iter().collect();
        if map.len() != len {
            return Err(D::Error::custom("map entries repeat a key"));
        }
        Ok(Self(map))
    }
}
