// Indexed Record: an ordered, unique-key, copy-on-write record container.
//
// `Ir<T>` pairs an ordered `Vec` of ids with an `FxHashMap` from id to
// record. The two halves are always a bijection: every id in `ids` has
// exactly one record, every record's key appears exactly once in `ids`, and
// each record's own `Keyed::id()` equals its key. Iteration order is
// insertion order (the `ids` vector), never hash order.
//
// Every mutating operation takes `&self` and returns a new `Ir`; the input is
// never touched. Game state holds IRs behind `Arc`, so a reducer that leaves
// a collection alone shares it with the previous snapshot and projections can
// detect "unchanged" by pointer.
//
// Persisted form: `{"@type": "IR", "ids": [...], "record": {id: value}}`.
// Decoding rejects any tree whose index and record disagree.
//
// See also: `merge.rs` for the deep merge behind `patch`, `map.rs` for the
// ordered tagged map, `state.rs` for the collections built on this type.

use crate::error::IrError;
use crate::merge::{TAG_KEY, deep_merge};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

/// Tag value written into persisted IR nodes.
pub const IR_TAG: &str = "IR";

/// A record that knows its own key.
pub trait Keyed {
    type Id: Copy + Eq + Hash + Ord + fmt::Debug + fmt::Display + Serialize + DeserializeOwned;

    /// Human-readable collection name for error messages.
    const KIND: &'static str;

    fn id(&self) -> Self::Id;
}

pub struct Ir<T: Keyed> {
    ids: Vec<T::Id>,
    record: FxHashMap<T::Id, T>,
}

impl<T: Keyed> Ir<T> {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            record: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: T::Id) -> bool {
        self.record.contains_key(&id)
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> &[T::Id] {
        &self.ids
    }

    pub fn get(&self, id: T::Id) -> Result<&T, IrError> {
        self.record.get(&id).ok_or_else(|| missing::<T>(id))
    }

    pub fn try_get(&self, id: T::Id) -> Option<&T> {
        self.record.get(&id)
    }

    /// Records in id order. Restartable: each call starts from the front.
    pub fn list(&self) -> impl Iterator<Item = &T> + '_ {
        self.ids.iter().filter_map(|id| self.record.get(id))
    }
}

impl<T: Keyed + Clone> Ir<T> {
    /// Build from items, failing on any repeated id.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Result<Self, IrError> {
        Self::new().add_many(items)
    }

    pub fn add(&self, item: T) -> Result<Self, IrError> {
        self.add_many(std::iter::once(item))
    }

    /// Append all `items`. Fails without applying anything if any id is
    /// already present or repeats within the batch.
    pub fn add_many(&self, items: impl IntoIterator<Item = T>) -> Result<Self, IrError> {
        let mut next = self.clone();
        for item in items {
            let id = item.id();
            if next.record.contains_key(&id) {
                return Err(IrError::DuplicateId {
                    kind: T::KIND,
                    id: id.to_string(),
                });
            }
            next.ids.push(id);
            next.record.insert(id, item);
        }
        Ok(next)
    }

    pub fn remove(&self, id: T::Id) -> Result<Self, IrError> {
        self.remove_many(&[id])
    }

    /// Remove every id in `ids`. Fails without applying anything if any of
    /// them is absent.
    pub fn remove_many(&self, ids: &[T::Id]) -> Result<Self, IrError> {
        if let Some(&absent) = ids.iter().find(|id| !self.record.contains_key(*id)) {
            return Err(missing::<T>(absent));
        }
        let doomed: FxHashSet<T::Id> = ids.iter().copied().collect();
        let mut next = self.clone();
        next.ids.retain(|id| !doomed.contains(id));
        next.record.retain(|id, _| !doomed.contains(id));
        Ok(next)
    }

    /// Replace the record at `id` with `f(old)`. The new record must keep
    /// the same id.
    pub fn update(&self, id: T::Id, f: impl FnOnce(&T) -> T) -> Result<Self, IrError> {
        let new_value = f(self.get(id)?);
        let new_id = new_value.id();
        if new_id != id {
            return Err(IrError::KeyChanged {
                kind: T::KIND,
                id: id.to_string(),
                new_id: new_id.to_string(),
            });
        }
        let mut next = self.clone();
        next.record.insert(id, new_value);
        Ok(next)
    }

    /// Overwrite an existing record with `item`.
    pub fn replace(&self, item: T) -> Result<Self, IrError> {
        self.update(item.id(), |_| item)
    }

    /// New IR with the records matching `pred`, in their original order.
    pub fn filter(&self, mut pred: impl FnMut(&T) -> bool) -> Self {
        let mut next = Self::new();
        for id in &self.ids {
            if let Some(item) = self.record.get(id).filter(|item| pred(*item)) {
                next.ids.push(*id);
                next.record.insert(*id, item.clone());
            }
        }
        next
    }

    /// New IR holding exactly `ids`, in the given order.
    pub fn subset(&self, ids: &[T::Id]) -> Result<Self, IrError> {
        let items = ids
            .iter()
            .map(|id| self.get(*id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_items(items)
    }
}

impl<T: Keyed + Clone + Serialize + DeserializeOwned> Ir<T> {
    /// Partial update: deep-merge `patch` into the record's JSON form.
    pub fn patch(&self, id: T::Id, patch: serde_json::Value) -> Result<Self, IrError> {
        let current = self.get(id)?;
        let patch_error = |source| IrError::Patch {
            kind: T::KIND,
            id: id.to_string(),
            source,
        };
        let base = serde_json::to_value(current).map_err(patch_error)?;
        let merged: T = serde_json::from_value(deep_merge(base, patch)).map_err(patch_error)?;
        self.replace(merged)
    }
}

fn missing<T: Keyed>(id: T::Id) -> IrError {
    IrError::MissingId {
        kind: T::KIND,
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

impl<T: Keyed> Default for Ir<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed + Clone> Clone for Ir<T> {
    fn clone(&self) -> Self {
        Self {
            ids: self.ids.clone(),
            record: self.record.clone(),
        }
    }
}

impl<T: Keyed + PartialEq> PartialEq for Ir<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
            && self
                .ids
                .iter()
                .all(|id| self.record.get(id) == other.record.get(id))
    }
}

impl<T: Keyed + fmt::Debug> fmt::Debug for Ir<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.list()).finish()
    }
}

impl<T: Keyed + Serialize> Serialize for Ir<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut node = serializer.serialize_struct("IR", 3)?;
        node.serialize_field(TAG_KEY, IR_TAG)?;
        node.serialize_field("ids", &self.ids)?;
        node.serialize_field("record", &OrderedRecord(self))?;
        node.end()
    }
}

/// The record half, written in id order.
struct OrderedRecord<'a, T: Keyed>(&'a Ir<T>);

impl<T: Keyed + Serialize> Serialize for OrderedRecord<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ir = self.0;
        serializer.collect_map(
            ir.ids
                .iter()
                .filter_map(|id| ir.record.get(id).map(|value| (id, value))),
        )
    }
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "K: Deserialize<'de> + Ord, V: Deserialize<'de>"))]
struct IrRepr<K, V> {
    #[serde(rename = "@type")]
    tag: String,
    ids: Vec<K>,
    record: BTreeMap<K, V>,
}

impl<'de, T: Keyed + DeserializeOwned> Deserialize<'de> for Ir<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = IrRepr::<T::Id, T>::deserialize(deserializer)?;
        if repr.tag != IR_TAG {
            return Err(D::Error::custom(format!(
                "expected @type {IR_TAG:?}, found {:?}",
                repr.tag
            )));
        }
        if repr.ids.len() != repr.record.len() {
            return Err(D::Error::custom(format!(
                "{} index lists {} ids but record holds {} entries",
                T::KIND,
                repr.ids.len(),
                repr.record.len()
            )));
        }
        let mut record = repr.record;
        let mut ir = Ir::new();
        for id in repr.ids {
            let value = record.remove(&id).ok_or_else(|| {
                D::Error::custom(format!("{} id {id} is indexed twice or has no record", T::KIND))
            })?;
            if value.id() != id {
                return Err(D::Error::custom(format!(
                    "{} record keyed {id} carries id {}",
                    T::KIND,
                    value.id()
                )));
            }
            ir.ids.push(id);
            ir.record.insert(id, value);
        }
        Ok(ir)
    }
}
