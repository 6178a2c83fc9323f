//! Python dict: the slot storage behind class namespaces, instance dicts
//! and module scopes.
//!
//! # Storage strategy
//!
//! A `HashTable<usize>` maps key hashes to indices in a dense `Vec` of
//! entries, giving O(1) lookup while preserving first-insertion order for
//! iteration (re-assignment does not reorder). Interned-string keys compare
//! by id before falling back to content comparison.
//!
//! # Keys
//!
//! Builtin immutable values hash and compare structurally, with the
//! cross-type numeric agreement guaranteed by `py_hash` (`1`, `1.0` and
//! `True` are one key). Mutable builtins (list, dict) are unhashable.
//! User instances key by identity here; `Runtime::py_hash` is the place
//! where a user `__hash__` participates.
//!
//! # Iteration guard
//!
//! A version counter bumps whenever the dict changes size. Cursors capture
//! the version and raise `RuntimeError` when they observe a stale one.

use hashbrown::HashTable;
use serde::ser::SerializeSeq;
use smallvec::SmallVec;

use crate::{
    exception_private::{ExcType, RunResult},
    heap::{Heap, HeapData},
    intern::{Interns, StringId},
    py_hash,
    resource::ResourceTracker,
    value::Value,
};

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
struct DictEntry {
    key: Value,
    value: Value,
    /// Cached key hash, required for relocation on table growth.
    hash: u64,
}

/// Insertion-ordered mapping from Python values to Python values.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dict {
    /// Maps entry hashes to indices into `entries`.
    indices: HashTable<usize>,
    /// Dense entry storage in insertion order.
    entries: Vec<DictEntry>,
    /// Bumped on every size change; guards iteration.
    version: u64,
}

impl Dict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: HashTable::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
            version: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current size-change version, captured by cursors.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Hashes a dict key.
    ///
    /// Unhashable builtin payloads (list, dict, slice) raise `TypeError`.
    pub fn key_hash(key: &Value, heap: &Heap<impl ResourceTracker>, interns: &Interns) -> RunResult<u64> {
        // tag constants keep unit variants from colliding with small ints
        const NONE_TAG: i64 = 0x6e6f_6e65;
        const ELLIPSIS_TAG: i64 = 0x656c_6c69;
        const NOT_IMPLEMENTED_TAG: i64 = 0x6e6f_7469;

        let signed = match key {
            Value::Undefined => return Err(ExcType::type_error("cannot hash undefined value")),
            Value::None => py_hash::hash_int(NONE_TAG),
            Value::Ellipsis => py_hash::hash_int(ELLIPSIS_TAG),
            Value::NotImplemented => py_hash::hash_int(NOT_IMPLEMENTED_TAG),
            Value::Bool(b) => py_hash::hash_int(i64::from(*b)),
            Value::Int(i) => py_hash::hash_int(*i),
            Value::Float(f) => py_hash::hash_float(*f),
            Value::InternString(id) => py_hash::hash_str(interns.get_str(*id)),
            Value::Builtin(b) => py_hash::hash_str(b.name()),
            Value::DefFunction(id) => py_hash::hash_int(id.index() as i64) ^ 0x11,
            Value::HostFunction(id) => py_hash::hash_int(id.index() as i64) ^ 0x22,
            Value::Proxy(id) => py_hash::hash_int(i64::from(id.raw())) ^ 0x33,
            Value::Ref(id) => match heap.get(*id) {
                HeapData::Str(s) => py_hash::hash_str(s.as_str()),
                HeapData::Bytes(b) => py_hash::hash_bytes(b.as_slice()),
                HeapData::LongInt(li) => li.py_hash(),
                HeapData::Tuple(tuple) => {
                    let mut lanes: SmallVec<[i64; 8]> = SmallVec::with_capacity(tuple.len());
                    for item in tuple.as_vec() {
                        lanes.push(Self::key_hash(item, heap, interns)? as i64);
                    }
                    py_hash::hash_tuple_lanes(lanes.into_iter())
                }
                HeapData::List(_) => return Err(ExcType::unhashable("list")),
                HeapData::Dict(_) => return Err(ExcType::unhashable("dict")),
                HeapData::Slice(_) => return Err(ExcType::unhashable("slice")),
                // everything else keys by identity
                _ => py_hash::hash_int(id.index() as i64) ^ 0x44,
            },
        };
        Ok(signed as u64)
    }

    /// Structural equality for dict keys, called only after hashes agree.
    pub(crate) fn keys_eq(a: &Value, b: &Value, heap: &Heap<impl ResourceTracker>, interns: &Interns) -> bool {
        if a.is_same(b) {
            return true;
        }
        match (a, b) {
            (Value::Bool(x), Value::Int(y)) | (Value::Int(y), Value::Bool(x)) => i64::from(*x) == *y,
            (Value::Bool(x), Value::Float(y)) | (Value::Float(y), Value::Bool(x)) => {
                f64::from(i8::from(*x)) == *y
            }
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Int(x), Value::Ref(id)) | (Value::Ref(id), Value::Int(x)) => match heap.get(*id) {
                HeapData::LongInt(li) => li.inner() == &num_bigint::BigInt::from(*x),
                _ => false,
            },
            (Value::InternString(sid), Value::Ref(id)) | (Value::Ref(id), Value::InternString(sid)) => {
                match heap.get(*id) {
                    HeapData::Str(s) => s.as_str() == interns.get_str(*sid),
                    _ => false,
                }
            }
            (Value::Ref(x), Value::Ref(y)) => match (heap.get(*x), heap.get(*y)) {
                (HeapData::Str(s1), HeapData::Str(s2)) => s1.as_str() == s2.as_str(),
                (HeapData::Bytes(b1), HeapData::Bytes(b2)) => b1.as_slice() == b2.as_slice(),
                (HeapData::LongInt(l1), HeapData::LongInt(l2)) => l1.inner() == l2.inner(),
                (HeapData::Tuple(t1), HeapData::Tuple(t2)) => {
                    t1.len() == t2.len()
                        && t1
                            .as_vec()
                            .iter()
                            .zip(t2.as_vec())
                            .all(|(u, v)| Self::keys_eq(u, v, heap, interns))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Returns the string content of a key, if it is a string.
    fn key_as_str<'a>(key: &Value, heap: &'a Heap<impl ResourceTracker>, interns: &'a Interns) -> Option<&'a str> {
        match key {
            Value::InternString(id) => Some(interns.get_str(*id)),
            Value::Ref(id) => match heap.get(*id) {
                HeapData::Str(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    fn find_index(
        &self,
        key: &Value,
        hash: u64,
        heap: &Heap<impl ResourceTracker>,
        interns: &Interns,
    ) -> Option<usize> {
        self.indices
            .find(hash, |&i| {
                self.entries[i].hash == hash && Self::keys_eq(&self.entries[i].key, key, heap, interns)
            })
            .copied()
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &Value, heap: &Heap<impl ResourceTracker>, interns: &Interns) -> RunResult<Option<Value>> {
        let hash = Self::key_hash(key, heap, interns)?;
        Ok(self.find_index(key, hash, heap, interns).map(|i| self.entries[i].value))
    }

    /// Fast-path lookup by string content.
    pub fn get_by_str(&self, name: &str, heap: &Heap<impl ResourceTracker>, interns: &Interns) -> Option<Value> {
        let hash = py_hash::hash_str(name) as u64;
        self.indices
            .find(hash, |&i| {
                self.entries[i].hash == hash
                    && Self::key_as_str(&self.entries[i].key, heap, interns) == Some(name)
            })
            .map(|&i| self.entries[i].value)
    }

    /// Inserts or replaces an entry. Returns the previous value if the key
    /// was present. Re-assignment keeps the original insertion position.
    pub fn set(
        &mut self,
        key: Value,
        value: Value,
        heap: &Heap<impl ResourceTracker>,
        interns: &Interns,
    ) -> RunResult<Option<Value>> {
        let hash = Self::key_hash(&key, heap, interns)?;
        if let Some(i) = self.find_index(&key, hash, heap, interns) {
            let old = self.entries[i].value;
            self.entries[i].value = value;
            return Ok(Some(old));
        }
        let index = self.entries.len();
        self.entries.push(DictEntry { key, value, hash });
        self.indices
            .insert_unique(hash, index, |&i| self.entries[i].hash);
        self.version += 1;
        Ok(None)
    }

    /// Inserts with an interned-string key, touching no heap state.
    ///
    /// Usable while the heap is mutably borrowed (wrapper-class seeding,
    /// class publication); callers only mix it with other interned-key
    /// inserts, so content comparison via the interner is complete.
    pub fn insert_id(&mut self, id: StringId, value: Value, interns: &Interns) -> Option<Value> {
        let name = interns.get_str(id);
        let hash = py_hash::hash_str(name) as u64;
        let found = self
            .indices
            .find(hash, |&i| {
                self.entries[i].hash == hash
                    && match &self.entries[i].key {
                        Value::InternString(existing) => *existing == id || interns.get_str(*existing) == name,
                        _ => false,
                    }
            })
            .copied();
        if let Some(i) = found {
            let old = self.entries[i].value;
            self.entries[i].value = value;
            return Some(old);
        }
        let index = self.entries.len();
        self.entries.push(DictEntry {
            key: Value::InternString(id),
            value,
            hash,
        });
        self.indices
            .insert_unique(hash, index, |&i| self.entries[i].hash);
        self.version += 1;
        None
    }

    /// Removes an entry, returning its value or `None` if absent.
    pub fn remove(
        &mut self,
        key: &Value,
        heap: &Heap<impl ResourceTracker>,
        interns: &Interns,
    ) -> RunResult<Option<Value>> {
        let hash = Self::key_hash(key, heap, interns)?;
        let Some(index) = self.find_index(key, hash, heap, interns) else {
            return Ok(None);
        };
        Ok(Some(self.remove_at(index, hash)))
    }

    /// Removes an entry by string key.
    pub fn remove_by_str(&mut self, name: &str, heap: &Heap<impl ResourceTracker>, interns: &Interns) -> Option<Value> {
        let hash = py_hash::hash_str(name) as u64;
        let index = self
            .indices
            .find(hash, |&i| {
                self.entries[i].hash == hash
                    && Self::key_as_str(&self.entries[i].key, heap, interns) == Some(name)
            })
            .copied()?;
        Some(self.remove_at(index, hash))
    }

    fn remove_at(&mut self, index: usize, hash: u64) -> Value {
        if let Ok(entry) = self.indices.find_entry(hash, |&i| i == index) {
            entry.remove();
        }
        let removed = self.entries.remove(index);
        // the dense vec shifted; rewrite every index past the hole
        for slot in self.indices.iter_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        self.version += 1;
        removed.value
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|e| (&e.key, &e.value))
    }

    /// Snapshot of all entries, for callers that mutate while walking.
    #[must_use]
    pub fn entries_vec(&self) -> Vec<(Value, Value)> {
        self.entries.iter().map(|e| (e.key, e.value)).collect()
    }

    /// Entry at a dense index, if still in range.
    #[must_use]
    pub fn entry_at(&self, index: usize) -> Option<(Value, Value)> {
        self.entries.get(index).map(|e| (e.key, e.value))
    }

    /// Creates a dict from owned pairs. Later duplicates overwrite earlier
    /// ones, as in a dict display.
    pub fn from_pairs(
        pairs: Vec<(Value, Value)>,
        heap: &Heap<impl ResourceTracker>,
        interns: &Interns,
    ) -> RunResult<Self> {
        let mut dict = Self::with_capacity(pairs.len());
        for (key, value) in pairs {
            dict.set(key, value, heap, interns)?;
        }
        Ok(dict)
    }

    /// Shallow copy.
    #[must_use]
    pub fn copied(&self) -> Self {
        let mut clone = Self::with_capacity(self.len());
        for entry in &self.entries {
            let index = clone.entries.len();
            clone.entries.push(*entry);
            clone
                .indices
                .insert_unique(entry.hash, index, |&i| clone.entries[i].hash);
        }
        clone
    }
}

/// Stateful cursor that detects size changes between steps.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DictCursor {
    index: usize,
    version: u64,
}

impl DictCursor {
    #[must_use]
    pub fn new(dict: &Dict) -> Self {
        Self {
            index: 0,
            version: dict.version(),
        }
    }

    /// Advances the cursor, raising `RuntimeError` if the dict changed size
    /// since the cursor was created.
    pub fn next(&mut self, dict: &Dict) -> RunResult<Option<(Value, Value)>> {
        if dict.version() != self.version {
            return Err(ExcType::runtime_error("dictionary changed size during iteration"));
        }
        let entry = dict.entry_at(self.index);
        if entry.is_some() {
            self.index += 1;
        }
        Ok(entry)
    }
}

impl serde::Serialize for Dict {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for entry in &self.entries {
            seq.serialize_element(entry)?;
        }
        seq.end()
    }
}

impl<'de> serde::Deserialize<'de> for Dict {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<DictEntry>::deserialize(deserializer)?;
        let mut dict = Self::with_capacity(entries.len());
        for entry in entries {
            let index = dict.entries.len();
            dict.entries.push(entry);
            dict.indices
                .insert_unique(entry.hash, index, |&i| dict.entries[i].hash);
        }
        Ok(dict)
    }
}
