//! Subscription: `a[k]`, slice syntax, and the legacy two-bound slice
//! protocol.
//!
//! Slice expressions materialize a slice object and go through
//! `__getitem__`, except that a no-step slice with plain integer (or
//! absent) bounds consults the legacy `__getslice__`/`__setslice__`/
//! `__delslice__` family first when the type defines it, with missing
//! bounds defaulting to `0` and the maximum machine integer.

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    intern::StaticStrings,
    resource::ResourceTracker,
    runtime::Runtime,
    types::{Slice, Str},
    value::Value,
};

impl<T: ResourceTracker> Runtime<T> {
    /// `a[k]`.
    pub fn getitem(&mut self, obj: Value, key: Value) -> RunResult<Value> {
        if let Some(result) = self.native_getitem(&obj, &key)? {
            return Ok(result);
        }
        if let Some(result) = self.call_type_dunder(obj, StaticStrings::DunderGetitem, ArgValues::One(key))? {
            return Ok(result);
        }
        let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::not_subscriptable(type_name))
    }

    /// `a[k] = v`.
    pub fn setitem(&mut self, obj: Value, key: Value, value: Value) -> RunResult<()> {
        if let Value::Ref(id) = obj {
            enum Kind {
                List,
                Dict,
                Other,
            }
            let kind = match self.heap.get(id) {
                HeapData::List(_) => Kind::List,
                HeapData::Dict(_) => Kind::Dict,
                _ => Kind::Other,
            };
            match kind {
                Kind::List => {
                    let index = self.sequence_index(&key, id, "list assignment")?;
                    match self.heap.get_mut(id) {
                        HeapData::List(list) => list.as_vec_mut()[index] = value,
                        _ => unreachable!("kind checked above"),
                    }
                    return Ok(());
                }
                Kind::Dict => {
                    return self.heap.with_entry_mut(id, |heap, data| match data {
                        HeapData::Dict(dict) => {
                            dict.set(key, value, heap, &self.interns)?;
                            Ok(())
                        }
                        _ => unreachable!("kind checked above"),
                    });
                }
                Kind::Other => {}
            }
        }
        if self
            .call_type_dunder(obj, StaticStrings::DunderSetitem, ArgValues::Two(key, value))?
            .is_some()
        {
            return Ok(());
        }
        let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::type_error(format!(
            "'{type_name}' object does not support item assignment"
        )))
    }

    /// `del a[k]`.
    pub fn delitem(&mut self, obj: Value, key: Value) -> RunResult<()> {
        if let Value::Ref(id) = obj {
            enum Kind {
                List,
                Dict,
                Other,
            }
            let kind = match self.heap.get(id) {
                HeapData::List(_) => Kind::List,
                HeapData::Dict(_) => Kind::Dict,
                _ => Kind::Other,
            };
            match kind {
                Kind::List => {
                    let index = self.sequence_index(&key, id, "list assignment")?;
                    match self.heap.get_mut(id) {
                        HeapData::List(list) => {
                            list.as_vec_mut().remove(index);
                        }
                        _ => unreachable!("kind checked above"),
                    }
                    return Ok(());
                }
                Kind::Dict => {
                    let removed = self.heap.with_entry_mut(id, |heap, data| match data {
                        HeapData::Dict(dict) => dict.remove(&key, heap, &self.interns),
                        _ => unreachable!("kind checked above"),
                    })?;
                    if removed.is_some() {
                        return Ok(());
                    }
                    let key_repr = self.py_repr(key)?;
                    return Err(ExcType::key_error(key_repr));
                }
                Kind::Other => {}
            }
        }
        if self
            .call_type_dunder(obj, StaticStrings::DunderDelitem, ArgValues::One(key))?
            .is_some()
        {
            return Ok(());
        }
        let type_name = obj.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::type_error(format!(
            "'{type_name}' object doesn't support item deletion"
        )))
    }

    /// `a[i:j]` / `a[i:j:k]`.
    ///
    /// Bounds are values (`None` for absent). The legacy `__getslice__` is
    /// consulted for the no-step form with plain integer bounds.
    pub fn subscript_slice(&mut self, obj: Value, lower: Value, upper: Value, step: Value) -> RunResult<Value> {
        if step.is_none() && plain_bound(&lower) && plain_bound(&upper) {
            let class_id = self.class_id_of(&obj)?;
            if self.dunder_origin(class_id, StaticStrings::DunderGetslice)?.is_some() {
                let (i, j) = legacy_bounds(&lower, &upper);
                if let Some(result) =
                    self.call_type_dunder(obj, StaticStrings::DunderGetslice, ArgValues::Two(Value::Int(i), Value::Int(j)))?
                {
                    return Ok(result);
                }
            }
        }
        let slice_id = self.heap.allocate(HeapData::Slice(Slice::new(lower, upper, step)))?;
        self.getitem(obj, Value::Ref(slice_id))
    }

    /// `a[i:j] = v`, with the legacy `__setslice__` fast path.
    pub fn store_slice(&mut self, obj: Value, lower: Value, upper: Value, step: Value, value: Value) -> RunResult<()> {
        if step.is_none() && plain_bound(&lower) && plain_bound(&upper) {
            let class_id = self.class_id_of(&obj)?;
            if self.dunder_origin(class_id, StaticStrings::DunderSetslice)?.is_some() {
                let (i, j) = legacy_bounds(&lower, &upper);
                let args = ArgValues::new(vec![Value::Int(i), Value::Int(j), value], crate::args::KwargsValues::Empty);
                if self.call_type_dunder(obj, StaticStrings::DunderSetslice, args)?.is_some() {
                    return Ok(());
                }
            }
        }
        let slice_id = self.heap.allocate(HeapData::Slice(Slice::new(lower, upper, step)))?;
        self.setitem(obj, Value::Ref(slice_id), value)
    }

    /// `del a[i:j]`, with the legacy `__delslice__` fast path.
    pub fn delete_slice(&mut self, obj: Value, lower: Value, upper: Value, step: Value) -> RunResult<()> {
        if step.is_none() && plain_bound(&lower) && plain_bound(&upper) {
            let class_id = self.class_id_of(&obj)?;
            if self.dunder_origin(class_id, StaticStrings::DunderDelslice)?.is_some() {
                let (i, j) = legacy_bounds(&lower, &upper);
                if self
                    .call_type_dunder(obj, StaticStrings::DunderDelslice, ArgValues::Two(Value::Int(i), Value::Int(j)))?
                    .is_some()
                {
                    return Ok(());
                }
            }
        }
        let slice_id = self.heap.allocate(HeapData::Slice(Slice::new(lower, upper, step)))?;
        self.delitem(obj, Value::Ref(slice_id))
    }

    // ------------------------------------------------------------------
    // native paths
    // ------------------------------------------------------------------

    fn native_getitem(&mut self, obj: &Value, key: &Value) -> RunResult<Option<Value>> {
        // interned strings subscript like heap strings
        if let Some(s) = obj.as_str(&self.heap, &self.interns).map(str::to_owned) {
            return self.str_getitem(&s, key).map(Some);
        }
        let Value::Ref(id) = obj else { return Ok(None) };
        enum Kind {
            List,
            Tuple,
            Dict,
            MappingProxy(HeapId),
            Other,
        }
        let kind = match self.heap.get(*id) {
            HeapData::List(_) => Kind::List,
            HeapData::Tuple(_) => Kind::Tuple,
            HeapData::Dict(_) => Kind::Dict,
            HeapData::MappingProxy(mp) => Kind::MappingProxy(mp.class_id()),
            _ => Kind::Other,
        };
        match kind {
            Kind::List | Kind::Tuple => {
                let error_label = if matches!(kind, Kind::List) { "list" } else { "tuple" };
                if let Some(slice) = self.slice_of(key) {
                    let items = self.sequence_slice(*id, &slice)?;
                    let value = if matches!(kind, Kind::List) {
                        self.alloc_list(items)?
                    } else {
                        self.alloc_tuple(items)?
                    };
                    return Ok(Some(value));
                }
                let index = self.sequence_index(key, *id, error_label)?;
                let value = match self.heap.get(*id) {
                    HeapData::List(l) => l.as_vec()[index],
                    HeapData::Tuple(t) => t.as_vec()[index],
                    _ => unreachable!("kind checked above"),
                };
                Ok(Some(value))
            }
            Kind::Dict => {
                let found = match self.heap.get(*id) {
                    HeapData::Dict(dict) => dict.get(key, &self.heap, &self.interns)?,
                    _ => None,
                };
                match found {
                    Some(v) => Ok(Some(v)),
                    None => {
                        let key_repr = self.py_repr(*key)?;
                        Err(ExcType::key_error(key_repr))
                    }
                }
            }
            Kind::MappingProxy(class_id) => {
                let name = key
                    .as_str(&self.heap, &self.interns)
                    .map(str::to_owned)
                    .ok_or_else(|| ExcType::type_error("mappingproxy keys are strings"))?;
                let found = match self.heap.get(class_id) {
                    HeapData::ClassObject(cls) => cls.namespace().get_by_str(&name, &self.heap, &self.interns),
                    _ => None,
                };
                match found {
                    Some(v) => Ok(Some(v)),
                    None => Err(ExcType::key_error(format!("'{name}'"))),
                }
            }
            Kind::Other => Ok(None),
        }
    }

    fn str_getitem(&mut self, s: &str, key: &Value) -> RunResult<Value> {
        if let Some(slice) = self.slice_of(key) {
            let chars: Vec<char> = s.chars().collect();
            let Some((start, stop, step)) = slice.indices(chars.len()) else {
                return Err(ExcType::value_error("slice step cannot be zero"));
            };
            let mut out = String::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                if let Ok(idx) = usize::try_from(i)
                    && let Some(&c) = chars.get(idx)
                {
                    out.push(c);
                }
                i += step;
            }
            let id = self.heap.allocate(HeapData::Str(Str::new(out)))?;
            return Ok(Value::Ref(id));
        }
        let Value::Int(raw) = key else {
            let type_name = key.type_name(&self.heap, &self.interns).into_owned();
            return Err(ExcType::type_error(format!(
                "string indices must be integers, not '{type_name}'"
            )));
        };
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len() as i64;
        let index = if *raw < 0 { raw + len } else { *raw };
        if index < 0 || index >= len {
            return Err(ExcType::index_error("string index out of range"));
        }
        let id = self
            .heap
            .allocate(HeapData::Str(Str::new(chars[index as usize].to_string())))?;
        Ok(Value::Ref(id))
    }

    fn slice_of(&self, key: &Value) -> Option<Slice> {
        if let Value::Ref(id) = key
            && let HeapData::Slice(slice) = self.heap.get(*id)
        {
            return Some(*slice);
        }
        None
    }

    fn sequence_slice(&mut self, seq_id: HeapId, slice: &Slice) -> RunResult<Vec<Value>> {
        let items: Vec<Value> = match self.heap.get(seq_id) {
            HeapData::List(l) => l.as_vec().to_vec(),
            HeapData::Tuple(t) => t.as_vec().to_vec(),
            _ => Vec::new(),
        };
        let Some((start, stop, step)) = slice.indices(items.len()) else {
            return Err(ExcType::value_error("slice step cannot be zero"));
        };
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            if let Ok(idx) = usize::try_from(i)
                && let Some(&v) = items.get(idx)
            {
                out.push(v);
            }
            i += step;
        }
        Ok(out)
    }

    /// Normalizes an integer index against a sequence, raising
    /// `IndexError` out of range and `TypeError` for non-integers.
    fn sequence_index(&self, key: &Value, seq_id: HeapId, label: &str) -> RunResult<usize> {
        let raw = match key {
            Value::Int(i) => *i,
            Value::Bool(b) => i64::from(*b),
            _ => {
                let type_name = key.type_name(&self.heap, &self.interns).into_owned();
                return Err(ExcType::type_error(format!(
                    "{label} indices must be integers, not '{type_name}'"
                )));
            }
        };
        let len = match self.heap.get(seq_id) {
            HeapData::List(l) => l.len(),
            HeapData::Tuple(t) => t.len(),
            _ => 0,
        } as i64;
        let index = if raw < 0 { raw + len } else { raw };
        if index < 0 || index >= len {
            return Err(ExcType::index_error(format!("{label} index out of range")));
        }
        Ok(index as usize)
    }
}

fn plain_bound(v: &Value) -> bool {
    matches!(v, Value::None | Value::Int(_))
}

fn legacy_bounds(lower: &Value, upper: &Value) -> (i64, i64) {
    let i = match lower {
        Value::Int(i) => *i,
        _ => 0,
    };
    let j = match upper {
        Value::Int(j) => *j,
        _ => i64::MAX,
    };
    (i, j)
}
