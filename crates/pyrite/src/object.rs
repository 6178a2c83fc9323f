//! Host-facing value snapshots.
//!
//! [`Object`] is the owned, heap-independent form of a runtime value: the
//! type hosts use to feed inputs in and read results out. Conversion from
//! [`Value`] is cycle-safe; conversion back allocates as needed.

use std::fmt::{self, Write};

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    builtins::Builtins,
    exception_private::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    resource::ResourceTracker,
    runtime::Runtime,
    types::{
        LongInt, Type,
        bytes::bytes_repr_fmt,
        str::string_repr_fmt,
    },
    value::{Value, float_repr},
};

/// An owned snapshot of a runtime value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Object {
    /// The `None` singleton.
    None,
    /// The `Ellipsis` singleton.
    Ellipsis,
    Bool(bool),
    Int(i64),
    /// An integer beyond the `i64` range.
    BigInt(BigInt),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Self>),
    Tuple(Vec<Self>),
    /// Insertion-ordered pairs.
    Dict(Vec<(Self, Self)>),
    /// An exception value: type plus optional message.
    Exception {
        exc_type: ExcType,
        arg: Option<String>,
    },
    /// A builtin type value, by name.
    Type(String),
    /// Fallback: the repr of a value with no structural mapping.
    Repr(String),
}

impl Object {
    /// Whether the value is truthy under the standard rules.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Ellipsis => true,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::BigInt(b) => !num_traits::Zero::is_zero(b),
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::List(items) | Self::Tuple(items) => !items.is_empty(),
            Self::Dict(pairs) => !pairs.is_empty(),
            Self::Exception { .. } | Self::Type(_) | Self::Repr(_) => true,
        }
    }

    /// The repr string of the snapshot.
    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut out = String::new();
        self.repr_fmt(&mut out).expect("string formatting cannot fail");
        out
    }

    fn repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Ellipsis => f.write_str("Ellipsis"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::BigInt(b) => write!(f, "{b}L"),
            Self::Float(v) => f.write_str(&float_repr(*v)),
            Self::String(s) => string_repr_fmt(s, f),
            Self::Bytes(b) => bytes_repr_fmt(b, f),
            Self::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.repr_fmt(f)?;
                }
                f.write_char(']')
            }
            Self::Tuple(items) => {
                f.write_char('(')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.repr_fmt(f)?;
                }
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Self::Dict(pairs) => {
                f.write_char('{')?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    k.repr_fmt(f)?;
                    f.write_str(": ")?;
                    v.repr_fmt(f)?;
                }
                f.write_char('}')
            }
            Self::Exception { exc_type, arg } => {
                let name: &'static str = (*exc_type).into();
                write!(f, "{name}(")?;
                if let Some(arg) = arg {
                    string_repr_fmt(arg, f)?;
                }
                f.write_char(')')
            }
            Self::Type(name) => write!(f, "<type '{name}'>"),
            Self::Repr(s) => f.write_str(s),
        }
    }

    /// The natural JSON form: `None` → `null`, containers map directly,
    /// non-JSON shapes are tagged objects.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::{Value as JV, json};
        match self {
            Self::None => JV::Null,
            Self::Ellipsis => json!({"$ellipsis": true}),
            Self::Bool(b) => JV::Bool(*b),
            Self::Int(i) => json!(i),
            Self::BigInt(b) => json!({"$bigint": b.to_string()}),
            Self::Float(v) => {
                if v.is_nan() || v.is_infinite() {
                    JV::Null
                } else {
                    json!(v)
                }
            }
            Self::String(s) => JV::String(s.clone()),
            Self::Bytes(b) => json!({"$bytes": b}),
            Self::List(items) => JV::Array(items.iter().map(Self::to_json_value).collect()),
            Self::Tuple(items) => json!({"$tuple": items.iter().map(Self::to_json_value).collect::<Vec<_>>()}),
            Self::Dict(pairs) => {
                let map: serde_json::Map<String, JV> = pairs
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Self::String(s) => s.clone(),
                            other => other.py_repr(),
                        };
                        (key, v.to_json_value())
                    })
                    .collect();
                JV::Object(map)
            }
            Self::Exception { exc_type, arg } => {
                json!({"$exception": {"type": exc_type.to_string(), "message": arg}})
            }
            Self::Type(name) => json!({"$type": name}),
            Self::Repr(s) => json!({"$repr": s}),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            _ => {
                let mut out = String::new();
                self.repr_fmt(&mut out)?;
                f.write_str(&out)
            }
        }
    }
}

impl From<IndexMap<Object, Object>> for Object {
    fn from(map: IndexMap<Object, Object>) -> Self {
        Self::Dict(map.into_iter().collect())
    }
}

impl std::hash::Hash for Object {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::None | Self::Ellipsis => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::BigInt(b) => b.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::String(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
            Self::Type(name) | Self::Repr(name) => name.hash(state),
            // containers and exceptions hash by length only; full equality
            // still disambiguates in host-side maps
            Self::List(items) | Self::Tuple(items) => items.len().hash(state),
            Self::Dict(pairs) => pairs.len().hash(state),
            Self::Exception { exc_type, .. } => exc_type.hash(state),
        }
    }
}

impl Eq for Object {}

impl<T: ResourceTracker> Runtime<T> {
    /// Snapshots a runtime value as an owned [`Object`].
    pub fn to_object(&mut self, v: Value) -> Object {
        let mut visited = ahash::AHashSet::new();
        self.object_of(&v, &mut visited)
    }

    fn object_of(&mut self, v: &Value, visited: &mut ahash::AHashSet<HeapId>) -> Object {
        match v {
            Value::None | Value::Undefined => Object::None,
            Value::Ellipsis => Object::Ellipsis,
            Value::NotImplemented => Object::Repr("NotImplemented".to_owned()),
            Value::Bool(b) => Object::Bool(*b),
            Value::Int(i) => Object::Int(*i),
            Value::Float(f) => Object::Float(*f),
            Value::InternString(id) => Object::String(self.interns.get_str(*id).to_owned()),
            Value::Builtin(Builtins::Type(t)) => Object::Type(t.name().to_owned()),
            Value::Builtin(Builtins::ExcType(e)) => {
                let name: &'static str = (*e).into();
                Object::Type(name.to_owned())
            }
            Value::Ref(id) => {
                if visited.contains(id) {
                    let placeholder = match self.heap.get(*id) {
                        HeapData::List(_) => "[...]",
                        HeapData::Tuple(_) => "(...)",
                        HeapData::Dict(_) => "{...}",
                        _ => "...",
                    };
                    return Object::Repr(placeholder.to_owned());
                }
                enum Kind {
                    Str(String),
                    Bytes(Vec<u8>),
                    Big(BigInt),
                    List(Vec<Value>),
                    Tuple(Vec<Value>),
                    Dict(Vec<(Value, Value)>),
                    Exception(ExcType, Option<String>),
                    Opaque,
                }
                let kind = match self.heap.get(*id) {
                    HeapData::Str(s) => Kind::Str(s.as_str().to_owned()),
                    HeapData::Bytes(b) => Kind::Bytes(b.as_slice().to_owned()),
                    HeapData::LongInt(li) => Kind::Big(li.inner().clone()),
                    HeapData::List(l) => Kind::List(l.as_vec().to_vec()),
                    HeapData::Tuple(t) => Kind::Tuple(t.as_vec().to_vec()),
                    HeapData::Dict(d) => Kind::Dict(d.entries_vec()),
                    HeapData::Exception(exc) => Kind::Exception(exc.exc_type(), exc.arg().map(str::to_owned)),
                    _ => Kind::Opaque,
                };
                match kind {
                    Kind::Str(s) => Object::String(s),
                    Kind::Bytes(b) => Object::Bytes(b),
                    Kind::Big(b) => Object::BigInt(b),
                    Kind::List(items) => {
                        visited.insert(*id);
                        let out = items.iter().map(|item| self.object_of(item, visited)).collect();
                        visited.remove(id);
                        Object::List(out)
                    }
                    Kind::Tuple(items) => {
                        visited.insert(*id);
                        let out = items.iter().map(|item| self.object_of(item, visited)).collect();
                        visited.remove(id);
                        Object::Tuple(out)
                    }
                    Kind::Dict(entries) => {
                        visited.insert(*id);
                        let out = entries
                            .iter()
                            .map(|(k, value)| (self.object_of(k, visited), self.object_of(value, visited)))
                            .collect();
                        visited.remove(id);
                        Object::Dict(out)
                    }
                    Kind::Exception(exc_type, arg) => Object::Exception { exc_type, arg },
                    Kind::Opaque => {
                        let repr = self.py_repr(*v).unwrap_or_else(|_| "<object>".to_owned());
                        Object::Repr(repr)
                    }
                }
            }
            other => {
                let repr = self.py_repr(*other).unwrap_or_else(|_| "<object>".to_owned());
                Object::Repr(repr)
            }
        }
    }

    /// Materializes an [`Object`] as a runtime value.
    pub fn from_object(&mut self, obj: Object) -> RunResult<Value> {
        match obj {
            Object::None => Ok(Value::None),
            Object::Ellipsis => Ok(Value::Ellipsis),
            Object::Bool(b) => Ok(Value::Bool(b)),
            Object::Int(i) => Ok(Value::Int(i)),
            Object::BigInt(b) => LongInt::new(b).into_value(&mut self.heap),
            Object::Float(f) => Ok(Value::Float(f)),
            Object::String(s) => self.alloc_str(&s),
            Object::Bytes(b) => {
                let id = self.heap.allocate(HeapData::Bytes(crate::types::Bytes::new(b)))?;
                Ok(Value::Ref(id))
            }
            Object::List(items) => {
                let values = items
                    .into_iter()
                    .map(|item| self.from_object(item))
                    .collect::<RunResult<Vec<_>>>()?;
                self.alloc_list(values)
            }
            Object::Tuple(items) => {
                let values = items
                    .into_iter()
                    .map(|item| self.from_object(item))
                    .collect::<RunResult<Vec<_>>>()?;
                self.alloc_tuple(values)
            }
            Object::Dict(pairs) => {
                let dict_v = self.dict_new()?;
                for (k, v) in pairs {
                    let key = self.from_object(k)?;
                    let value = self.from_object(v)?;
                    self.dict_set(dict_v, key, value)?;
                }
                Ok(dict_v)
            }
            Object::Exception { exc_type, arg } => {
                let id = self
                    .heap
                    .allocate(HeapData::Exception(crate::exception_private::SimpleException::new(
                        exc_type, arg,
                    )))?;
                Ok(Value::Ref(id))
            }
            Object::Type(name) => {
                // builtin type names resolve to their enum values
                let t = match name.as_str() {
                    "type" => Some(Type::Type),
                    "object" => Some(Type::Object),
                    "bool" => Some(Type::Bool),
                    "int" => Some(Type::Int),
                    "float" => Some(Type::Float),
                    "str" => Some(Type::Str),
                    "bytes" => Some(Type::Bytes),
                    "list" => Some(Type::List),
                    "tuple" => Some(Type::Tuple),
                    "dict" => Some(Type::Dict),
                    "slice" => Some(Type::Slice),
                    "property" => Some(Type::Property),
                    "staticmethod" => Some(Type::StaticMethod),
                    "classmethod" => Some(Type::ClassMethod),
                    _ => None,
                };
                match t {
                    Some(t) => Ok(Value::Builtin(Builtins::Type(t))),
                    None => match name.parse::<ExcType>() {
                        Ok(e) => Ok(Value::Builtin(Builtins::ExcType(e))),
                        Err(_) => Err(ExcType::value_error(format!("unknown type name '{name}'"))),
                    },
                }
            }
            Object::Repr(_) => Err(ExcType::type_error("'Repr' is not a valid input value")),
        }
    }
}
