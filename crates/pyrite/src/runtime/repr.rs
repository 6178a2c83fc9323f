//! `repr()` and `str()` dispatch.
//!
//! Builtin payloads format natively (with cycle placeholders for
//! self-referential containers); instances dispatch `__repr__`/`__str__`
//! and fall back to the default object repr.

use std::fmt::Write;

use ahash::AHashSet;

use crate::{
    args::ArgValues,
    builtins::Builtins,
    exception_private::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    intern::StaticStrings,
    resource::ResourceTracker,
    runtime::Runtime,
    types::{bytes::bytes_repr_fmt, str::string_repr},
    value::{Value, float_repr},
};

impl<T: ResourceTracker> Runtime<T> {
    /// `repr(v)`.
    pub fn py_repr(&mut self, v: Value) -> RunResult<String> {
        let mut visited = AHashSet::new();
        self.repr_value(v, &mut visited)
    }

    /// `str(v)`.
    pub fn py_str(&mut self, v: Value) -> RunResult<String> {
        if let Some(s) = v.as_str(&self.heap, &self.interns) {
            return Ok(s.to_owned());
        }
        if let Value::Ref(id) = v {
            match self.heap.get(id) {
                HeapData::Exception(exc) => return Ok(exc.py_str()),
                HeapData::Instance(_) => {
                    if let Some(result) = self.call_type_dunder(v, StaticStrings::DunderStr, ArgValues::Empty)? {
                        return match result.as_str(&self.heap, &self.interns) {
                            Some(s) => Ok(s.to_owned()),
                            None => {
                                let type_name = result.type_name(&self.heap, &self.interns).into_owned();
                                Err(ExcType::type_error(format!(
                                    "__str__ returned non-string (type {type_name})"
                                )))
                            }
                        };
                    }
                }
                _ => {}
            }
        }
        self.py_repr(v)
    }

    fn repr_value(&mut self, v: Value, visited: &mut AHashSet<HeapId>) -> RunResult<String> {
        match v {
            Value::Undefined => Err(crate::exception_private::RunError::internal(
                "repr of an undefined value",
            )),
            Value::None => Ok("None".to_owned()),
            Value::Ellipsis => Ok("Ellipsis".to_owned()),
            Value::NotImplemented => Ok("NotImplemented".to_owned()),
            Value::Bool(true) => Ok("True".to_owned()),
            Value::Bool(false) => Ok("False".to_owned()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(float_repr(f)),
            Value::InternString(id) => Ok(string_repr(self.interns.get_str(id))),
            Value::Builtin(Builtins::Type(t)) => Ok(format!("<type '{t}'>")),
            Value::Builtin(Builtins::ExcType(e)) => {
                let name: &'static str = e.into();
                Ok(format!("<type '{name}'>"))
            }
            Value::Builtin(Builtins::Function(f)) => Ok(format!("<built-in function {f}>")),
            Value::DefFunction(fid) => {
                let name = self.interns.get_str(self.functions[fid.index()].name);
                Ok(format!("<function {name}>"))
            }
            Value::HostFunction(hid) => {
                let name = self.interns.get_str(self.host_functions[hid.index()].name);
                Ok(format!("<built-in function {name}>"))
            }
            Value::Proxy(id) => Ok(format!("<proxy #{}>", id.raw())),
            Value::Ref(id) => self.repr_heap(v, id, visited),
        }
    }

    fn repr_heap(&mut self, v: Value, id: HeapId, visited: &mut AHashSet<HeapId>) -> RunResult<String> {
        enum Kind {
            Str(String),
            Bytes(Vec<u8>),
            /// Already fully formatted.
            Literal(String),
            List(Vec<Value>),
            Tuple(Vec<Value>),
            Dict(Vec<(Value, Value)>),
            Slice(Value, Value, Value),
            Class { name: String, builtin: bool },
            Instance,
            BoundMethod(Value),
            Property,
            StaticMethod,
            ClassMethod,
            Member(String),
            MappingProxy(HeapId),
        }

        if visited.contains(&id) {
            let placeholder = match self.heap.get(id) {
                HeapData::List(_) => "[...]",
                HeapData::Tuple(_) => "(...)",
                HeapData::Dict(_) => "{...}",
                _ => "...",
            };
            return Ok(placeholder.to_owned());
        }

        let kind = match self.heap.get(id) {
            HeapData::Str(s) => Kind::Str(s.as_str().to_owned()),
            HeapData::Bytes(b) => Kind::Bytes(b.as_slice().to_owned()),
            // the long repr carries the 2.x suffix
            HeapData::LongInt(li) => Kind::Literal(format!("{li}L")),
            HeapData::List(l) => Kind::List(l.as_vec().to_vec()),
            HeapData::Tuple(t) => Kind::Tuple(t.as_vec().to_vec()),
            HeapData::Dict(d) => Kind::Dict(d.entries_vec()),
            HeapData::Slice(s) => Kind::Slice(s.start, s.stop, s.step),
            HeapData::Module(m) => Kind::Literal(format!("<module '{}'>", self.interns.get_str(m.name()))),
            HeapData::ClassObject(cls) => Kind::Class {
                name: cls.name(&self.interns).to_owned(),
                builtin: cls.builtin().is_some(),
            },
            HeapData::Instance(_) => Kind::Instance,
            HeapData::BoundMethod(bm) => Kind::BoundMethod(bm.func()),
            HeapData::Property(_) => Kind::Property,
            HeapData::StaticMethod(_) => Kind::StaticMethod,
            HeapData::ClassMethod(_) => Kind::ClassMethod,
            HeapData::MemberDescriptor(m) => Kind::Member(m.name().to_owned()),
            HeapData::MappingProxy(mp) => Kind::MappingProxy(mp.class_id()),
            HeapData::Exception(exc) => {
                let mut out = String::new();
                let _ = exc.py_repr_fmt(&mut out);
                Kind::Literal(out)
            }
        };

        match kind {
            Kind::Str(s) => Ok(string_repr(&s)),
            Kind::Bytes(b) => {
                let mut out = String::new();
                let _ = bytes_repr_fmt(&b, &mut out);
                Ok(out)
            }
            Kind::Literal(s) => Ok(s),
            Kind::List(items) => {
                visited.insert(id);
                let mut out = String::from("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.repr_value(*item, visited)?);
                }
                out.push(']');
                visited.remove(&id);
                Ok(out)
            }
            Kind::Tuple(items) => {
                visited.insert(id);
                let mut out = String::from("(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.repr_value(*item, visited)?);
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                visited.remove(&id);
                Ok(out)
            }
            Kind::Dict(entries) => {
                visited.insert(id);
                let mut out = String::from("{");
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.repr_value(*k, visited)?);
                    out.push_str(": ");
                    out.push_str(&self.repr_value(*v, visited)?);
                }
                out.push('}');
                visited.remove(&id);
                Ok(out)
            }
            Kind::Slice(start, stop, step) => {
                let start = self.repr_value(start, visited)?;
                let stop = self.repr_value(stop, visited)?;
                let step = self.repr_value(step, visited)?;
                Ok(format!("slice({start}, {stop}, {step})"))
            }
            Kind::Class { name, builtin } => {
                if builtin {
                    Ok(format!("<type '{name}'>"))
                } else {
                    Ok(format!("<class '{name}'>"))
                }
            }
            Kind::Instance => {
                if let Some(result) = self.call_type_dunder(v, StaticStrings::DunderRepr, ArgValues::Empty)? {
                    return match result.as_str(&self.heap, &self.interns) {
                        Some(s) => Ok(s.to_owned()),
                        None => {
                            let type_name = result.type_name(&self.heap, &self.interns).into_owned();
                            Err(ExcType::type_error(format!(
                                "__repr__ returned non-string (type {type_name})"
                            )))
                        }
                    };
                }
                let type_name = v.type_name(&self.heap, &self.interns).into_owned();
                Ok(format!("<{type_name} object>"))
            }
            Kind::BoundMethod(func) => {
                let func_name = match func {
                    Value::DefFunction(fid) => self.interns.get_str(self.functions[fid.index()].name).to_owned(),
                    Value::HostFunction(hid) => {
                        self.interns.get_str(self.host_functions[hid.index()].name).to_owned()
                    }
                    Value::Builtin(b) => b.name().to_owned(),
                    _ => "?".to_owned(),
                };
                Ok(format!("<bound method {func_name}>"))
            }
            Kind::Property => Ok("<property object>".to_owned()),
            Kind::StaticMethod => Ok("<staticmethod object>".to_owned()),
            Kind::ClassMethod => Ok("<classmethod object>".to_owned()),
            Kind::Member(name) => Ok(format!("<member '{name}'>")),
            Kind::MappingProxy(class_id) => {
                let entries = match self.heap.get(class_id) {
                    HeapData::ClassObject(cls) => cls.namespace().entries_vec(),
                    _ => Vec::new(),
                };
                let mut out = String::from("dict_proxy({");
                for (i, (k, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.repr_value(*k, visited)?);
                    out.push_str(": ");
                    out.push_str(&self.repr_value(*value, visited)?);
                }
                let _ = write!(out, "}})");
                Ok(out)
            }
        }
    }
}
