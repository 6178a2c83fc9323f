//! Shared helpers for the integration tests.

use pyrite::{ArgValues, Runtime, Value};

/// Builds a class from a name, bases and `(name, value)` body entries.
pub fn class_with(rt: &mut Runtime, name: &str, bases: &[Value], entries: &[(&str, Value)]) -> Value {
    let ns = rt.dict_new().unwrap();
    for (key, value) in entries {
        rt.dict_set_str(ns, key, *value).unwrap();
    }
    rt.build_class(name, bases, ns, None).unwrap()
}

/// Instantiates a class with no arguments.
pub fn instantiate(rt: &mut Runtime, cls: Value) -> Value {
    rt.call(cls, ArgValues::Empty).unwrap()
}
