//! Attribute resolution: descriptors, instance dicts, `__getattr__`
//! overrides, `__slots__` layouts and `__class__` reassignment.

mod common;

use common::{class_with, instantiate};
use pyrite::{
    ArgValues, Builtins, ExcType, Exception, Frame, Object, Runtime, RunResult, Signature, SimpleException, Type,
    Value,
};

fn property_type() -> Value {
    Value::Builtin(Builtins::Type(Type::Property))
}

fn getter_returns_42(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(42))
}

#[test]
fn data_descriptor_wins_over_instance_dict() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self")]);
    let fget = rt.register_function("x", sig, vec![], getter_returns_42);
    let prop = rt.call(property_type(), ArgValues::One(fget)).unwrap();

    let p_cls = class_with(&mut rt, "P", &[], &[("x", prop)]);
    let p = instantiate(&mut rt, p_cls);

    // plant a shadowing entry directly in the instance dict
    let dict = rt.getattr(p, "__dict__").unwrap();
    rt.dict_set_str(dict, "x", Value::Int(5)).unwrap();

    assert!(matches!(rt.getattr(p, "x").unwrap(), Value::Int(42)));
}

#[test]
fn instance_dict_wins_over_non_data_descriptors() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self")]);
    let method = rt.register_function("m", sig, vec![], getter_returns_42);
    let cls = class_with(&mut rt, "C", &[], &[("m", method)]);
    let inst = instantiate(&mut rt, cls);

    // functions are non-data descriptors: the instance dict shadows them
    rt.setattr(inst, "m", Value::Int(5)).unwrap();
    assert!(matches!(rt.getattr(inst, "m").unwrap(), Value::Int(5)));

    // removing the shadow restores method binding
    rt.delattr(inst, "m").unwrap();
    let bound = rt.getattr(inst, "m").unwrap();
    let result = rt.call(bound, ArgValues::Empty).unwrap();
    assert!(matches!(result, Value::Int(42)));
}

#[test]
fn setattr_getattr_round_trip() {
    let mut rt = Runtime::default();
    let cls = class_with(&mut rt, "C", &[], &[]);
    let inst = instantiate(&mut rt, cls);

    rt.setattr(inst, "n", Value::Int(9)).unwrap();
    assert!(matches!(rt.getattr(inst, "n").unwrap(), Value::Int(9)));

    rt.delattr(inst, "n").unwrap();
    assert!(!rt.hasattr(inst, "n").unwrap());
    rt.setattr(inst, "n", Value::Int(10)).unwrap();
    assert!(matches!(rt.getattr(inst, "n").unwrap(), Value::Int(10)));
}

#[test]
fn missing_attribute_raises_attribute_error() {
    let mut rt = Runtime::default();
    let cls = class_with(&mut rt, "C", &[], &[]);
    let inst = instantiate(&mut rt, cls);
    let err = rt.getattr(inst, "nope").unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::AttributeError);
    assert_eq!(exc.message().unwrap(), "'C' object has no attribute 'nope'");
}

fn getattr_raises(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    let name = rt.py_str(frame.arg(1))?;
    Err(SimpleException::new_msg(ExcType::AttributeError, name).into())
}

#[test]
fn raising_getattr_reads_as_absence() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("name")]);
    let hook = rt.register_function("__getattr__", sig, vec![], getattr_raises);
    let cls = class_with(&mut rt, "C", &[], &[("__getattr__", hook)]);
    let inst = instantiate(&mut rt, cls);

    assert!(!rt.hasattr(inst, "x").unwrap());
    let fallback = rt.getattr_with_default(inst, "x", Value::Int(7)).unwrap();
    assert!(matches!(fallback, Value::Int(7)));
}

fn getattr_returns_name_length(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    let name = rt.py_str(frame.arg(1))?;
    Ok(Value::Int(name.len() as i64))
}

#[test]
fn getattr_hook_runs_only_after_normal_lookup_fails() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("name")]);
    let hook = rt.register_function("__getattr__", sig, vec![], getattr_returns_name_length);
    let cls = class_with(&mut rt, "C", &[], &[("__getattr__", hook), ("present", Value::Int(1))]);
    let inst = instantiate(&mut rt, cls);

    assert!(matches!(rt.getattr(inst, "present").unwrap(), Value::Int(1)));
    assert!(matches!(rt.getattr(inst, "jazz").unwrap(), Value::Int(4)));
}

fn property_getter_unreadable_check(rt: &mut Runtime) -> (Value, Value) {
    // property with a setter but no getter
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("value")]);
    let fset = rt.register_function("set_x", sig, vec![], property_set_stores);
    let args = ArgValues::Two(Value::None, fset);
    let prop = rt.call(property_type(), args).unwrap();
    let cls = class_with(rt, "W", &[], &[("x", prop)]);
    let inst = instantiate(rt, cls);
    (cls, inst)
}

fn property_set_stores(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    rt.setattr(frame.arg(0), "stored", frame.arg(1))?;
    Ok(Value::None)
}

#[test]
fn property_accessor_errors() {
    let mut rt = Runtime::default();
    let (_cls, inst) = property_getter_unreadable_check(&mut rt);

    // write goes through the setter
    rt.setattr(inst, "x", Value::Int(3)).unwrap();
    assert!(matches!(rt.getattr(inst, "stored").unwrap(), Value::Int(3)));

    // read has no getter
    let err = rt.getattr(inst, "x").unwrap_err();
    assert_eq!(Exception::from(err).message().unwrap(), "unreadable attribute");

    // read-only property rejects writes
    let sig = Signature::positional(vec![rt.intern("self")]);
    let fget = rt.register_function("x", sig, vec![], getter_returns_42);
    let prop = rt.call(property_type(), ArgValues::One(fget)).unwrap();
    let ro_cls = class_with(&mut rt, "R", &[], &[("x", prop)]);
    let ro = instantiate(&mut rt, ro_cls);
    let err = rt.setattr(ro, "x", Value::Int(1)).unwrap_err();
    assert_eq!(Exception::from(err).message().unwrap(), "can't set attribute");
}

fn descr_get_returns_99(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(99))
}

fn descr_set_records(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    // (self, instance, value): record the write on the descriptor itself
    rt.setattr(frame.arg(0), "last", frame.arg(2))?;
    Ok(Value::None)
}

#[test]
fn user_defined_data_descriptor() {
    let mut rt = Runtime::default();
    let get_sig = Signature::positional(vec![rt.intern("self"), rt.intern("obj"), rt.intern("objtype")]);
    let set_sig = Signature::positional(vec![rt.intern("self"), rt.intern("obj"), rt.intern("value")]);
    let get_fn = rt.register_function("__get__", get_sig, vec![], descr_get_returns_99);
    let set_fn = rt.register_function("__set__", set_sig, vec![], descr_set_records);
    let descr_cls = class_with(&mut rt, "D", &[], &[("__get__", get_fn), ("__set__", set_fn)]);
    let descr = instantiate(&mut rt, descr_cls);

    let owner = class_with(&mut rt, "Owner", &[], &[("attr", descr)]);
    let inst = instantiate(&mut rt, owner);

    // data descriptor beats the instance dict in both directions
    let dict = rt.getattr(inst, "__dict__").unwrap();
    rt.dict_set_str(dict, "attr", Value::Int(1)).unwrap();
    assert!(matches!(rt.getattr(inst, "attr").unwrap(), Value::Int(99)));

    rt.setattr(inst, "attr", Value::Int(5)).unwrap();
    assert!(matches!(rt.getattr(descr, "last").unwrap(), Value::Int(5)));
}

fn nondata_get_marker(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(123))
}

#[test]
fn user_defined_non_data_descriptor_loses_to_instance_dict() {
    let mut rt = Runtime::default();
    let get_sig = Signature::positional(vec![rt.intern("self"), rt.intern("obj"), rt.intern("objtype")]);
    let get_fn = rt.register_function("__get__", get_sig, vec![], nondata_get_marker);
    let descr_cls = class_with(&mut rt, "ND", &[], &[("__get__", get_fn)]);
    let descr = instantiate(&mut rt, descr_cls);

    let owner = class_with(&mut rt, "Owner", &[], &[("attr", descr)]);
    let inst = instantiate(&mut rt, owner);

    assert!(matches!(rt.getattr(inst, "attr").unwrap(), Value::Int(123)));
    rt.setattr(inst, "attr", Value::Int(5)).unwrap();
    assert!(matches!(rt.getattr(inst, "attr").unwrap(), Value::Int(5)));
}

#[test]
fn slots_restrict_instance_attributes() {
    let mut rt = Runtime::default();
    let slot_a = rt.alloc_str("a").unwrap();
    let slots = rt.alloc_tuple(vec![slot_a]).unwrap();
    let cls = class_with(&mut rt, "S", &[], &[("__slots__", slots)]);
    let inst = instantiate(&mut rt, cls);

    rt.setattr(inst, "a", Value::Int(1)).unwrap();
    assert!(matches!(rt.getattr(inst, "a").unwrap(), Value::Int(1)));

    // unknown names have nowhere to go
    let err = rt.setattr(inst, "b", Value::Int(2)).unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::AttributeError);

    // an unset slot reads as missing
    let other = instantiate(&mut rt, cls);
    let err = rt.getattr(other, "a").unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::AttributeError);

    // and there is no __dict__
    let err = rt.getattr(inst, "__dict__").unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::AttributeError);
}

#[test]
fn class_reassignment_requires_matching_layout() {
    let mut rt = Runtime::default();
    let a = class_with(&mut rt, "A", &[], &[]);
    let b = class_with(&mut rt, "B", &[], &[("tag", Value::Int(1))]);
    let inst = instantiate(&mut rt, a);

    rt.setattr(inst, "__class__", b).unwrap();
    let cls = rt.type_of(inst).unwrap();
    assert!(cls.is_same(&b));
    assert!(matches!(rt.getattr(inst, "tag").unwrap(), Value::Int(1)));

    // a __slots__ class has a different layout
    let slot_a = rt.alloc_str("a").unwrap();
    let slots = rt.alloc_tuple(vec![slot_a]).unwrap();
    let slotted = class_with(&mut rt, "S", &[], &[("__slots__", slots)]);
    let err = rt.setattr(inst, "__class__", slotted).unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert!(exc.message().unwrap().contains("object layout differs"));
}

fn setattr_override_uppercases(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    // store every attribute under its uppercased name
    let name = rt.py_str(frame.arg(1))?.to_uppercase();
    let inst = frame.arg(0);
    let dict = rt.getattr(inst, "__dict__")?;
    rt.dict_set_str(dict, &name, frame.arg(2))?;
    Ok(Value::None)
}

#[test]
fn setattr_override_intercepts_stores() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("name"), rt.intern("value")]);
    let hook = rt.register_function("__setattr__", sig, vec![], setattr_override_uppercases);
    let cls = class_with(&mut rt, "U", &[], &[("__setattr__", hook)]);
    let inst = instantiate(&mut rt, cls);

    rt.setattr(inst, "key", Value::Int(1)).unwrap();
    assert!(!rt.hasattr(inst, "key").unwrap());
    assert!(matches!(rt.getattr(inst, "KEY").unwrap(), Value::Int(1)));
}

fn getattribute_constant(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(1000))
}

#[test]
fn getattribute_override_replaces_the_default_algorithm() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("name")]);
    let hook = rt.register_function("__getattribute__", sig, vec![], getattribute_constant);
    let cls = class_with(&mut rt, "G", &[], &[("__getattribute__", hook), ("x", Value::Int(5))]);
    let inst = instantiate(&mut rt, cls);

    // even class-level values go through the override
    assert!(matches!(rt.getattr(inst, "x").unwrap(), Value::Int(1000)));
    assert!(matches!(rt.getattr(inst, "anything").unwrap(), Value::Int(1000)));
}

#[test]
fn repeated_reads_of_a_data_descriptor_are_identical() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self")]);
    let fget = rt.register_function("x", sig, vec![], getter_returns_42);
    let prop = rt.call(property_type(), ArgValues::One(fget)).unwrap();
    let cls = class_with(&mut rt, "P", &[], &[("x", prop)]);
    let inst = instantiate(&mut rt, cls);

    let first = rt.getattr(inst, "x").unwrap();
    let second = rt.getattr(inst, "x").unwrap();
    assert!(first.is_same(&second));
}

#[test]
fn object_snapshot_round_trips_instance_state() {
    let mut rt = Runtime::default();
    let cls = class_with(&mut rt, "C", &[], &[]);
    let inst = instantiate(&mut rt, cls);
    let list = rt.from_object(Object::List(vec![Object::Int(1), Object::String("two".to_owned())])).unwrap();
    rt.setattr(inst, "data", list).unwrap();

    let dict = rt.getattr(inst, "__dict__").unwrap();
    let snapshot = rt.to_object(dict);
    assert_eq!(
        snapshot,
        Object::Dict(vec![(
            Object::String("data".to_owned()),
            Object::List(vec![Object::Int(1), Object::String("two".to_owned())]),
        )])
    );
}
