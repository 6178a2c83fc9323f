//! Value-level protocols: hashing, truth testing, length, repr,
//! subscription, cancellation, resource limits, finalizers and the
//! foreign-type bridge.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use common::{class_with, instantiate};
use pyrite::{
    ArgValues, ExcType, Exception, Frame, LimitedTracker, Object, ProxyId, ResourceLimits, Runtime, RunResult,
    Signature, Value,
};

fn eq_always_true(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Bool(true))
}

#[test]
fn defining_eq_without_hash_nulls_the_hash_slot() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("other")]);
    let eq = rt.register_function("__eq__", sig, vec![], eq_always_true);
    let cls = class_with(&mut rt, "E", &[], &[("__eq__", eq)]);
    let inst = instantiate(&mut rt, cls);

    let err = rt.py_hash(inst).unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert_eq!(exc.message().unwrap(), "unhashable type: 'E'");
}

fn hash_returns_seven(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(7))
}

#[test]
fn user_hash_drives_py_hash() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self")]);
    let hash_fn = rt.register_function("__hash__", sig, vec![], hash_returns_seven);
    let cls = class_with(&mut rt, "H", &[], &[("__hash__", hash_fn)]);
    let inst = instantiate(&mut rt, cls);
    assert_eq!(rt.py_hash(inst).unwrap(), 7);
}

#[test]
fn equal_values_hash_alike_across_numeric_types() {
    let mut rt = Runtime::default();
    let int_hash = rt.py_hash(Value::Int(1)).unwrap();
    assert_eq!(rt.py_hash(Value::Float(1.0)).unwrap(), int_hash);
    assert_eq!(rt.py_hash(Value::Bool(true)).unwrap(), int_hash);

    let a = rt.alloc_str("spam").unwrap();
    let b = rt.alloc_str("spam").unwrap();
    assert_eq!(rt.py_hash(a).unwrap(), rt.py_hash(b).unwrap());
}

#[test]
fn mutable_builtins_are_unhashable() {
    let mut rt = Runtime::default();
    let list = rt.alloc_list(vec![]).unwrap();
    let err = rt.py_hash(list).unwrap_err();
    assert_eq!(Exception::from(err).message().unwrap(), "unhashable type: 'list'");
}

fn nonzero_false(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Bool(false))
}

fn len_zero(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(0))
}

#[test]
fn truth_testing_dispatches_nonzero_then_len() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self")]);
    let nz = rt.register_function("__nonzero__", sig.clone(), vec![], nonzero_false);
    let falsy = class_with(&mut rt, "F", &[], &[("__nonzero__", nz)]);
    let inst = instantiate(&mut rt, falsy);
    assert!(!rt.py_bool(inst).unwrap());

    let ln = rt.register_function("__len__", sig, vec![], len_zero);
    let empty = class_with(&mut rt, "L", &[], &[("__len__", ln)]);
    let inst = instantiate(&mut rt, empty);
    assert!(!rt.py_bool(inst).unwrap());
    assert_eq!(rt.py_len(inst).unwrap(), 0);

    // with neither hook, instances are truthy
    let plain = class_with(&mut rt, "P", &[], &[]);
    let inst = instantiate(&mut rt, plain);
    assert!(rt.py_bool(inst).unwrap());
}

fn repr_banner(rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    rt.alloc_str("<R!>")
}

#[test]
fn repr_dispatches_and_defaults() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self")]);
    let repr_fn = rt.register_function("__repr__", sig, vec![], repr_banner);
    let custom = class_with(&mut rt, "R", &[], &[("__repr__", repr_fn)]);
    let inst = instantiate(&mut rt, custom);
    assert_eq!(rt.py_repr(inst).unwrap(), "<R!>");

    let plain = class_with(&mut rt, "Plain", &[], &[]);
    let inst = instantiate(&mut rt, plain);
    assert_eq!(rt.py_repr(inst).unwrap(), "<Plain object>");

    // containers repr recursively, with cycle placeholders
    let list = rt.alloc_list(vec![Value::Int(1)]).unwrap();
    rt.setitem(list, Value::Int(0), list).unwrap();
    assert_eq!(rt.py_repr(list).unwrap(), "[[...]]");

    assert_eq!(rt.py_repr(Value::Float(1.0)).unwrap(), "1.0");
    let s = rt.alloc_str("it's").unwrap();
    assert_eq!(rt.py_repr(s).unwrap(), "\"it's\"");
}

fn getitem_echo(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    rt.alloc_tuple(vec![frame.arg(1)])
}

#[test]
fn subscription_native_and_dunder() {
    let mut rt = Runtime::default();
    let list = rt.alloc_list(vec![Value::Int(10), Value::Int(20), Value::Int(30)]).unwrap();
    assert!(matches!(rt.getitem(list, Value::Int(1)).unwrap(), Value::Int(20)));
    assert!(matches!(rt.getitem(list, Value::Int(-1)).unwrap(), Value::Int(30)));
    rt.setitem(list, Value::Int(0), Value::Int(11)).unwrap();
    assert!(matches!(rt.getitem(list, Value::Int(0)).unwrap(), Value::Int(11)));

    let err = rt.getitem(list, Value::Int(9)).unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::IndexError);

    let dict = rt.dict_new().unwrap();
    rt.dict_set_str(dict, "k", Value::Int(1)).unwrap();
    let missing = rt.alloc_str("absent").unwrap();
    let err = rt.getitem(dict, missing).unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::KeyError);

    // user __getitem__ sees the raw key
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("key")]);
    let gi = rt.register_function("__getitem__", sig, vec![], getitem_echo);
    let cls = class_with(&mut rt, "G", &[], &[("__getitem__", gi)]);
    let inst = instantiate(&mut rt, cls);
    let result = rt.getitem(inst, Value::Int(5)).unwrap();
    assert_eq!(rt.to_object(result), Object::Tuple(vec![Object::Int(5)]));

    let err = rt.getitem(Value::Int(3), Value::Int(0)).unwrap_err();
    assert_eq!(
        Exception::from(err).message().unwrap(),
        "'int' object is not subscriptable"
    );
}

fn getslice_bounds(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    rt.alloc_tuple(vec![frame.arg(1), frame.arg(2)])
}

#[test]
fn legacy_getslice_is_consulted_for_plain_bounds() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("i"), rt.intern("j")]);
    let gs = rt.register_function("__getslice__", sig, vec![], getslice_bounds);
    let cls = class_with(&mut rt, "GS", &[], &[("__getslice__", gs)]);
    let inst = instantiate(&mut rt, cls);

    let result = rt.subscript_slice(inst, Value::Int(1), Value::Int(5), Value::None).unwrap();
    assert_eq!(rt.to_object(result), Object::Tuple(vec![Object::Int(1), Object::Int(5)]));

    // missing bounds default to 0 and the maximum machine integer
    let result = rt.subscript_slice(inst, Value::None, Value::Int(5), Value::None).unwrap();
    assert_eq!(rt.to_object(result), Object::Tuple(vec![Object::Int(0), Object::Int(5)]));

    // a step disables the legacy protocol; without __getitem__ that fails
    let err = rt
        .subscript_slice(inst, Value::Int(1), Value::Int(5), Value::Int(2))
        .unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::TypeError);

    // native slicing still works on sequences
    let list = rt.alloc_list(vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();
    let sliced = rt.subscript_slice(list, Value::Int(1), Value::Int(3), Value::None).unwrap();
    assert_eq!(rt.to_object(sliced), Object::List(vec![Object::Int(1), Object::Int(2)]));
}

fn spin(rt: &mut Runtime<LimitedTracker>, frame: &mut Frame) -> RunResult<Value> {
    // re-enter the runtime so the callout boundary is crossed again
    rt.call(frame.arg(0), ArgValues::One(frame.arg(0)))
}

fn shallow_runtime() -> Runtime<LimitedTracker> {
    let limits = ResourceLimits {
        max_recursion_depth: 50,
        ..ResourceLimits::default()
    };
    Runtime::new(LimitedTracker::new(limits))
}

#[test]
fn interrupt_surfaces_as_keyboard_interrupt() {
    let mut rt = shallow_runtime();
    let sig = Signature::positional(vec![rt.intern("f")]);
    let f = rt.register_function("spin", sig, vec![], spin);

    let handle = rt.interrupt_handle();
    handle.interrupt();
    let err = rt.call(f, ArgValues::One(f)).unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::KeyboardInterrupt);

    // the flag is consumed on delivery: the next call runs (until the
    // recursion limit stops it)
    let err = rt.call(f, ArgValues::One(f)).unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::RecursionError);
}

#[test]
fn recursion_limit_is_uncatchable() {
    let mut rt = shallow_runtime();
    let sig = Signature::positional(vec![rt.intern("f")]);
    let f = rt.register_function("spin", sig, vec![], spin);
    let err = rt.call(f, ArgValues::One(f)).unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::RecursionError);
    assert!(exc.is_uncatchable());
    // the traceback accumulated one frame per call
    assert!(exc.frames().len() > 10);
}

#[test]
fn allocation_budget_is_enforced() {
    let limits = ResourceLimits {
        max_allocations: Some(8),
        ..ResourceLimits::default()
    };
    let mut rt = Runtime::new(LimitedTracker::new(limits));
    let mut last = Ok(Value::None);
    for _ in 0..32 {
        last = rt.alloc_str("x");
        if last.is_err() {
            break;
        }
    }
    let exc = Exception::from(last.unwrap_err());
    assert_eq!(exc.exc_type(), ExcType::MemoryError);
    assert!(exc.is_uncatchable());
}

static FINALIZED: AtomicBool = AtomicBool::new(false);

fn del_records(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    FINALIZED.store(true, Ordering::SeqCst);
    Ok(Value::None)
}

#[test]
fn finalizers_run_before_reclamation() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self")]);
    let del = rt.register_function("__del__", sig, vec![], del_records);
    let cls = class_with(&mut rt, "D", &[], &[("__del__", del)]);
    let inst = instantiate(&mut rt, cls);

    let Value::Ref(id) = inst else { panic!("instances live on the heap") };
    rt.finalize(id).unwrap();
    assert!(FINALIZED.load(Ordering::SeqCst));
    rt.heap_mut().free(id);
    assert!(!rt.heap().is_live(id));
}

#[test]
fn traverse_reports_instance_edges() {
    let mut rt = Runtime::default();
    let cls = class_with(&mut rt, "C", &[], &[]);
    let inst = instantiate(&mut rt, cls);
    rt.setattr(inst, "x", Value::Int(1)).unwrap();

    let Value::Ref(inst_id) = inst else { panic!() };
    let Value::Ref(cls_id) = cls else { panic!() };
    let mut children = Vec::new();
    rt.heap().traverse(inst_id, &mut |id| children.push(id));
    // the class edge and the instance dict edge are both strong
    assert!(children.contains(&cls_id));
    assert_eq!(children.len(), 2);
}

fn vector_norm(_rt: &mut Runtime, _args: ArgValues) -> RunResult<Value> {
    Ok(Value::Int(5))
}

#[test]
fn foreign_types_adapt_host_values() {
    let mut rt = Runtime::default();
    let vector = rt.register_foreign_type("Vector", &[("norm", vector_norm)]).unwrap();
    let adapted = rt.adapt(ProxyId::new(17), vector).unwrap();

    assert!(rt.isinstance(adapted, vector).unwrap());
    assert_eq!(rt.proxy_of(adapted), Some(ProxyId::new(17)));

    let norm = rt.getattr(adapted, "norm").unwrap();
    let result = rt.call(norm, ArgValues::Empty).unwrap();
    assert!(matches!(result, Value::Int(5)));

    // foreign types are immutable
    let err = rt.setattr(vector, "norm", Value::None).unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::TypeError);
}

#[test]
fn dict_iteration_detects_size_changes() {
    let mut rt = Runtime::default();
    let dict = rt.dict_new().unwrap();
    rt.dict_set_str(dict, "a", Value::Int(1)).unwrap();
    rt.dict_set_str(dict, "b", Value::Int(2)).unwrap();

    // re-assignment is not a size change and does not trip the guard
    let mut iter = rt.dict_iter(dict).unwrap();
    rt.dict_set_str(dict, "a", Value::Int(10)).unwrap();
    assert!(rt.dict_iter_next(&mut iter).unwrap().is_some());

    // insertion is
    rt.dict_set_str(dict, "c", Value::Int(3)).unwrap();
    let err = rt.dict_iter_next(&mut iter).unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::RuntimeError);
    assert_eq!(exc.message().unwrap(), "dictionary changed size during iteration");
}

#[test]
fn module_namespace_is_a_slot_storage() {
    let mut rt = Runtime::default();
    let module = rt.module_new("m").unwrap();
    rt.setattr(module, "a", Value::Int(1)).unwrap();
    rt.setattr(module, "a", Value::Int(2)).unwrap();
    assert!(matches!(rt.getattr(module, "a").unwrap(), Value::Int(2)));
    rt.delattr(module, "a").unwrap();
    let err = rt.getattr(module, "a").unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::AttributeError);
}
