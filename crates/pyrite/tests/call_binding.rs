//! Calls: argument binding, bound methods, the construction protocol and
//! callable instances.

mod common;

use common::{class_with, instantiate};
use pretty_assertions::assert_eq;
use pyrite::{
    ArgValues, ExcType, Exception, Frame, KwargsValues, Object, Runtime, RunResult, Signature, Value,
};

/// `def f(a, b, *, c=1, **kw): return (a, b, c, kw)`
fn f_body(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    let items = vec![frame.arg(0), frame.arg(1), frame.arg(2), frame.arg(3)];
    rt.alloc_tuple(items)
}

fn register_f(rt: &mut Runtime) -> Value {
    let c = rt.intern("c");
    let signature = Signature::new(
        vec![rt.intern("a"), rt.intern("b")],
        0,
        None,
        vec![c],
        vec![Some(0)],
        Some(rt.intern("kw")),
    );
    rt.register_function("f", signature, vec![Value::Int(1)], f_body)
}

#[test]
fn keyword_binding_with_kwonly_and_var_kwargs() {
    let mut rt = Runtime::default();
    let f = register_f(&mut rt);
    let c = rt.intern("c");
    let d = rt.intern("d");

    let args = ArgValues::new(
        vec![Value::Int(1), Value::Int(2)],
        KwargsValues::Inline(vec![(c, Value::Int(3)), (d, Value::Int(4))]),
    );
    let result = rt.call(f, args).unwrap();
    assert_eq!(
        rt.to_object(result),
        Object::Tuple(vec![
            Object::Int(1),
            Object::Int(2),
            Object::Int(3),
            Object::Dict(vec![(Object::String("d".to_owned()), Object::Int(4))]),
        ])
    );
}

#[test]
fn kwonly_default_applies_when_omitted() {
    let mut rt = Runtime::default();
    let f = register_f(&mut rt);
    let result = rt.call(f, ArgValues::Two(Value::Int(5), Value::Int(6))).unwrap();
    assert_eq!(
        rt.to_object(result),
        Object::Tuple(vec![
            Object::Int(5),
            Object::Int(6),
            Object::Int(1),
            Object::Dict(vec![]),
        ])
    );
}

#[test]
fn unexpected_positional_raises() {
    let mut rt = Runtime::default();
    let f = register_f(&mut rt);
    let args = ArgValues::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)], KwargsValues::Empty);
    let err = rt.call(f, args).unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert!(exc.message().unwrap().contains("positional argument"));
}

#[test]
fn duplicate_and_unexpected_keywords_raise() {
    let mut rt = Runtime::default();
    let f = register_f(&mut rt);
    let a = rt.intern("a");
    let args = ArgValues::new(
        vec![Value::Int(1), Value::Int(2)],
        KwargsValues::Inline(vec![(a, Value::Int(9))]),
    );
    let err = rt.call(f, args).unwrap_err();
    assert!(
        Exception::from(err)
            .message()
            .unwrap()
            .contains("got multiple values for keyword argument 'a'")
    );

    let g = register_f(&mut rt);
    let missing = rt.call(g, ArgValues::One(Value::Int(1))).unwrap_err();
    assert!(
        Exception::from(missing)
            .message()
            .unwrap()
            .contains("missing 1 required positional argument: 'b'")
    );
}

fn star_args_len(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    // (first, *rest) -> len(rest)
    let rest = frame.arg(1);
    let len = rt.py_len(rest)?;
    Ok(Value::Int(len as i64))
}

#[test]
fn star_args_collect_excess_positionals() {
    let mut rt = Runtime::default();
    let signature = Signature::new(
        vec![rt.intern("first")],
        0,
        Some(rt.intern("rest")),
        vec![],
        vec![],
        None,
    );
    let f = rt.register_function("g", signature, vec![], star_args_len);
    let args = ArgValues::new(
        vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3)],
        KwargsValues::Empty,
    );
    let result = rt.call(f, args).unwrap();
    assert!(matches!(result, Value::Int(3)));
}

fn init_stores_x(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    rt.setattr(frame.arg(0), "x", frame.arg(1))?;
    Ok(Value::None)
}

#[test]
fn init_runs_on_construction() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("x")]);
    let init = rt.register_function("__init__", sig, vec![], init_stores_x);
    let cls = class_with(&mut rt, "Point", &[], &[("__init__", init)]);

    let p = rt.call(cls, ArgValues::One(Value::Int(3))).unwrap();
    assert!(matches!(rt.getattr(p, "x").unwrap(), Value::Int(3)));
    assert!(rt.isinstance(p, cls).unwrap());
}

fn init_returns_int(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(3))
}

#[test]
fn init_returning_non_none_raises() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self")]);
    let init = rt.register_function("__init__", sig, vec![], init_returns_int);
    let cls = class_with(&mut rt, "Bad", &[], &[("__init__", init)]);

    let err = rt.call(cls, ArgValues::Empty).unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert_eq!(exc.message().unwrap(), "__init__() should return None, not 'int'");
}

fn new_returns_seven(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    // not an instance of the requested class
    Ok(Value::Int(7))
}

fn init_panics(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Err(pyrite::SimpleException::new_msg(ExcType::RuntimeError, "__init__ must not run").into())
}

#[test]
fn foreign_new_result_skips_init() {
    let mut rt = Runtime::default();
    let new_sig = Signature::new(
        vec![rt.intern("cls")],
        0,
        Some(rt.intern("args")),
        vec![],
        vec![],
        None,
    );
    let init_sig = Signature::positional(vec![rt.intern("self")]);
    let new_fn = rt.register_function("__new__", new_sig, vec![], new_returns_seven);
    let init_fn = rt.register_function("__init__", init_sig, vec![], init_panics);
    let cls = class_with(&mut rt, "Odd", &[], &[("__new__", new_fn), ("__init__", init_fn)]);

    let result = rt.call(cls, ArgValues::Empty).unwrap();
    assert!(matches!(result, Value::Int(7)));
}

fn call_doubles(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    rt.binary_op(pyrite::BinaryOp::Mul, frame.arg(1), Value::Int(2))
}

#[test]
fn instances_with_dunder_call_are_callable() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("value")]);
    let call_fn = rt.register_function("__call__", sig, vec![], call_doubles);
    let cls = class_with(&mut rt, "Doubler", &[], &[("__call__", call_fn)]);
    let inst = instantiate(&mut rt, cls);

    assert!(rt.is_callable(inst).unwrap());
    let result = rt.call(inst, ArgValues::One(Value::Int(21))).unwrap();
    assert!(matches!(result, Value::Int(42)));

    // a plain instance is not callable
    let plain_cls = class_with(&mut rt, "Plain", &[], &[]);
    let plain = instantiate(&mut rt, plain_cls);
    assert!(!rt.is_callable(plain).unwrap());
    let err = rt.call(plain, ArgValues::Empty).unwrap_err();
    assert_eq!(
        Exception::from(err).message().unwrap(),
        "'Plain' object is not callable"
    );
}

fn self_and_arg(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    rt.alloc_tuple(vec![frame.arg(0), frame.arg(1)])
}

#[test]
fn bound_methods_prepend_their_receiver() {
    let mut rt = Runtime::default();
    let sig = Signature::positional(vec![rt.intern("self"), rt.intern("v")]);
    let method = rt.register_function("pair", sig, vec![], self_and_arg);
    let cls = class_with(&mut rt, "C", &[], &[("pair", method)]);
    let inst = instantiate(&mut rt, cls);

    let bound = rt.getattr(inst, "pair").unwrap();
    let result = rt.call(bound, ArgValues::One(Value::Int(5))).unwrap();
    match rt.to_object(result) {
        Object::Tuple(items) => {
            assert_eq!(items.len(), 2);
            assert_eq!(items[1], Object::Int(5));
        }
        other => panic!("expected a tuple, got {other:?}"),
    }
}

fn cls_name(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    rt.getattr(frame.arg(0), "__name__")
}

#[test]
fn classmethod_binds_the_class_staticmethod_does_not_bind() {
    let mut rt = Runtime::default();
    let cm_sig = Signature::positional(vec![rt.intern("cls")]);
    let sm_sig = Signature::positional(vec![]);
    let cm_raw = rt.register_function("which", cm_sig, vec![], cls_name);
    let sm_raw = rt.register_function("free", sm_sig, vec![], fixed_ten);

    let cm = rt
        .call(Value::Builtin(pyrite::Builtins::Type(pyrite::Type::ClassMethod)), ArgValues::One(cm_raw))
        .unwrap();
    let sm = rt
        .call(Value::Builtin(pyrite::Builtins::Type(pyrite::Type::StaticMethod)), ArgValues::One(sm_raw))
        .unwrap();
    let cls = class_with(&mut rt, "K", &[], &[("which", cm), ("free", sm)]);
    let inst = instantiate(&mut rt, cls);

    // classmethod binds the class on both access paths
    let via_class = rt.getattr(cls, "which").unwrap();
    let name = rt.call(via_class, ArgValues::Empty).unwrap();
    assert_eq!(rt.to_object(name), Object::String("K".to_owned()));
    let via_instance = rt.getattr(inst, "which").unwrap();
    let name = rt.call(via_instance, ArgValues::Empty).unwrap();
    assert_eq!(rt.to_object(name), Object::String("K".to_owned()));

    // staticmethod retrieval yields the bare function
    let free = rt.getattr(inst, "free").unwrap();
    let result = rt.call(free, ArgValues::Empty).unwrap();
    assert!(matches!(result, Value::Int(10)));
}

fn fixed_ten(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(10))
}

fn reads_global(rt: &mut Runtime, frame: &mut Frame) -> RunResult<Value> {
    let module_id = frame.globals().expect("registered in a module");
    rt.getattr(Value::Ref(module_id), "answer")
}

#[test]
fn module_functions_see_their_globals() {
    let mut rt = Runtime::default();
    let module = rt.module_new("main").unwrap();
    rt.setattr(module, "answer", Value::Int(42)).unwrap();
    let sig = Signature::positional(vec![]);
    let f = rt
        .register_function_in_module(module, "read", sig, vec![], reads_global)
        .unwrap();

    let result = rt.call(f, ArgValues::Empty).unwrap();
    assert!(matches!(result, Value::Int(42)));

    // and the module namespace exposes the function itself
    let via_module = rt.getattr(module, "read").unwrap();
    assert!(via_module.is_same(&f));
}
