//! Operator dispatch: reflected fallback, `NotImplemented` arbitration,
//! subclass right-operand precedence, comparisons and native arithmetic.

mod common;

use common::{class_with, instantiate};
use pretty_assertions::assert_eq;
use pyrite::{
    ArgValues, BinaryOp, CompareOp, ExcType, Exception, Frame, Object, Runtime, RunResult, Signature, UnaryOp, Value,
};

fn binop_sig(rt: &mut Runtime) -> Signature {
    Signature::positional(vec![rt.intern("self"), rt.intern("other")])
}

fn add_returns_a(rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    rt.alloc_str("a")
}

fn radd_returns_b(rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    rt.alloc_str("b")
}

fn radd_returns_ra(rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    rt.alloc_str("ra")
}

fn returns_not_implemented(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::NotImplemented)
}

#[test]
fn subclass_reflected_operand_takes_precedence() {
    let mut rt = Runtime::default();
    let sig = binop_sig(&mut rt);
    let add = rt.register_function("__add__", sig.clone(), vec![], add_returns_a);
    let radd = rt.register_function("__radd__", sig, vec![], radd_returns_b);

    let a_cls = class_with(&mut rt, "A", &[], &[("__add__", add)]);
    let b_cls = class_with(&mut rt, "B", &[a_cls], &[("__radd__", radd)]);
    let a = instantiate(&mut rt, a_cls);
    let b = instantiate(&mut rt, b_cls);

    let result = rt.binary_op(BinaryOp::Add, a, b).unwrap();
    assert_eq!(rt.to_object(result), Object::String("b".to_owned()));
}

#[test]
fn inherited_reflected_op_does_not_take_precedence() {
    let mut rt = Runtime::default();
    let sig = binop_sig(&mut rt);
    let add = rt.register_function("__add__", sig.clone(), vec![], add_returns_a);
    let radd = rt.register_function("__radd__", sig, vec![], radd_returns_ra);

    // B inherits __radd__ from A: not a distinct override, so A.__add__ runs
    let a_cls = class_with(&mut rt, "A", &[], &[("__add__", add), ("__radd__", radd)]);
    let b_cls = class_with(&mut rt, "B", &[a_cls], &[]);
    let a = instantiate(&mut rt, a_cls);
    let b = instantiate(&mut rt, b_cls);

    let result = rt.binary_op(BinaryOp::Add, a, b).unwrap();
    assert_eq!(rt.to_object(result), Object::String("a".to_owned()));
}

#[test]
fn not_implemented_falls_back_to_reflected() {
    let mut rt = Runtime::default();
    let sig = binop_sig(&mut rt);
    let add = rt.register_function("__add__", sig.clone(), vec![], returns_not_implemented);
    let radd = rt.register_function("__radd__", sig, vec![], radd_returns_b);

    let a_cls = class_with(&mut rt, "A", &[], &[("__add__", add)]);
    let b_cls = class_with(&mut rt, "B", &[], &[("__radd__", radd)]);
    let a = instantiate(&mut rt, a_cls);
    let b = instantiate(&mut rt, b_cls);

    let result = rt.binary_op(BinaryOp::Add, a, b).unwrap();
    assert_eq!(rt.to_object(result), Object::String("b".to_owned()));
}

#[test]
fn both_declining_raises_type_error() {
    let mut rt = Runtime::default();
    let a_cls = class_with(&mut rt, "A", &[], &[]);
    let b_cls = class_with(&mut rt, "B", &[], &[]);
    let a = instantiate(&mut rt, a_cls);
    let b = instantiate(&mut rt, b_cls);

    let err = rt.binary_op(BinaryOp::Add, a, b).unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert_eq!(
        exc.message().unwrap(),
        "unsupported operand type(s) for +: 'A' and 'B'"
    );
}

fn iadd_marker(rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    rt.alloc_str("iadd")
}

#[test]
fn inplace_op_prefers_iadd_then_falls_through() {
    let mut rt = Runtime::default();
    let sig = binop_sig(&mut rt);
    let iadd = rt.register_function("__iadd__", sig.clone(), vec![], iadd_marker);
    let add = rt.register_function("__add__", sig, vec![], add_returns_a);

    let with_iadd = class_with(&mut rt, "I", &[], &[("__iadd__", iadd), ("__add__", add)]);
    let inst = instantiate(&mut rt, with_iadd);
    let result = rt.inplace_op(BinaryOp::Add, inst, Value::Int(1)).unwrap();
    assert_eq!(rt.to_object(result), Object::String("iadd".to_owned()));

    let sig2 = binop_sig(&mut rt);
    let add2 = rt.register_function("__add__", sig2, vec![], add_returns_a);
    let without_iadd = class_with(&mut rt, "J", &[], &[("__add__", add2)]);
    let inst = instantiate(&mut rt, without_iadd);
    let result = rt.inplace_op(BinaryOp::Add, inst, Value::Int(1)).unwrap();
    assert_eq!(rt.to_object(result), Object::String("a".to_owned()));
}

#[test]
fn equality_never_raises_and_falls_back_to_identity() {
    let mut rt = Runtime::default();
    let cls = class_with(&mut rt, "Plain", &[], &[]);
    let p = instantiate(&mut rt, cls);
    let q = instantiate(&mut rt, cls);

    assert!(matches!(rt.compare_op(CompareOp::Eq, p, p).unwrap(), Value::Bool(true)));
    assert!(matches!(rt.compare_op(CompareOp::Eq, p, q).unwrap(), Value::Bool(false)));
    assert!(matches!(rt.compare_op(CompareOp::Ne, p, q).unwrap(), Value::Bool(true)));

    // ordering between unrelated types raises instead
    let err = rt.compare_op(CompareOp::Lt, p, q).unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::TypeError);
}

fn lt_true(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Bool(true))
}

#[test]
fn comparison_reflection_map_swaps_sides() {
    let mut rt = Runtime::default();
    let sig = binop_sig(&mut rt);
    let gt = rt.register_function("__gt__", sig, vec![], lt_true);
    let b_cls = class_with(&mut rt, "B", &[], &[("__gt__", gt)]);
    let a_cls = class_with(&mut rt, "A", &[], &[]);
    let a = instantiate(&mut rt, a_cls);
    let b = instantiate(&mut rt, b_cls);

    // a < b resolves through b.__gt__(a)
    let result = rt.compare_op(CompareOp::Lt, a, b).unwrap();
    assert!(matches!(result, Value::Bool(true)));
}

#[test]
fn native_integer_arithmetic_follows_classic_division() {
    let mut rt = Runtime::default();
    assert!(matches!(rt.binary_op(BinaryOp::Add, Value::Int(2), Value::Int(3)).unwrap(), Value::Int(5)));
    // classic `/` on ints floors
    assert!(matches!(rt.binary_op(BinaryOp::Div, Value::Int(7), Value::Int(2)).unwrap(), Value::Int(3)));
    assert!(matches!(rt.binary_op(BinaryOp::Div, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-4)));
    // true division produces a float
    assert!(matches!(
        rt.binary_op(BinaryOp::TrueDiv, Value::Int(7), Value::Int(2)).unwrap(),
        Value::Float(f) if f == 3.5
    ));
    // modulo takes the divisor's sign
    assert!(matches!(rt.binary_op(BinaryOp::Mod, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(1)));

    let err = rt.binary_op(BinaryOp::Div, Value::Int(1), Value::Int(0)).unwrap_err();
    assert_eq!(Exception::from(err).exc_type(), ExcType::ZeroDivisionError);
}

#[test]
fn integer_overflow_promotes_to_long() {
    let mut rt = Runtime::default();
    let result = rt.binary_op(BinaryOp::Add, Value::Int(i64::MAX), Value::Int(1)).unwrap();
    match rt.to_object(result) {
        Object::BigInt(big) => {
            assert_eq!(big, num_bigint::BigInt::from(i64::MAX) + 1);
        }
        other => panic!("expected a long, got {other:?}"),
    }
    // and the long repr carries the 2.x suffix
    let repr = rt.py_repr(result).unwrap();
    assert!(repr.ends_with('L'));
}

#[test]
fn sequence_concat_and_repeat() {
    let mut rt = Runtime::default();
    let hello = rt.alloc_str("hel").unwrap();
    let world = rt.alloc_str("lo").unwrap();
    let joined = rt.binary_op(BinaryOp::Add, hello, world).unwrap();
    assert_eq!(rt.to_object(joined), Object::String("hello".to_owned()));

    let l1 = rt.alloc_list(vec![Value::Int(1)]).unwrap();
    let l2 = rt.alloc_list(vec![Value::Int(2)]).unwrap();
    let joined = rt.binary_op(BinaryOp::Add, l1, l2).unwrap();
    assert_eq!(rt.to_object(joined), Object::List(vec![Object::Int(1), Object::Int(2)]));

    let ab = rt.alloc_str("ab").unwrap();
    let repeated = rt.binary_op(BinaryOp::Mul, ab, Value::Int(3)).unwrap();
    assert_eq!(rt.to_object(repeated), Object::String("ababab".to_owned()));
}

fn neg_marker(_rt: &mut Runtime, _frame: &mut Frame) -> RunResult<Value> {
    Ok(Value::Int(-1000))
}

#[test]
fn unary_operators_dispatch_and_error() {
    let mut rt = Runtime::default();
    assert!(matches!(rt.unary_op(UnaryOp::Neg, Value::Int(5)).unwrap(), Value::Int(-5)));
    assert!(matches!(rt.unary_op(UnaryOp::Invert, Value::Int(0)).unwrap(), Value::Int(-1)));

    let sig = Signature::positional(vec![rt.intern("self")]);
    let neg = rt.register_function("__neg__", sig, vec![], neg_marker);
    let cls = class_with(&mut rt, "N", &[], &[("__neg__", neg)]);
    let inst = instantiate(&mut rt, cls);
    assert!(matches!(rt.unary_op(UnaryOp::Neg, inst).unwrap(), Value::Int(-1000)));

    let err = rt.unary_op(UnaryOp::Invert, Value::Float(1.5)).unwrap_err();
    let exc = Exception::from(err);
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert_eq!(exc.message().unwrap(), "bad operand type for unary ~: 'float'");
}

#[test]
fn numeric_cross_type_equality() {
    let mut rt = Runtime::default();
    assert!(matches!(
        rt.compare_op(CompareOp::Eq, Value::Int(1), Value::Float(1.0)).unwrap(),
        Value::Bool(true)
    ));
    assert!(matches!(
        rt.compare_op(CompareOp::Eq, Value::Bool(true), Value::Int(1)).unwrap(),
        Value::Bool(true)
    ));
    assert!(matches!(
        rt.compare_op(CompareOp::Lt, Value::Int(1), Value::Float(1.5)).unwrap(),
        Value::Bool(true)
    ));
    // NaN is unequal to everything, including itself
    assert!(matches!(
        rt.compare_op(CompareOp::Eq, Value::Float(f64::NAN), Value::Float(f64::NAN)).unwrap(),
        Value::Bool(false)
    ));
}
