//! Comparison dispatch.
//!
//! Rich comparisons follow the binary protocol with the reflection map
//! `{lt↔gt, le↔ge, eq↔eq, ne↔ne}`. Equality and inequality carry an
//! ultimate identity fallback so they never raise; ordering between
//! unrelated types is a `TypeError`.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    heap::HeapData,
    intern::StaticStrings,
    resource::ResourceTracker,
    runtime::{Runtime, binary::NumOperand},
    value::Value,
};

/// The rich comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl CompareOp {
    /// The operator's surface syntax, for error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn dunder(self) -> StaticStrings {
        match self {
            Self::Lt => StaticStrings::DunderLt,
            Self::Le => StaticStrings::DunderLe,
            Self::Eq => StaticStrings::DunderEq,
            Self::Ne => StaticStrings::DunderNe,
            Self::Gt => StaticStrings::DunderGt,
            Self::Ge => StaticStrings::DunderGe,
        }
    }

    /// The dunder consulted on the right operand.
    fn reflected(self) -> StaticStrings {
        match self {
            Self::Lt => StaticStrings::DunderGt,
            Self::Le => StaticStrings::DunderGe,
            Self::Eq => StaticStrings::DunderEq,
            Self::Ne => StaticStrings::DunderNe,
            Self::Gt => StaticStrings::DunderLt,
            Self::Ge => StaticStrings::DunderLe,
        }
    }

    fn of_ordering(self, ord: Ordering) -> bool {
        match self {
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }
}

impl<T: ResourceTracker> Runtime<T> {
    /// `a op b` for the rich comparison operators.
    pub fn compare_op(&mut self, op: CompareOp, a: Value, b: Value) -> RunResult<Value> {
        // numeric pairs compare natively, with NaN unequal to everything
        if let (Some(lhs), Some(rhs)) = (self.num_operand(&a), self.num_operand(&b)) {
            let result = match numeric_ordering(&lhs, &rhs) {
                Some(ord) => op.of_ordering(ord),
                None => matches!(op, CompareOp::Ne),
            };
            return Ok(Value::Bool(result));
        }
        if let Some(ord) = self.native_ordering(&a, &b) {
            return Ok(Value::Bool(op.of_ordering(ord)));
        }
        if matches!(op, CompareOp::Eq | CompareOp::Ne) {
            if let Some(eq) = self.builtin_eq(&a, &b) {
                let result = if op == CompareOp::Eq { eq } else { !eq };
                return Ok(Value::Bool(result));
            }
        }

        let forward = op.dunder();
        let reflected = op.reflected();

        let a_cls = self.class_id_of(&a)?;
        let b_cls = self.class_id_of(&b)?;

        let mut reflected_done = false;
        if self.is_proper_subclass(b_cls, a_cls) {
            let b_origin = self.dunder_origin(b_cls, reflected)?;
            let a_origin = self.dunder_origin(a_cls, reflected)?;
            if b_origin.is_some() && b_origin != a_origin {
                if let Some(result) = self.call_type_dunder(b, reflected, ArgValues::One(a))? {
                    if !matches!(result, Value::NotImplemented) {
                        return Ok(result);
                    }
                }
                reflected_done = true;
            }
        }

        if let Some(result) = self.call_type_dunder(a, forward, ArgValues::One(b))? {
            if !matches!(result, Value::NotImplemented) {
                return Ok(result);
            }
        }
        if !reflected_done {
            if let Some(result) = self.call_type_dunder(b, reflected, ArgValues::One(a))? {
                if !matches!(result, Value::NotImplemented) {
                    return Ok(result);
                }
            }
        }

        // equality never raises: identity is the last word
        match op {
            CompareOp::Eq => Ok(Value::Bool(a.is_same(&b))),
            CompareOp::Ne => Ok(Value::Bool(!a.is_same(&b))),
            _ => {
                let lhs = a.type_name(&self.heap, &self.interns).into_owned();
                let rhs = b.type_name(&self.heap, &self.interns).into_owned();
                Err(ExcType::binary_type_error(op.symbol(), lhs, rhs))
            }
        }
    }

    /// Total ordering for builtin comparable payload pairs.
    fn native_ordering(&self, a: &Value, b: &Value) -> Option<Ordering> {
        if let (Some(lhs), Some(rhs)) = (self.num_operand(a), self.num_operand(b)) {
            return numeric_ordering(&lhs, &rhs);
        }
        if let (Some(s1), Some(s2)) = (
            a.as_str(&self.heap, &self.interns),
            b.as_str(&self.heap, &self.interns),
        ) {
            return Some(s1.cmp(s2));
        }
        if let (Value::Ref(id1), Value::Ref(id2)) = (a, b)
            && let (HeapData::Bytes(b1), HeapData::Bytes(b2)) = (self.heap.get(*id1), self.heap.get(*id2))
        {
            return Some(b1.as_slice().cmp(b2.as_slice()));
        }
        None
    }

    /// Structural equality for builtin payloads; `None` hands control to
    /// the dunder protocol (instances are involved somewhere).
    pub(crate) fn builtin_eq(&self, a: &Value, b: &Value) -> Option<bool> {
        if let Some(ord) = self.native_ordering(a, b) {
            return Some(ord == Ordering::Equal);
        }
        match (a, b) {
            (Value::None, Value::None)
            | (Value::Ellipsis, Value::Ellipsis)
            | (Value::NotImplemented, Value::NotImplemented) => Some(true),
            (Value::Builtin(x), Value::Builtin(y)) => Some(x == y),
            (Value::DefFunction(x), Value::DefFunction(y)) => Some(x == y),
            (Value::HostFunction(x), Value::HostFunction(y)) => Some(x == y),
            (Value::Proxy(x), Value::Proxy(y)) => Some(x == y),
            (Value::Ref(id1), Value::Ref(id2)) => {
                if id1 == id2 {
                    return Some(true);
                }
                match (self.heap.get(*id1), self.heap.get(*id2)) {
                    (HeapData::List(l1), HeapData::List(l2)) => {
                        self.sequences_eq(l1.as_vec(), l2.as_vec())
                    }
                    (HeapData::Tuple(t1), HeapData::Tuple(t2)) => {
                        self.sequences_eq(t1.as_vec(), t2.as_vec())
                    }
                    (HeapData::Dict(d1), HeapData::Dict(d2)) => {
                        if d1.len() != d2.len() {
                            return Some(false);
                        }
                        for (k, v1) in d1.iter() {
                            let v2 = match d2.get(k, &self.heap, &self.interns) {
                                Ok(Some(v)) => v,
                                Ok(None) => return Some(false),
                                Err(_) => return None,
                            };
                            match self.builtin_eq(v1, &v2) {
                                Some(true) => {}
                                Some(false) => return Some(false),
                                None => return None,
                            }
                        }
                        Some(true)
                    }
                    (HeapData::Instance(_), _) | (_, HeapData::Instance(_)) => None,
                    _ => Some(false),
                }
            }
            // distinct tags with no numeric/string overlap are plainly unequal
            (Value::Ref(id), _) | (_, Value::Ref(id)) => {
                if matches!(self.heap.get(*id), HeapData::Instance(_)) {
                    None
                } else {
                    Some(false)
                }
            }
            _ => Some(false),
        }
    }

    fn sequences_eq(&self, a: &[Value], b: &[Value]) -> Option<bool> {
        if a.len() != b.len() {
            return Some(false);
        }
        for (x, y) in a.iter().zip(b) {
            match self.builtin_eq(x, y) {
                Some(true) => {}
                Some(false) => return Some(false),
                None => return None,
            }
        }
        Some(true)
    }
}

fn numeric_ordering(lhs: &NumOperand, rhs: &NumOperand) -> Option<Ordering> {
    use NumOperand::{Big, Float, Int};
    match (lhs, rhs) {
        (Int(a), Int(b)) => Some(a.cmp(b)),
        (Big(a), Big(b)) => Some(a.cmp(b)),
        (Int(a), Big(b)) => Some(BigInt::from(*a).cmp(b)),
        (Big(a), Int(b)) => Some(a.cmp(&BigInt::from(*b))),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
        (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
        (Big(a), Float(b)) => a.to_f64()?.partial_cmp(b),
        (Float(a), Big(b)) => a.partial_cmp(&b.to_f64()?),
    }
}
