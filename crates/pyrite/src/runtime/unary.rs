//! Unary operator dispatch and truth testing.

use num_traits::ToPrimitive;

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    intern::StaticStrings,
    resource::ResourceTracker,
    runtime::{Runtime, binary::NumOperand},
    types::LongInt,
    value::Value,
};

/// The unary operators of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
}

impl UnaryOp {
    /// The operator's surface syntax, for error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Pos => "+",
            Self::Invert => "~",
        }
    }

    fn dunder(self) -> StaticStrings {
        match self {
            Self::Neg => StaticStrings::DunderNeg,
            Self::Pos => StaticStrings::DunderPos,
            Self::Invert => StaticStrings::DunderInvert,
        }
    }
}

impl<T: ResourceTracker> Runtime<T> {
    /// `op a`.
    pub fn unary_op(&mut self, op: UnaryOp, a: Value) -> RunResult<Value> {
        if let Some(operand) = self.num_operand(&a) {
            match (op, operand) {
                (UnaryOp::Neg, NumOperand::Int(i)) => {
                    return match i.checked_neg() {
                        Some(v) => Ok(Value::Int(v)),
                        None => LongInt::new(-num_bigint::BigInt::from(i)).into_value(&mut self.heap),
                    };
                }
                (UnaryOp::Neg, NumOperand::Big(b)) => return LongInt::new(-b).into_value(&mut self.heap),
                (UnaryOp::Neg, NumOperand::Float(f)) => return Ok(Value::Float(-f)),
                (UnaryOp::Pos, NumOperand::Int(i)) => return Ok(Value::Int(i)),
                (UnaryOp::Pos, NumOperand::Big(b)) => return LongInt::new(b).into_value(&mut self.heap),
                (UnaryOp::Pos, NumOperand::Float(f)) => return Ok(Value::Float(f)),
                (UnaryOp::Invert, NumOperand::Int(i)) => return Ok(Value::Int(!i)),
                (UnaryOp::Invert, NumOperand::Big(b)) => return LongInt::new(!b).into_value(&mut self.heap),
                // ~float has no meaning; fall through to dunder dispatch
                (UnaryOp::Invert, NumOperand::Float(_)) => {}
            }
        }

        if let Some(result) = self.call_type_dunder(a, op.dunder(), ArgValues::Empty)? {
            return Ok(result);
        }
        let type_name = a.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::unary_type_error(op.symbol(), type_name))
    }

    /// Truth testing: builtin payloads answer directly, instances dispatch
    /// `__nonzero__` then `__len__`, and everything else is true.
    pub fn py_bool(&mut self, v: Value) -> RunResult<bool> {
        if let Some(b) = v.truthy_builtin(&self.heap, &self.interns) {
            return Ok(b);
        }
        if let Some(result) = self.call_type_dunder(v, StaticStrings::DunderNonzero, ArgValues::Empty)? {
            return match result {
                Value::Bool(b) => Ok(b),
                Value::Int(i) => Ok(i != 0),
                _ => Err(ExcType::type_error("__nonzero__ should return an int")),
            };
        }
        if let Some(result) = self.call_type_dunder(v, StaticStrings::DunderLen, ArgValues::Empty)? {
            return match result {
                Value::Int(len) => Ok(len != 0),
                Value::Ref(id) => match self.heap.get(id) {
                    crate::heap::HeapData::LongInt(li) => Ok(li.inner().to_i64().is_none_or(|i| i != 0)),
                    _ => Err(ExcType::type_error("an integer is required")),
                },
                _ => Err(ExcType::type_error("an integer is required")),
            };
        }
        Ok(true)
    }
}
