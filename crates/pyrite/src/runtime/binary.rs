//! Binary and in-place operator dispatch.
//!
//! Native numeric/sequence fast paths run first; everything else goes
//! through the dunder protocol with reflected fallback:
//!
//! 1. if the right operand's type is a proper subclass of the left's *and*
//!    overrides the reflected dunder with a distinct implementation, the
//!    reflected form runs first,
//! 2. otherwise the forward dunder runs; `NotImplemented` (or absence)
//!    passes control to the reflected form,
//! 3. both declining raises `TypeError`.
//!
//! In-place operators try `__iop__` and fall through to the binary
//! protocol when it is absent or declines.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    heap::HeapData,
    intern::StaticStrings,
    resource::ResourceTracker,
    runtime::Runtime,
    types::{LongInt, Str},
    value::Value,
};

/// The binary operators of the dispatcher.
///
/// `Div` is classic division (`/` without future-division); `TrueDiv` is
/// the `__truediv__` form the compiler selects under future division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
    Xor,
    LShift,
    RShift,
}

impl BinaryOp {
    /// The operator's surface syntax, for error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div | Self::TrueDiv => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "** or pow()",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::LShift => "<<",
            Self::RShift => ">>",
        }
    }

    fn dunder(self) -> StaticStrings {
        match self {
            Self::Add => StaticStrings::DunderAdd,
            Self::Sub => StaticStrings::DunderSub,
            Self::Mul => StaticStrings::DunderMul,
            Self::Div => StaticStrings::DunderDiv,
            Self::TrueDiv => StaticStrings::DunderTruediv,
            Self::FloorDiv => StaticStrings::DunderFloordiv,
            Self::Mod => StaticStrings::DunderMod,
            Self::Pow => StaticStrings::DunderPow,
            Self::And => StaticStrings::DunderAnd,
            Self::Or => StaticStrings::DunderOr,
            Self::Xor => StaticStrings::DunderXor,
            Self::LShift => StaticStrings::DunderLshift,
            Self::RShift => StaticStrings::DunderRshift,
        }
    }

    fn reflected(self) -> StaticStrings {
        match self {
            Self::Add => StaticStrings::DunderRadd,
            Self::Sub => StaticStrings::DunderRsub,
            Self::Mul => StaticStrings::DunderRmul,
            Self::Div => StaticStrings::DunderRdiv,
            Self::TrueDiv => StaticStrings::DunderRtruediv,
            Self::FloorDiv => StaticStrings::DunderRfloordiv,
            Self::Mod => StaticStrings::DunderRmod,
            Self::Pow => StaticStrings::DunderRpow,
            Self::And => StaticStrings::DunderRand,
            Self::Or => StaticStrings::DunderRor,
            Self::Xor => StaticStrings::DunderRxor,
            Self::LShift => StaticStrings::DunderRlshift,
            Self::RShift => StaticStrings::DunderRrshift,
        }
    }

    fn inplace(self) -> StaticStrings {
        match self {
            Self::Add => StaticStrings::DunderIadd,
            Self::Sub => StaticStrings::DunderIsub,
            Self::Mul => StaticStrings::DunderImul,
            Self::Div => StaticStrings::DunderIdiv,
            Self::TrueDiv => StaticStrings::DunderItruediv,
            Self::FloorDiv => StaticStrings::DunderIfloordiv,
            Self::Mod => StaticStrings::DunderImod,
            Self::Pow => StaticStrings::DunderIpow,
            Self::And => StaticStrings::DunderIand,
            Self::Or => StaticStrings::DunderIor,
            Self::Xor => StaticStrings::DunderIxor,
            Self::LShift => StaticStrings::DunderIlshift,
            Self::RShift => StaticStrings::DunderIrshift,
        }
    }
}

/// A numeric operand lifted out of the value representation.
pub(crate) enum NumOperand {
    Int(i64),
    Big(BigInt),
    Float(f64),
}

impl<T: ResourceTracker> Runtime<T> {
    /// `a op b`.
    pub fn binary_op(&mut self, op: BinaryOp, a: Value, b: Value) -> RunResult<Value> {
        if let Some(result) = self.native_binary(op, &a, &b)? {
            return Ok(result);
        }

        let forward = op.dunder();
        let reflected = op.reflected();

        let a_cls = self.class_id_of(&a)?;
        let b_cls = self.class_id_of(&b)?;

        // subclass right-operand precedence fires only when the right type
        // overrides the reflected operator with a distinct implementation
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

        let lhs = a.type_name(&self.heap, &self.interns).into_owned();
        let rhs = b.type_name(&self.heap, &self.interns).into_owned();
        Err(ExcType::binary_type_error(op.symbol(), lhs, rhs))
    }

    /// `a op= b`: `__iop__`, falling through to the binary protocol.
    pub fn inplace_op(&mut self, op: BinaryOp, a: Value, b: Value) -> RunResult<Value> {
        if let Some(result) = self.call_type_dunder(a, op.inplace(), ArgValues::One(b))? {
            if !matches!(result, Value::NotImplemented) {
                return Ok(result);
            }
        }
        self.binary_op(op, a, b)
    }

    pub(crate) fn num_operand(&self, v: &Value) -> Option<NumOperand> {
        match v {
            Value::Bool(b) => Some(NumOperand::Int(i64::from(*b))),
            Value::Int(i) => Some(NumOperand::Int(*i)),
            Value::Float(f) => Some(NumOperand::Float(*f)),
            Value::Ref(id) => match self.heap.get(*id) {
                HeapData::LongInt(li) => Some(NumOperand::Big(li.inner().clone())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Builtin payload fast paths. `None` hands control to the dunder
    /// protocol.
    fn native_binary(&mut self, op: BinaryOp, a: &Value, b: &Value) -> RunResult<Option<Value>> {
        // sequence concatenation and repetition
        match op {
            BinaryOp::Add => {
                if let Some(result) = self.native_concat(a, b)? {
                    return Ok(Some(result));
                }
            }
            BinaryOp::Mul => {
                if let Some(result) = self.native_repeat(a, b)? {
                    return Ok(Some(result));
                }
            }
            _ => {}
        }

        let (Some(lhs), Some(rhs)) = (self.num_operand(a), self.num_operand(b)) else {
            return Ok(None);
        };
        // bitwise operators have no float form; let dunder dispatch report
        // the real operand types
        if matches!(
            op,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::LShift | BinaryOp::RShift
        ) && (matches!(lhs, NumOperand::Float(_)) || matches!(rhs, NumOperand::Float(_)))
        {
            return Ok(None);
        }
        self.numeric_binary(op, lhs, rhs).map(Some)
    }

    fn numeric_binary(&mut self, op: BinaryOp, lhs: NumOperand, rhs: NumOperand) -> RunResult<Value> {
        use NumOperand::{Big, Float, Int};

        // float contaminates; otherwise promote to BigInt only on demand
        match (lhs, rhs) {
            (Int(a), Int(b)) => self.int_binary(op, a, b),
            (Big(a), Int(b)) => self.big_binary(op, a, BigInt::from(b)),
            (Int(a), Big(b)) => self.big_binary(op, BigInt::from(a), b),
            (Big(a), Big(b)) => self.big_binary(op, a, b),
            (Float(a), Float(b)) => self.float_binary(op, a, b),
            (Float(a), Int(b)) => self.float_binary(op, a, b as f64),
            (Int(a), Float(b)) => self.float_binary(op, a as f64, b),
            (Float(a), Big(b)) => self.float_binary(op, a, big_to_f64(&b)?),
            (Big(a), Float(b)) => self.float_binary(op, big_to_f64(&a)?, b),
        }
    }

    fn int_binary(&mut self, op: BinaryOp, a: i64, b: i64) -> RunResult<Value> {
        let overflowed = |this: &mut Self, op| this.big_binary(op, BigInt::from(a), BigInt::from(b));
        match op {
            BinaryOp::Add => match a.checked_add(b) {
                Some(v) => Ok(Value::Int(v)),
                None => overflowed(self, op),
            },
            BinaryOp::Sub => match a.checked_sub(b) {
                Some(v) => Ok(Value::Int(v)),
                None => overflowed(self, op),
            },
            BinaryOp::Mul => match a.checked_mul(b) {
                Some(v) => Ok(Value::Int(v)),
                None => overflowed(self, op),
            },
            // classic division on ints floors
            BinaryOp::Div | BinaryOp::FloorDiv => {
                if b == 0 {
                    return Err(ExcType::zero_division("integer division or modulo by zero"));
                }
                if a == i64::MIN && b == -1 {
                    return overflowed(self, op);
                }
                Ok(Value::Int(Integer::div_floor(&a, &b)))
            }
            BinaryOp::TrueDiv => {
                if b == 0 {
                    return Err(ExcType::zero_division("division by zero"));
                }
                Ok(Value::Float(a as f64 / b as f64))
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(ExcType::zero_division("integer division or modulo by zero"));
                }
                Ok(Value::Int(Integer::mod_floor(&a, &b)))
            }
            BinaryOp::Pow => {
                if b < 0 {
                    return self.float_binary(op, a as f64, b as f64);
                }
                match u32::try_from(b).ok().and_then(|e| a.checked_pow(e)) {
                    Some(v) => Ok(Value::Int(v)),
                    None => overflowed(self, op),
                }
            }
            BinaryOp::And => Ok(Value::Int(a & b)),
            BinaryOp::Or => Ok(Value::Int(a | b)),
            BinaryOp::Xor => Ok(Value::Int(a ^ b)),
            BinaryOp::LShift => {
                if b < 0 {
                    return Err(ExcType::value_error("negative shift count"));
                }
                match u32::try_from(b).ok().and_then(|s| a.checked_shl(s).filter(|v| v >> s == a)) {
                    Some(v) => Ok(Value::Int(v)),
                    None => overflowed(self, op),
                }
            }
            BinaryOp::RShift => {
                if b < 0 {
                    return Err(ExcType::value_error("negative shift count"));
                }
                let shift = u32::try_from(b).unwrap_or(63).min(63);
                Ok(Value::Int(a >> shift))
            }
        }
    }

    fn big_binary(&mut self, op: BinaryOp, a: BigInt, b: BigInt) -> RunResult<Value> {
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div | BinaryOp::FloorDiv => {
                if b.is_zero() {
                    return Err(ExcType::zero_division("integer division or modulo by zero"));
                }
                a.div_floor(&b)
            }
            BinaryOp::TrueDiv => {
                if b.is_zero() {
                    return Err(ExcType::zero_division("division by zero"));
                }
                return Ok(Value::Float(big_to_f64(&a)? / big_to_f64(&b)?));
            }
            BinaryOp::Mod => {
                if b.is_zero() {
                    return Err(ExcType::zero_division("integer division or modulo by zero"));
                }
                a.mod_floor(&b)
            }
            BinaryOp::Pow => {
                if b.is_negative() {
                    return self.float_binary(op, big_to_f64(&a)?, big_to_f64(&b)?);
                }
                let Some(exp) = b.to_u32() else {
                    return Err(ExcType::value_error("exponent too large"));
                };
                a.pow(exp)
            }
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
            BinaryOp::LShift => {
                if b.is_negative() {
                    return Err(ExcType::value_error("negative shift count"));
                }
                let Some(shift) = b.to_u64() else {
                    return Err(ExcType::value_error("shift count too large"));
                };
                a << shift
            }
            BinaryOp::RShift => {
                if b.is_negative() {
                    return Err(ExcType::value_error("negative shift count"));
                }
                let Some(shift) = b.to_u64() else {
                    return Err(ExcType::value_error("shift count too large"));
                };
                a >> shift
            }
        };
        LongInt::new(result).into_value(&mut self.heap)
    }

    fn float_binary(&mut self, op: BinaryOp, a: f64, b: f64) -> RunResult<Value> {
        match op {
            BinaryOp::Add => Ok(Value::Float(a + b)),
            BinaryOp::Sub => Ok(Value::Float(a - b)),
            BinaryOp::Mul => Ok(Value::Float(a * b)),
            BinaryOp::Div | BinaryOp::TrueDiv => {
                if b == 0.0 {
                    return Err(ExcType::zero_division("float division by zero"));
                }
                Ok(Value::Float(a / b))
            }
            BinaryOp::FloorDiv => {
                if b == 0.0 {
                    return Err(ExcType::zero_division("float divmod()"));
                }
                Ok(Value::Float((a / b).floor()))
            }
            BinaryOp::Mod => {
                if b == 0.0 {
                    return Err(ExcType::zero_division("float modulo"));
                }
                // sign follows the divisor
                let mut r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r += b;
                }
                Ok(Value::Float(r))
            }
            BinaryOp::Pow => Ok(Value::Float(a.powf(b))),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::LShift | BinaryOp::RShift => {
                Err(ExcType::binary_type_error(op.symbol(), "float", "float"))
            }
        }
    }

    fn native_concat(&mut self, a: &Value, b: &Value) -> RunResult<Option<Value>> {
        if let (Some(s1), Some(s2)) = (
            a.as_str(&self.heap, &self.interns),
            b.as_str(&self.heap, &self.interns),
        ) {
            let joined = format!("{s1}{s2}");
            let id = self.heap.allocate(HeapData::Str(Str::new(joined)))?;
            return Ok(Some(Value::Ref(id)));
        }
        if let (Value::Ref(id1), Value::Ref(id2)) = (a, b) {
            let combined = match (self.heap.get(*id1), self.heap.get(*id2)) {
                (HeapData::List(l1), HeapData::List(l2)) => {
                    let mut items = l1.as_vec().to_vec();
                    items.extend_from_slice(l2.as_vec());
                    Some((items, true))
                }
                (HeapData::Tuple(t1), HeapData::Tuple(t2)) => {
                    let mut items = t1.as_vec().to_vec();
                    items.extend_from_slice(t2.as_vec());
                    Some((items, false))
                }
                _ => None,
            };
            if let Some((items, is_list)) = combined {
                let value = if is_list {
                    self.alloc_list(items)?
                } else {
                    self.alloc_tuple(items)?
                };
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn native_repeat(&mut self, a: &Value, b: &Value) -> RunResult<Option<Value>> {
        // sequence * int, either operand order
        let (seq, count) = match (self.num_operand(a), self.num_operand(b)) {
            (Some(NumOperand::Int(n)), None) => (b, n),
            (None, Some(NumOperand::Int(n))) => (a, n),
            _ => return Ok(None),
        };
        let count = count.max(0) as usize;
        if let Some(s) = seq.as_str(&self.heap, &self.interns) {
            let repeated = s.repeat(count);
            let id = self.heap.allocate(HeapData::Str(Str::new(repeated)))?;
            return Ok(Some(Value::Ref(id)));
        }
        if let Value::Ref(id) = seq {
            let items = match self.heap.get(*id) {
                HeapData::List(l) => Some((l.as_vec().to_vec(), true)),
                HeapData::Tuple(t) => Some((t.as_vec().to_vec(), false)),
                _ => None,
            };
            if let Some((base, is_list)) = items {
                let mut repeated = Vec::with_capacity(base.len() * count);
                for _ in 0..count {
                    repeated.extend_from_slice(&base);
                }
                let value = if is_list {
                    self.alloc_list(repeated)?
                } else {
                    self.alloc_tuple(repeated)?
                };
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

fn big_to_f64(value: &BigInt) -> RunResult<f64> {
    value
        .to_f64()
        .ok_or_else(|| ExcType::value_error("int too large to convert to float"))
}
