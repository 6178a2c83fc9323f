//! Slice objects produced by extended subscription syntax.

use crate::value::Value;

/// A Python slice: `start:stop:step` with absent bounds stored as `None`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct Slice {
    pub start: Value,
    pub stop: Value,
    pub step: Value,
}

impl Slice {
    #[must_use]
    pub fn new(start: Value, stop: Value, step: Value) -> Self {
        Self { start, stop, step }
    }

    /// Resolves the slice against a sequence length, producing
    /// `(start, stop, step)` indices clamped the way the reference runtime
    /// clamps them. Only integer (or absent) bounds are supported here;
    /// richer index types go through `__index__` in the layer above.
    pub fn indices(&self, len: usize) -> Option<(i64, i64, i64)> {
        let step = match self.step {
            Value::None => 1,
            Value::Int(s) if s != 0 => s,
            _ => return None,
        };
        let len = len as i64;
        let (default_start, default_stop) = if step > 0 { (0, len) } else { (len - 1, -len - 1) };

        let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi);
        let resolve = |bound: Value, default: i64| -> Option<i64> {
            match bound {
                Value::None => Some(default),
                Value::Int(i) if i < 0 => Some(if step > 0 {
                    clamp(i + len, 0, len)
                } else {
                    clamp(i + len, -1, len - 1)
                }),
                Value::Int(i) => Some(if step > 0 {
                    clamp(i, 0, len)
                } else {
                    clamp(i, -1, len - 1)
                }),
                _ => None,
            }
        };

        let start = resolve(self.start, default_start)?;
        let stop = resolve(self.stop, default_stop)?;
        Some((start, stop, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_slice_clamps_to_length() {
        let slice = Slice::new(Value::Int(1), Value::Int(100), Value::None);
        assert_eq!(slice.indices(5), Some((1, 5, 1)));
    }

    #[test]
    fn negative_bounds_wrap() {
        let slice = Slice::new(Value::Int(-3), Value::None, Value::None);
        assert_eq!(slice.indices(5), Some((2, 5, 1)));
    }

    #[test]
    fn zero_step_is_rejected() {
        let slice = Slice::new(Value::None, Value::None, Value::Int(0));
        assert_eq!(slice.indices(5), None);
    }
}
