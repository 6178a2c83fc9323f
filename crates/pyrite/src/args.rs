//! Call-site argument containers.
//!
//! Dedicated variants for zero/one/two positional arguments keep the vast
//! majority of calls off the allocator; the general shape carries a
//! positional vector plus keyword values.

use std::vec::IntoIter;

use crate::{
    exception_private::{ExcType, RunResult},
    intern::StringId,
    value::Value,
};

/// Arguments of one call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ArgValues {
    Empty,
    One(Value),
    Two(Value, Value),
    ArgsKargs {
        args: Vec<Value>,
        kwargs: KwargsValues,
    },
}

impl ArgValues {
    /// Builds the argument shape from a positional vector and keywords.
    #[must_use]
    pub fn new(args: Vec<Value>, kwargs: KwargsValues) -> Self {
        if kwargs.is_empty() {
            let mut iter = args.into_iter();
            match (iter.next(), iter.next(), iter.next()) {
                (None, ..) => Self::Empty,
                (Some(a), None, _) => Self::One(a),
                (Some(a), Some(b), None) => Self::Two(a, b),
                (Some(a), Some(b), Some(c)) => {
                    let mut rest = vec![a, b, c];
                    rest.extend(iter);
                    Self::ArgsKargs {
                        args: rest,
                        kwargs: KwargsValues::Empty,
                    }
                }
            }
        } else {
            Self::ArgsKargs { args, kwargs }
        }
    }

    /// Number of positional arguments.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::One(_) => 1,
            Self::Two(_, _) => 2,
            Self::ArgsKargs { args, .. } => args.len(),
        }
    }

    /// Prepends a positional argument (bound-method receiver insertion).
    #[must_use]
    pub fn prepend(self, first: Value) -> Self {
        match self {
            Self::Empty => Self::One(first),
            Self::One(a) => Self::Two(first, a),
            Self::Two(a, b) => Self::ArgsKargs {
                args: vec![first, a, b],
                kwargs: KwargsValues::Empty,
            },
            Self::ArgsKargs { mut args, kwargs } => {
                args.insert(0, first);
                Self::ArgsKargs { args, kwargs }
            }
        }
    }

    /// Splits into a positional iterator and keyword values without
    /// allocating for the common shapes.
    #[must_use]
    pub(crate) fn into_parts(self) -> (ArgPosIter, KwargsValues) {
        match self {
            Self::Empty => (ArgPosIter::Empty, KwargsValues::Empty),
            Self::One(v) => (ArgPosIter::One(Some(v)), KwargsValues::Empty),
            Self::Two(v1, v2) => (ArgPosIter::Two(Some(v1), Some(v2)), KwargsValues::Empty),
            Self::ArgsKargs { args, kwargs } => (ArgPosIter::Vec(args.into_iter()), kwargs),
        }
    }

    /// Checks that zero arguments were passed.
    pub(crate) fn check_zero_args(self, name: &str) -> RunResult<()> {
        match self {
            Self::Empty => Ok(()),
            other => Err(ExcType::type_error_no_args(name, other.count())),
        }
    }

    /// Checks that exactly one positional argument was passed.
    pub(crate) fn get_one_arg(self, name: &str) -> RunResult<Value> {
        match self {
            Self::One(a) => Ok(a),
            other => Err(ExcType::type_error_arg_count(name, 1, other.count())),
        }
    }

    /// Checks that exactly two positional arguments were passed.
    pub(crate) fn get_two_args(self, name: &str) -> RunResult<(Value, Value)> {
        match self {
            Self::Two(a, b) => Ok((a, b)),
            other => Err(ExcType::type_error_arg_count(name, 2, other.count())),
        }
    }

    /// Checks that exactly three positional arguments were passed.
    pub(crate) fn get_three_args(self, name: &str) -> RunResult<(Value, Value, Value)> {
        match self {
            Self::ArgsKargs { args, kwargs } if args.len() == 3 && kwargs.is_empty() => {
                let mut iter = args.into_iter();
                let a = iter.next().expect("length checked");
                let b = iter.next().expect("length checked");
                let c = iter.next().expect("length checked");
                Ok((a, b, c))
            }
            other => Err(ExcType::type_error_arg_count(name, 3, other.count())),
        }
    }

    /// Checks that between one and three positional arguments were passed.
    pub(crate) fn get_one_to_three_args(self, name: &str) -> RunResult<(Value, Option<Value>, Option<Value>)> {
        match self {
            Self::One(a) => Ok((a, None, None)),
            Self::Two(a, b) => Ok((a, Some(b), None)),
            Self::ArgsKargs { args, kwargs } if args.len() == 3 && kwargs.is_empty() => {
                let mut iter = args.into_iter();
                let a = iter.next().expect("length checked");
                let b = iter.next().expect("length checked");
                let c = iter.next().expect("length checked");
                Ok((a, Some(b), Some(c)))
            }
            other => {
                let count = other.count();
                if count == 0 {
                    Err(ExcType::type_error_at_least(name, 1, count))
                } else {
                    Err(ExcType::type_error_at_most(name, 3, count))
                }
            }
        }
    }
}

/// Iterator over positional arguments without allocation.
pub(crate) enum ArgPosIter {
    Empty,
    One(Option<Value>),
    Two(Option<Value>, Option<Value>),
    Vec(IntoIter<Value>),
}

impl Iterator for ArgPosIter {
    type Item = Value;

    #[inline]
    fn next(&mut self) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::One(v) => v.take(),
            Self::Two(v1, v2) => v1.take().or_else(|| v2.take()),
            Self::Vec(iter) => iter.next(),
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Empty => (0, Some(0)),
            Self::One(v) => {
                let n = usize::from(v.is_some());
                (n, Some(n))
            }
            Self::Two(v1, v2) => {
                let n = usize::from(v1.is_some()) + usize::from(v2.is_some());
                (n, Some(n))
            }
            Self::Vec(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for ArgPosIter {}

/// Keyword arguments of one call.
///
/// Inline entries come from explicit `name=value` syntax; the pairs form
/// carries a `**kwargs` unpacking with arbitrary (string-valued) keys.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum KwargsValues {
    Empty,
    Inline(Vec<(StringId, Value)>),
    Pairs(Vec<(Value, Value)>),
}

impl KwargsValues {
    /// Number of keyword arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Inline(kvs) => kvs.len(),
            Self::Pairs(pairs) => pairs.len(),
        }
    }

    /// Whether there are no keyword arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntoIterator for KwargsValues {
    type Item = (Value, Value);
    type IntoIter = KwargsValuesIter;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::Empty => KwargsValuesIter::Empty,
            Self::Inline(kvs) => KwargsValuesIter::Inline(kvs.into_iter()),
            Self::Pairs(pairs) => KwargsValuesIter::Pairs(pairs.into_iter()),
        }
    }
}

/// Iterator over keyword argument pairs.
pub enum KwargsValuesIter {
    Empty,
    Inline(IntoIter<(StringId, Value)>),
    Pairs(IntoIter<(Value, Value)>),
}

impl Iterator for KwargsValuesIter {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Empty => None,
            Self::Inline(iter) => iter.next().map(|(k, v)| (Value::InternString(k), v)),
            Self::Pairs(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Empty => (0, Some(0)),
            Self::Inline(iter) => iter.size_hint(),
            Self::Pairs(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for KwargsValuesIter {}
