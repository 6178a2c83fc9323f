//! Function signatures and the argument binding algorithm.
//!
//! A signature carries positional-or-keyword parameters, an optional
//! `*args` collector, keyword-only parameters and an optional `**kwargs`
//! collector. Binding lays arguments out into a flat namespace vector:
//!
//! ```text
//! [args][*args slot?][kwonly][**kwargs slot?]
//! ```
//!
//! Default values are evaluated at registration time and stored with the
//! function; the signature tracks only counts and the keyword-only default
//! map.

use crate::{
    args::{ArgValues, KwargsValues},
    exception_private::{ExcType, RunResult},
    heap::{Heap, HeapData},
    intern::{Interns, StringId},
    resource::ResourceTracker,
    types::{Dict, allocate_tuple},
    value::Value,
};

/// How simple the signature is; picks the binding fast path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
enum BindMode {
    /// No defaults, no `*args`/`**kwargs`, no keyword-only parameters.
    #[default]
    Simple,
    /// Only positional-or-keyword parameters, some with defaults.
    SimpleWithDefaults,
    Complex,
}

/// A function's parameter specification.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Signature {
    /// Positional-or-keyword parameter names.
    args: Vec<StringId>,
    /// How many of `args` (from the end) have defaults.
    arg_defaults_count: usize,
    /// `*args` collector name, if present.
    var_args: Option<StringId>,
    /// Keyword-only parameter names.
    kwonly: Vec<StringId>,
    /// Per keyword-only parameter: index into the kwonly section of the
    /// defaults array, or `None` when required.
    kwonly_default_map: Vec<Option<usize>>,
    /// `**kwargs` collector name, if present.
    var_kwargs: Option<StringId>,
    bind_mode: BindMode,
}

impl Signature {
    /// Creates a full signature.
    #[must_use]
    pub fn new(
        args: Vec<StringId>,
        arg_defaults_count: usize,
        var_args: Option<StringId>,
        kwonly: Vec<StringId>,
        kwonly_default_map: Vec<Option<usize>>,
        var_kwargs: Option<StringId>,
    ) -> Self {
        let bind_mode = if arg_defaults_count == 0 && var_args.is_none() && kwonly.is_empty() && var_kwargs.is_none() {
            BindMode::Simple
        } else if var_args.is_none() && kwonly.is_empty() && var_kwargs.is_none() {
            BindMode::SimpleWithDefaults
        } else {
            BindMode::Complex
        };
        Self {
            args,
            arg_defaults_count,
            var_args,
            kwonly,
            kwonly_default_map,
            var_kwargs,
            bind_mode,
        }
    }

    /// Creates a signature of plain positional-or-keyword parameters.
    #[must_use]
    pub fn positional(args: Vec<StringId>) -> Self {
        Self::new(args, 0, None, vec![], vec![], None)
    }

    /// Total named parameters (excluding the `*`/`**` collector slots).
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.args.len() + self.kwonly.len()
    }

    /// Total namespace slots, including collector slots.
    #[must_use]
    pub fn total_slots(&self) -> usize {
        self.param_count() + usize::from(self.var_args.is_some()) + usize::from(self.var_kwargs.is_some())
    }

    /// Parameter names in namespace slot order.
    pub fn param_names(&self) -> impl Iterator<Item = StringId> + '_ {
        self.args
            .iter()
            .copied()
            .chain(self.var_args)
            .chain(self.kwonly.iter().copied())
            .chain(self.var_kwargs)
    }

    fn required_positional_count(&self) -> usize {
        self.args.len() - self.arg_defaults_count
    }

    /// Binds call-site arguments into `namespace`.
    ///
    /// Implements the full algorithm: positionals fill parameters in order,
    /// excess goes to `*args` (or errors), keywords bind by name with
    /// duplicate detection, excess keywords go to `**kwargs` (or error),
    /// defaults fill the gaps, and missing required parameters raise.
    pub(crate) fn bind(
        &self,
        args: ArgValues,
        defaults: &[Value],
        heap: &mut Heap<impl ResourceTracker>,
        interns: &Interns,
        func_name: &str,
        namespace: &mut Vec<Value>,
    ) -> RunResult<()> {
        if matches!(self.bind_mode, BindMode::Simple | BindMode::SimpleWithDefaults) {
            // positional-only call shapes skip the general binder entirely
            let leftover = match args {
                ArgValues::Empty => None,
                ArgValues::One(a) => {
                    namespace.push(a);
                    None
                }
                ArgValues::Two(a, b) => {
                    namespace.push(a);
                    namespace.push(b);
                    None
                }
                ArgValues::ArgsKargs { args, kwargs } if kwargs.is_empty() => {
                    namespace.extend(args);
                    None
                }
                other => Some(other),
            };

            match leftover {
                None => {
                    let actual = namespace.len();
                    let params = self.args.len();
                    if actual == params {
                        return Ok(());
                    }
                    let required = self.required_positional_count();
                    if actual >= required && actual < params {
                        let defaults_start = actual - required;
                        namespace.extend_from_slice(&defaults[defaults_start..self.arg_defaults_count]);
                        return Ok(());
                    }
                    namespace.clear();
                    return Err(self.wrong_arg_count_error(actual, interns, func_name));
                }
                Some(args) => return self.bind_complex(args, defaults, heap, interns, func_name, namespace),
            }
        }
        self.bind_complex(args, defaults, heap, interns, func_name, namespace)
    }

    fn bind_complex(
        &self,
        args: ArgValues,
        defaults: &[Value],
        heap: &mut Heap<impl ResourceTracker>,
        interns: &Interns,
        func_name: &str,
        namespace: &mut Vec<Value>,
    ) -> RunResult<()> {
        let (mut pos_iter, keyword_args) = args.into_parts();

        let arg_param_count = self.args.len();
        let positional_count = pos_iter.len();
        let kwonly_given = keyword_args.len();
        if self.var_args.is_none() && positional_count > arg_param_count {
            return Err(ExcType::type_error_too_many_positional(
                func_name,
                arg_param_count,
                positional_count,
                kwonly_given,
            ));
        }

        // Layout: [args][*args?][kwonly][**kwargs?]
        let var_args_offset = usize::from(self.var_args.is_some());
        namespace.clear();
        namespace.resize(self.total_slots(), Value::Undefined);

        // bound-parameter bitmap over [args][kwonly]; 64 named parameters
        // is far beyond any realistic signature
        let mut bound_params: u64 = 0;

        // 1. positionals fill args in order
        for (i, slot) in namespace.iter_mut().enumerate().take(arg_param_count) {
            if let Some(val) = pos_iter.next() {
                *slot = val;
                bound_params |= 1 << i;
            }
        }

        // 2. excess positionals collect into *args
        let excess_positional: Vec<Value> = pos_iter.collect();
        let var_args_value = if self.var_args.is_some() {
            Some(allocate_tuple(excess_positional, heap)?)
        } else {
            None
        };

        // 3. keywords bind by name
        let mut excess_kwargs: Vec<(Value, Value)> = Vec::new();
        for (key, value) in keyword_args {
            let Some(keyword_name) = key.as_str(heap, interns) else {
                return Err(ExcType::type_error_kwargs_nonstring_key());
            };

            if let Some(i) = self
                .args
                .iter()
                .position(|&param| interns.get_str(param) == keyword_name)
            {
                if bound_params & (1 << i) != 0 {
                    return Err(ExcType::type_error_duplicate_arg(func_name, keyword_name));
                }
                namespace[i] = value;
                bound_params |= 1 << i;
                continue;
            }

            if let Some(i) = self
                .kwonly
                .iter()
                .position(|&param| interns.get_str(param) == keyword_name)
            {
                let bit = arg_param_count + i;
                if bound_params & (1 << bit) != 0 {
                    return Err(ExcType::type_error_duplicate_arg(func_name, keyword_name));
                }
                namespace[arg_param_count + var_args_offset + i] = value;
                bound_params |= 1 << bit;
                continue;
            }

            if self.var_kwargs.is_some() {
                excess_kwargs.push((key, value));
            } else {
                return Err(ExcType::type_error_unexpected_keyword(func_name, keyword_name));
            }
        }

        // 4. defaults fill remaining optional parameters
        if self.arg_defaults_count > 0 {
            let first_optional = arg_param_count - self.arg_defaults_count;
            for i in first_optional..arg_param_count {
                if bound_params & (1 << i) == 0 {
                    namespace[i] = defaults[i - first_optional];
                    bound_params |= 1 << i;
                }
            }
        }
        for (i, default_slot) in self.kwonly_default_map.iter().enumerate() {
            if let Some(slot_index) = default_slot {
                let bit = arg_param_count + i;
                if bound_params & (1 << bit) == 0 {
                    namespace[arg_param_count + var_args_offset + i] = defaults[self.arg_defaults_count + slot_index];
                    bound_params |= 1 << bit;
                }
            }
        }

        // 5. every required parameter must now be bound
        let required = self.required_positional_count();
        let missing_positional: Vec<&str> = self
            .args
            .iter()
            .take(required)
            .enumerate()
            .filter(|&(i, _)| bound_params & (1 << i) == 0)
            .map(|(_, &param)| interns.get_str(param))
            .collect();
        if !missing_positional.is_empty() {
            return Err(ExcType::type_error_missing_positional_with_names(
                func_name,
                &missing_positional,
            ));
        }

        let missing_kwonly: Vec<&str> = self
            .kwonly
            .iter()
            .enumerate()
            .filter(|&(i, _)| {
                let has_default = self.kwonly_default_map.get(i).is_some_and(Option::is_some);
                !has_default && bound_params & (1 << (arg_param_count + i)) == 0
            })
            .map(|(_, &param)| interns.get_str(param))
            .collect();
        if !missing_kwonly.is_empty() {
            return Err(ExcType::type_error_missing_kwonly_with_names(func_name, &missing_kwonly));
        }

        // 6. collector slots
        if let Some(var_args_val) = var_args_value {
            namespace[arg_param_count] = var_args_val;
        }
        if self.var_kwargs.is_some() {
            let dict = Dict::from_pairs(excess_kwargs, heap, interns)?;
            let dict_id = heap.allocate(HeapData::Dict(dict))?;
            let last = namespace.len() - 1;
            namespace[last] = Value::Ref(dict_id);
        }

        Ok(())
    }

    /// Error for a positional-only call with the wrong argument count.
    fn wrong_arg_count_error(&self, actual: usize, interns: &Interns, func_name: &str) -> crate::exception_private::RunError {
        let params = self.args.len();
        if actual < params {
            let missing: Vec<&str> = self.args[actual..].iter().map(|&id| interns.get_str(id)).collect();
            ExcType::type_error_missing_positional_with_names(func_name, &missing)
        } else {
            ExcType::type_error_too_many_positional(func_name, params, actual, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exception_private::ExcType, resource::NoLimitTracker};

    fn setup() -> (Heap<NoLimitTracker>, Interns) {
        (Heap::new(NoLimitTracker), Interns::new())
    }

    fn bind(
        sig: &Signature,
        args: ArgValues,
        defaults: &[Value],
        heap: &mut Heap<NoLimitTracker>,
        interns: &Interns,
    ) -> RunResult<Vec<Value>> {
        let mut namespace = Vec::new();
        sig.bind(args, defaults, heap, interns, "f", &mut namespace)?;
        Ok(namespace)
    }

    #[test]
    fn simple_positional_binding() {
        let (mut heap, mut interns) = setup();
        let sig = Signature::positional(vec![interns.intern("a"), interns.intern("b")]);
        let ns = bind(&sig, ArgValues::Two(Value::Int(1), Value::Int(2)), &[], &mut heap, &interns).unwrap();
        assert!(matches!(ns[0], Value::Int(1)));
        assert!(matches!(ns[1], Value::Int(2)));
    }

    #[test]
    fn defaults_fill_missing_trailing_parameters() {
        let (mut heap, mut interns) = setup();
        let sig = Signature::new(
            vec![interns.intern("a"), interns.intern("b")],
            1,
            None,
            vec![],
            vec![],
            None,
        );
        let ns = bind(&sig, ArgValues::One(Value::Int(7)), &[Value::Int(9)], &mut heap, &interns).unwrap();
        assert!(matches!(ns[0], Value::Int(7)));
        assert!(matches!(ns[1], Value::Int(9)));
    }

    #[test]
    fn keyword_binding_and_var_kwargs() {
        // def f(a, b, *, c=1, **kw)
        let (mut heap, mut interns) = setup();
        let c = interns.intern("c");
        let sig = Signature::new(
            vec![interns.intern("a"), interns.intern("b")],
            0,
            None,
            vec![c],
            vec![Some(0)],
            Some(interns.intern("kw")),
        );
        let args = ArgValues::ArgsKargs {
            args: vec![Value::Int(1), Value::Int(2)],
            kwargs: KwargsValues::Inline(vec![(c, Value::Int(3)), (interns.intern("d"), Value::Int(4))]),
        };
        let ns = bind(&sig, args, &[Value::Int(1)], &mut heap, &interns).unwrap();
        assert!(matches!(ns[0], Value::Int(1)));
        assert!(matches!(ns[1], Value::Int(2)));
        assert!(matches!(ns[2], Value::Int(3)));
        let Value::Ref(dict_id) = ns[3] else { panic!("expected **kw dict") };
        let HeapData::Dict(dict) = heap.get(dict_id) else { panic!() };
        assert!(matches!(dict.get_by_str("d", &heap, &interns), Some(Value::Int(4))));
    }

    #[test]
    fn unexpected_positional_raises() {
        // f(1, 2, 3) against def f(a, b, *, c=1, **kw)
        let (mut heap, mut interns) = setup();
        let c = interns.intern("c");
        let sig = Signature::new(
            vec![interns.intern("a"), interns.intern("b")],
            0,
            None,
            vec![c],
            vec![Some(0)],
            Some(interns.intern("kw")),
        );
        let args = ArgValues::ArgsKargs {
            args: vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            kwargs: KwargsValues::Empty,
        };
        let err = bind(&sig, args, &[Value::Int(1)], &mut heap, &interns).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::TypeError));
    }

    #[test]
    fn duplicate_keyword_raises() {
        let (mut heap, mut interns) = setup();
        let a = interns.intern("a");
        let sig = Signature::positional(vec![a, interns.intern("b")]);
        let args = ArgValues::ArgsKargs {
            args: vec![Value::Int(1), Value::Int(2)],
            kwargs: KwargsValues::Inline(vec![(a, Value::Int(3))]),
        };
        let err = bind(&sig, args, &[], &mut heap, &interns).unwrap_err();
        assert!(err.to_string().contains("multiple values for keyword argument 'a'"));
    }

    #[test]
    fn unexpected_keyword_raises() {
        let (mut heap, mut interns) = setup();
        let sig = Signature::positional(vec![interns.intern("a")]);
        let args = ArgValues::ArgsKargs {
            args: vec![],
            kwargs: KwargsValues::Inline(vec![(interns.intern("nope"), Value::Int(1))]),
        };
        let err = bind(&sig, args, &[], &mut heap, &interns).unwrap_err();
        assert!(err.to_string().contains("unexpected keyword argument 'nope'"));
    }

    #[test]
    fn missing_required_parameter_raises() {
        let (mut heap, mut interns) = setup();
        let sig = Signature::positional(vec![interns.intern("a"), interns.intern("b")]);
        let err = bind(&sig, ArgValues::One(Value::Int(1)), &[], &mut heap, &interns).unwrap_err();
        assert!(err.to_string().contains("missing 1 required positional argument: 'b'"));
    }

    #[test]
    fn star_args_collects_excess() {
        // def f(a, *rest)
        let (mut heap, mut interns) = setup();
        let sig = Signature::new(
            vec![interns.intern("a")],
            0,
            Some(interns.intern("rest")),
            vec![],
            vec![],
            None,
        );
        let args = ArgValues::ArgsKargs {
            args: vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            kwargs: KwargsValues::Empty,
        };
        let ns = bind(&sig, args, &[], &mut heap, &interns).unwrap();
        let Value::Ref(tuple_id) = ns[1] else { panic!("expected *rest tuple") };
        let HeapData::Tuple(tuple) = heap.get(tuple_id) else { panic!() };
        assert_eq!(tuple.len(), 2);
    }
}
