// ABOUTME: Dispatch registry mapping function signatures to pluggable derivative rules

use crate::ast::{Call, Expression, UnaryOp};
use crate::context::Context;
use crate::diff::{differentiate_expression, DiffContext};
use crate::error::DifferentiationError;
use crate::types::{FunctionSignature, Type};
use std::collections::HashMap;

/// A derivative rule: given the resolved `Call`, the scratch differentiation
/// context (to recurse into argument differentiation and register new
/// derived variables), and the parameter `wrt` being differentiated
/// against, returns the derivative expression. The chain rule lives inside
/// each rule, by recursing into `differentiate_expression` on its arguments.
pub type DifferentiatorRule =
    fn(&Call, &mut DiffContext, &str) -> Result<Expression, DifferentiationError>;

/// Maps a **declared** `FunctionSignature` (parameter types may be `unknown`
/// wildcards) to its rule. Lookup canonicalizes the call-site signature
/// through the owning `Context::find_function` before consulting the map,
/// so a call through a coercion still finds the declared rule.
#[derive(Clone)]
pub struct FunctionDiffStorage {
    rules: HashMap<FunctionSignature, DifferentiatorRule>,
}

impl Default for FunctionDiffStorage {
    fn default() -> Self {
        FunctionDiffStorage::with_defaults()
    }
}

impl FunctionDiffStorage {
    pub fn new() -> FunctionDiffStorage {
        FunctionDiffStorage {
            rules: HashMap::new(),
        }
    }

    pub fn register(&mut self, signature: FunctionSignature, rule: DifferentiatorRule) {
        self.rules.insert(signature, rule);
    }

    /// Canonicalizes `desired` against `ctx` and looks up its rule.
    pub fn lookup(&self, ctx: &Context, desired: &FunctionSignature) -> Option<DifferentiatorRule> {
        let canonical = ctx.find_function(desired)?;
        self.rules.get(&canonical).copied()
    }

    /// The registry pre-populated with the default rule set (§4.4): `cos`,
    /// `sin`, `pow`, `log`, `exp`, `abs`, the `std::vector` constructor, and
    /// a zero rule for `std::vector::size` (its value never depends on the
    /// differentiated parameter).
    pub fn with_defaults() -> FunctionDiffStorage {
        let mut storage = FunctionDiffStorage::new();
        register_cos_rule(&mut storage);
        register_sin_rule(&mut storage);
        register_exp_rule(&mut storage);
        register_log_rule(&mut storage);
        register_abs_rule(&mut storage);
        register_pow_rule(&mut storage);
        register_vector_ctor_rule(&mut storage);
        register_vector_size_rule(&mut storage);
        storage
    }
}

fn unknown_signature(name: &str, arity: usize) -> FunctionSignature {
    FunctionSignature::new(name, vec![Type::Unknown; arity])
}

/// Declares a derivative rule function plus a `register_<name>` helper that
/// inserts it into a `FunctionDiffStorage` under its declared signature,
/// mirroring the identifier → function + registration-helper shape used for
/// builtins elsewhere in this codebase.
macro_rules! define_rule {
    {
        $fn_ident:ident,
        name: $name:literal,
        arity: $arity:literal,
        $impl:expr
    } => {
        pub fn $fn_ident(
            call: &Call,
            ctx: &mut DiffContext,
            wrt: &str,
        ) -> Result<Expression, DifferentiationError> {
            $impl(call, ctx, wrt)
        }

        paste::paste! {
            fn [<register_ $fn_ident>](storage: &mut FunctionDiffStorage) {
                storage.register(unknown_signature($name, $arity), $fn_ident);
            }
        }
    };
}

define_rule! {
    cos_rule,
    name: "std::cos",
    arity: 1,
    |call: &Call, ctx: &mut DiffContext, wrt: &str| {
        let arg = &call.args[0];
        let d_arg = differentiate_expression(arg, ctx, wrt)?;
        let sin_call = Expression::call(unknown_signature("std::sin", 1), vec![arg.clone()]);
        let neg_sin = Expression::unary(UnaryOp::Minus, sin_call, true);
        Ok(Expression::mul(neg_sin, d_arg))
    }
}

define_rule! {
    sin_rule,
    name: "std::sin",
    arity: 1,
    |call: &Call, ctx: &mut DiffContext, wrt: &str| {
        let arg = &call.args[0];
        let d_arg = differentiate_expression(arg, ctx, wrt)?;
        let cos_call = Expression::call(unknown_signature("std::cos", 1), vec![arg.clone()]);
        Ok(Expression::mul(cos_call, d_arg))
    }
}

define_rule! {
    exp_rule,
    name: "std::exp",
    arity: 1,
    |call: &Call, ctx: &mut DiffContext, wrt: &str| {
        let arg = &call.args[0];
        let d_arg = differentiate_expression(arg, ctx, wrt)?;
        Ok(Expression::mul(Expression::Call(call.clone()), d_arg))
    }
}

define_rule! {
    log_rule,
    name: "std::log",
    arity: 1,
    |call: &Call, ctx: &mut DiffContext, wrt: &str| {
        let arg = &call.args[0];
        let d_arg = differentiate_expression(arg, ctx, wrt)?;
        Ok(Expression::div(d_arg, arg.clone()))
    }
}

define_rule! {
    abs_rule,
    name: "std::abs",
    arity: 1,
    |call: &Call, ctx: &mut DiffContext, wrt: &str| {
        let arg = &call.args[0];
        let d_arg = differentiate_expression(arg, ctx, wrt)?;
        let positive = Expression::gt(arg.clone(), Expression::number(0.0));
        let negative = Expression::lt(arg.clone(), Expression::number(0.0));
        let sign = Expression::sub(positive, negative);
        Ok(Expression::mul(sign, d_arg))
    }
}

define_rule! {
    pow_rule,
    name: "std::pow",
    arity: 2,
    |call: &Call, ctx: &mut DiffContext, wrt: &str| {
        let base = &call.args[0];
        let exponent = &call.args[1];
        let d_base = differentiate_expression(base, ctx, wrt)?;
        let d_exponent = differentiate_expression(exponent, ctx, wrt)?;
        let exponent_minus_one = Expression::sub(exponent.clone(), Expression::number(1.0));
        let pow_base_exp_minus_one = Expression::call(
            unknown_signature("std::pow", 2),
            vec![base.clone(), exponent_minus_one],
        );
        let power_term = Expression::mul(
            Expression::mul(exponent.clone(), pow_base_exp_minus_one),
            d_base,
        );
        let log_base = Expression::call(unknown_signature("std::log", 1), vec![base.clone()]);
        let log_term = Expression::mul(
            Expression::mul(Expression::Call(call.clone()), log_base),
            d_exponent,
        );
        Ok(Expression::add(power_term, log_term))
    }
}

define_rule! {
    vector_ctor_rule,
    name: "std::vector",
    arity: 2,
    |call: &Call, ctx: &mut DiffContext, wrt: &str| {
        let size = &call.args[0];
        let init = &call.args[1];
        let d_init = differentiate_expression(init, ctx, wrt)?;
        Ok(Expression::call(
            unknown_signature("std::vector", 2),
            vec![size.clone(), d_init],
        ))
    }
}

define_rule! {
    vector_size_rule,
    name: "std::vector::size",
    arity: 0,
    |_call: &Call, _ctx: &mut DiffContext, _wrt: &str| Ok(Expression::number(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, BinaryOperator};

    #[test]
    fn default_registry_resolves_cos_through_the_wildcard_signature() {
        let storage = FunctionDiffStorage::with_defaults();
        let mut ctx = Context::new();
        ctx.add_function(unknown_signature("std::cos", 1));
        let desired = FunctionSignature::new("std::cos", vec![Type::named("double")]);
        assert!(storage.lookup(&ctx, &desired).is_some());
    }

    #[test]
    fn unregistered_call_has_no_rule() {
        let storage = FunctionDiffStorage::with_defaults();
        let ctx = Context::new();
        let desired = FunctionSignature::new("std::tan", vec![Type::named("double")]);
        assert!(storage.lookup(&ctx, &desired).is_none());
    }

    #[test]
    fn vector_size_rule_always_differentiates_to_zero() {
        let call = Call::new(unknown_signature("std::vector::size", 0), vec![]);
        let mut ctx = DiffContext::for_test();
        let result = vector_size_rule(&call, &mut ctx, "x").unwrap();
        assert!(matches!(result, Expression::Number(n) if n == 0.0));
    }

    #[test]
    fn cos_rule_builds_negated_sin_times_inner_derivative() {
        let x = Expression::variable(crate::ast::Variable::reference("x", Type::named("double")));
        let call = Call::new(unknown_signature("std::cos", 1), vec![x]);
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let result = cos_rule(&call, &mut ctx, "x").unwrap();
        match result {
            Expression::Binary(BinaryOperator {
                op: BinaryOp::Mul,
                left,
                ..
            }) => assert!(matches!(*left, Expression::Unary(_))),
            other => panic!("expected a multiplication, got {other:?}"),
        }
    }
}
