// ABOUTME: Source-to-source differentiation engine: expressions, statements, functions, files

use crate::ast::{
    BinaryOp, BinaryOperator, Call, Expression, FileNode, Function, FunctionDeclaration,
    Statement, UnaryOp, UnaryOperator, Variable,
};
use crate::context::Context;
use crate::error::DifferentiationError;
use crate::registry::FunctionDiffStorage;
use crate::types::{FunctionSignature, Type};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Scratch state threaded through one function's differentiation. Holds a
/// working copy of the function's own `Context` (rules and statement
/// differentiation register newly introduced derivative locals into it),
/// the ordered parameter names being differentiated against, a lookup of
/// each parameter's declared `Variable`, the subset of parameters that are
/// vector-valued, a map from `(wrt, source name)` to the derivative local
/// already declared for that pair, and the rule registry.
pub struct DiffContext {
    pub context: Context,
    pub wrt_params: Vec<String>,
    pub parameters: HashMap<String, Variable>,
    pub vector_valued: HashSet<String>,
    pub derived: HashMap<(String, String), Variable>,
    pub registry: Rc<FunctionDiffStorage>,
    /// The enclosing function's own (undifferentiated) return type, needed
    /// to type the synthesized `_return: std::array<T, n>` local for
    /// multi-parameter returns.
    pub return_type: Type,
}

impl DiffContext {
    pub fn new(context: Context, registry: Rc<FunctionDiffStorage>) -> DiffContext {
        DiffContext {
            context,
            wrt_params: Vec::new(),
            parameters: HashMap::new(),
            vector_valued: HashSet::new(),
            derived: HashMap::new(),
            registry,
            return_type: Type::Unknown,
        }
    }

    pub fn declare_parameter(&mut self, name: &str, ty: Type) {
        if ty.name() == Some("std::vector") {
            self.vector_valued.insert(name.to_string());
        }
        self.wrt_params.push(name.to_string());
        self.parameters.insert(name.to_string(), Variable::reference(name, ty));
    }

    /// A scratch context for unit tests that have no real parsed function to
    /// build one from.
    pub fn for_test() -> DiffContext {
        DiffContext::new(Context::new(), Rc::new(FunctionDiffStorage::with_defaults()))
    }

    fn derived_reference(&self, wrt: &str, name: &str) -> Option<Expression> {
        self.derived
            .get(&(wrt.to_string(), name.to_string()))
            .map(|v| Expression::Variable(Variable::reference(v.name.clone(), v.ty.clone())))
    }
}

/// Differentiates a single expression with respect to `wrt`, recursing
/// through the chain/product/quotient rules and dispatching `Call`s (and
/// `.`-qualified method calls) through the rule registry.
pub fn differentiate_expression(
    expr: &Expression,
    ctx: &mut DiffContext,
    wrt: &str,
) -> Result<Expression, DifferentiationError> {
    match expr {
        Expression::Number(_) => Ok(Expression::number(0.0)),
        Expression::Variable(v) => {
            if v.name == wrt {
                return Ok(Expression::number(1.0));
            }
            if let Some(reference) = ctx.derived_reference(wrt, &v.name) {
                return Ok(reference);
            }
            Ok(Expression::number(0.0))
        }
        Expression::Unary(u) => differentiate_unary(u, ctx, wrt),
        Expression::Binary(b) => differentiate_binary(b, ctx, wrt),
        Expression::Call(call) => differentiate_call(call, ctx, wrt),
    }
}

fn differentiate_unary(
    u: &UnaryOperator,
    ctx: &mut DiffContext,
    wrt: &str,
) -> Result<Expression, DifferentiationError> {
    match u.op {
        UnaryOp::Plus | UnaryOp::Braces => {
            let d_operand = differentiate_expression(&u.operand, ctx, wrt)?;
            Ok(Expression::unary(u.op, d_operand, u.prefix))
        }
        UnaryOp::Minus => {
            let d_operand = differentiate_expression(&u.operand, ctx, wrt)?;
            Ok(Expression::unary(UnaryOp::Minus, d_operand, true))
        }
        // `++e`/`--e` change `e`'s value by a constant, not its derivative:
        // the derivative passes through unchanged.
        UnaryOp::Increment | UnaryOp::Decrement => differentiate_expression(&u.operand, ctx, wrt),
        UnaryOp::Not => Err(DifferentiationError::UnsupportedUnaryOperator),
    }
}

fn differentiate_binary(
    b: &BinaryOperator,
    ctx: &mut DiffContext,
    wrt: &str,
) -> Result<Expression, DifferentiationError> {
    match b.op {
        BinaryOp::Dot => match b.right.as_ref() {
            Expression::Call(call) => differentiate_call(call, ctx, wrt),
            _ => Err(DifferentiationError::UnsupportedExpression),
        },
        BinaryOp::Index => {
            let d_left = differentiate_expression(&b.left, ctx, wrt)?;
            Ok(Expression::binary(BinaryOp::Index, d_left, (*b.right).clone()))
        }
        BinaryOp::Add | BinaryOp::Sub => {
            let dl = differentiate_expression(&b.left, ctx, wrt)?;
            let dr = differentiate_expression(&b.right, ctx, wrt)?;
            Ok(Expression::binary(b.op, dl, dr))
        }
        BinaryOp::Mul => {
            let dl = differentiate_expression(&b.left, ctx, wrt)?;
            let dr = differentiate_expression(&b.right, ctx, wrt)?;
            Ok(Expression::add(
                Expression::mul(dl, (*b.right).clone()),
                Expression::mul((*b.left).clone(), dr),
            ))
        }
        BinaryOp::Div => {
            let dl = differentiate_expression(&b.left, ctx, wrt)?;
            let dr = differentiate_expression(&b.right, ctx, wrt)?;
            let numerator = Expression::sub(
                Expression::mul(dl, (*b.right).clone()),
                Expression::mul((*b.left).clone(), dr),
            );
            let denominator = Expression::mul((*b.right).clone(), (*b.right).clone());
            Ok(Expression::div(numerator, denominator))
        }
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::Gt
        | BinaryOp::Le
        | BinaryOp::Ge
        | BinaryOp::And
        | BinaryOp::Or
        | BinaryOp::Assign
        | BinaryOp::AddAssign
        | BinaryOp::SubAssign
        | BinaryOp::MulAssign
        | BinaryOp::DivAssign => Err(DifferentiationError::UnsupportedBinaryOperator),
    }
}

/// Dispatches a `Call` to its registered rule, canonicalizing the call's
/// signature against the function's own context first (so a call reached
/// through a coercion still finds the declared rule).
pub fn differentiate_call(
    call: &Call,
    ctx: &mut DiffContext,
    wrt: &str,
) -> Result<Expression, DifferentiationError> {
    let registry = ctx.registry.clone();
    let rule = registry
        .lookup(&ctx.context, &call.signature)
        .ok_or_else(|| DifferentiationError::NoRuleForCall(call.signature.name.clone()))?;
    rule(call, ctx, wrt)
}

/// Differentiates one statement, expanding it into the sequence of
/// statements that replace it: per-parameter derivative statements followed
/// by the original (unmodified) statement, so later code that still
/// references the original names keeps working.
fn differentiate_statement(
    stmt: &Statement,
    ctx: &mut DiffContext,
) -> Result<Vec<Statement>, DifferentiationError> {
    match stmt {
        Statement::Expression(e) => differentiate_expression_statement(e, ctx),
        Statement::Block(stmts) => {
            let mut out = Vec::new();
            for s in stmts {
                out.extend(differentiate_statement(s, ctx)?);
            }
            if out.is_empty() {
                return Err(DifferentiationError::EmptyStatementList);
            }
            Ok(vec![Statement::Block(out)])
        }
        Statement::Conditional {
            repeat,
            condition,
            then_branch,
            else_branch,
        } => {
            let then_out = wrap_as_block(differentiate_statement(then_branch, ctx)?)?;
            let else_out = match else_branch {
                Some(branch) => Some(Box::new(wrap_as_block(differentiate_statement(
                    branch, ctx,
                )?)?)),
                None => None,
            };
            Ok(vec![Statement::Conditional {
                repeat: *repeat,
                condition: condition.clone(),
                then_branch: Box::new(then_out),
                else_branch: else_out,
            }])
        }
        Statement::For {
            init,
            condition,
            step,
            body,
        } => {
            let mut init_out = differentiate_statement(init, ctx)?;
            let new_init = init_out
                .pop()
                .ok_or(DifferentiationError::EmptyStatementList)?;
            let body_out = wrap_as_block(differentiate_statement(body, ctx)?)?;
            let mut result = init_out;
            result.push(Statement::For {
                init: Box::new(new_init),
                condition: condition.clone(),
                step: step.clone(),
                body: Box::new(body_out),
            });
            Ok(result)
        }
        Statement::Return(e) => differentiate_return_statement(e, ctx),
        Statement::Comment(_) | Statement::Include { .. } | Statement::Break => {
            Ok(vec![stmt.clone()])
        }
        Statement::FunctionDeclaration(_) | Statement::Function(_) => {
            Err(DifferentiationError::UnsupportedStatement)
        }
    }
}

fn wrap_as_block(mut stmts: Vec<Statement>) -> Result<Statement, DifferentiationError> {
    if stmts.is_empty() {
        return Err(DifferentiationError::EmptyStatementList);
    }
    if stmts.len() == 1 {
        Ok(stmts.pop().unwrap())
    } else {
        Ok(Statement::Block(stmts))
    }
}

fn differentiate_expression_statement(
    e: &Expression,
    ctx: &mut DiffContext,
) -> Result<Vec<Statement>, DifferentiationError> {
    let wrt_params = ctx.wrt_params.clone();
    let mut out = Vec::with_capacity(wrt_params.len() + 1);

    match e {
        Expression::Binary(BinaryOperator {
            op:
                op
                @
                (BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign),
            left,
            right,
        }) => {
            let (target, index) = assignment_target(left)?;
            for wrt in &wrt_params {
                let d_right = differentiate_expression(right, ctx, wrt)?;
                let derived = derive_local(ctx, wrt, &target.name, &target.ty);
                let lhs = match &index {
                    Some(idx) => Expression::binary(BinaryOp::Index, derived.clone(), idx.clone()),
                    None => derived.clone(),
                };
                // `+=`/`-=` keep the left side assignable and the compound
                // op itself; `*=`/`/=` rewrite to a plain `=` carrying the
                // product/quotient rule over the (pre-update) primal left.
                let (emit_op, emit_rhs) = match op {
                    BinaryOp::Assign | BinaryOp::AddAssign | BinaryOp::SubAssign => {
                        (*op, d_right)
                    }
                    BinaryOp::MulAssign | BinaryOp::DivAssign => {
                        let primal_left = match &index {
                            Some(idx) => Expression::binary(
                                BinaryOp::Index,
                                Expression::Variable(target.clone()),
                                idx.clone(),
                            ),
                            None => Expression::Variable(target.clone()),
                        };
                        // A plain reference to the derivative, for use inside
                        // the rewritten expression — `lhs` may itself carry a
                        // first-occurrence type prefix and must only appear
                        // there, not duplicated into the right-hand side.
                        let dl_ref = Expression::Variable(Variable::reference(
                            format!("d_{wrt}_{}", target.name),
                            target.ty.clone(),
                        ));
                        let rhs = if *op == BinaryOp::MulAssign {
                            Expression::add(
                                Expression::mul(dl_ref, (**right).clone()),
                                Expression::mul(primal_left, d_right),
                            )
                        } else {
                            let numerator = Expression::sub(
                                Expression::mul(dl_ref, (**right).clone()),
                                Expression::mul(primal_left, d_right),
                            );
                            let denominator =
                                Expression::mul((**right).clone(), (**right).clone());
                            Expression::div(numerator, denominator)
                        };
                        (BinaryOp::Assign, rhs)
                    }
                    _ => unreachable!("match arm only binds the five assignment operators"),
                };
                out.push(Statement::Expression(Expression::binary(
                    emit_op, lhs, emit_rhs,
                )));
            }
        }
        Expression::Variable(v) if v.declaration => {
            for wrt in &wrt_params {
                let d_ctor = match &v.constructor {
                    Some(call) => Some(unwrap_call(differentiate_call(call, ctx, wrt)?)?),
                    None => None,
                };
                let derived_name = format!("d_{wrt}_{}", v.name);
                let derived_var = Variable::declared(derived_name, v.ty.clone(), d_ctor);
                ctx.context.add_variable(derived_var.clone());
                ctx.derived
                    .insert((wrt.clone(), v.name.clone()), derived_var.clone());
                out.push(Statement::Expression(Expression::Variable(derived_var)));
            }
        }
        _ => {
            for wrt in &wrt_params {
                let d_e = differentiate_expression(e, ctx, wrt)?;
                out.push(Statement::Expression(d_e));
            }
        }
    }

    out.push(Statement::Expression(e.clone()));
    Ok(out)
}

/// Resolves the assignable target of `l = r;` or `l[i] = r;`: the base
/// variable being assigned, and the index expression when the assignment
/// is indexed. Any other left-hand-side shape is not assignable here —
/// per the boundary rule, only a bare variable or an indexed variable are.
fn assignment_target(
    left: &Expression,
) -> Result<(Variable, Option<Expression>), DifferentiationError> {
    match left {
        Expression::Variable(v) => Ok((v.clone(), None)),
        Expression::Binary(BinaryOperator {
            op: BinaryOp::Index,
            left: base,
            right: index,
        }) => match base.as_ref() {
            Expression::Variable(v) => Ok((v.clone(), Some((**index).clone()))),
            _ => Err(DifferentiationError::NonAssignableLeftHandSide),
        },
        _ => Err(DifferentiationError::NonAssignableLeftHandSide),
    }
}

fn unwrap_call(expr: Expression) -> Result<Call, DifferentiationError> {
    match expr {
        Expression::Call(c) => Ok(c),
        _ => Err(DifferentiationError::UnsupportedExpression),
    }
}

/// Produces the left-hand side for a derivative assignment: a reference to
/// the already-declared `d_<wrt>_<name>` local, or (the first time this
/// pair is seen) a fresh declaration of one, registered into both the
/// derived-variable map and the scratch context.
fn derive_local(ctx: &mut DiffContext, wrt: &str, name: &str, ty: &Type) -> Expression {
    if let Some(existing) = ctx.derived.get(&(wrt.to_string(), name.to_string())) {
        return Expression::Variable(Variable::reference(existing.name.clone(), existing.ty.clone()));
    }
    let derived_name = format!("d_{wrt}_{name}");
    let derived_var = Variable::declared(derived_name, ty.clone(), None);
    ctx.context.add_variable(derived_var.clone());
    ctx.derived
        .insert((wrt.to_string(), name.to_string()), derived_var.clone());
    Expression::Variable(derived_var)
}

/// Expands `return expr;`. With one parameter this is a single statement:
/// the direct derivative of `expr`. With n >= 2 parameters the derivative
/// is an n-vector, so it synthesizes a `_return: std::array<T, n>` local,
/// assigns its derivative into each index in parameter order, and returns
/// it — `_return[i] = D[expr] wrt p_i;` for each `p_i`, then `return
/// _return;`. Only a bare variable is supported as `expr` here: the source
/// this engine was distilled from never differentiates a multi-parameter
/// return through anything else, so this mirrors that restriction rather
/// than inventing support the rule set was never exercised against.
fn differentiate_return_statement(
    e: &Expression,
    ctx: &mut DiffContext,
) -> Result<Vec<Statement>, DifferentiationError> {
    let wrt_params = ctx.wrt_params.clone();
    if wrt_params.len() == 1 {
        let d = differentiate_expression(e, ctx, &wrt_params[0])?;
        return Ok(vec![Statement::Return(d)]);
    }
    let var = match e {
        Expression::Variable(v) => v.clone(),
        _ => return Err(DifferentiationError::NonVariableMultiParamReturn),
    };

    let n = wrt_params.len();
    let array_type = Type::generic("std::array", vec![ctx.return_type.clone(), Type::constant(n)]);
    let return_decl = Variable::declared("_return", array_type.clone(), None);
    let mut out = vec![Statement::Expression(Expression::Variable(return_decl))];

    let return_ref = || Expression::Variable(Variable::reference("_return", array_type.clone()));
    for (i, wrt) in wrt_params.iter().enumerate() {
        let d_i = differentiate_expression(
            &Expression::Variable(Variable::reference(var.name.clone(), var.ty.clone())),
            ctx,
            wrt,
        )?;
        let slot = Expression::binary(BinaryOp::Index, return_ref(), Expression::number(i as f64));
        out.push(Statement::Expression(Expression::binary(
            BinaryOp::Assign,
            slot,
            d_i,
        )));
    }
    out.push(Statement::Return(return_ref()));
    Ok(out)
}

/// The full derivative function: same name prefixed `d_`, same parameters,
/// return type widened to `std::array<T, n>` for n >= 2 parameters.
pub fn differentiate_function(
    func: &Function,
    registry: Rc<FunctionDiffStorage>,
) -> Result<Function, DifferentiationError> {
    let n = func.declaration.params.len();
    let mut ctx = DiffContext::new(func.context.copy(), registry);
    ctx.return_type = func.declaration.return_type.clone();
    for param in &func.declaration.params {
        ctx.declare_parameter(&param.name, param.ty.clone());
    }

    // An empty body differentiates to an empty body; there is nothing to
    // hoist derivative locals around.
    let mut body = Vec::new();
    for stmt in &func.body {
        body.extend(differentiate_statement(stmt, &mut ctx)?);
    }

    let return_type = if n == 1 {
        func.declaration.return_type.clone()
    } else {
        Type::generic(
            "std::array",
            vec![func.declaration.return_type.clone(), Type::constant(n)],
        )
    };

    Ok(Function {
        declaration: FunctionDeclaration {
            name: format!("d_{}", func.declaration.name),
            return_type,
            params: func.declaration.params.clone(),
        },
        body,
        context: ctx.context,
    })
}

fn differentiate_function_declaration(decl: &FunctionDeclaration) -> FunctionDeclaration {
    let n = decl.params.len();
    let return_type = if n == 1 {
        decl.return_type.clone()
    } else {
        Type::generic("std::array", vec![decl.return_type.clone(), Type::constant(n)])
    };
    FunctionDeclaration {
        name: format!("d_{}", decl.name),
        return_type,
        params: decl.params.clone(),
    }
}

/// Differentiates every `Function`/`FunctionDeclaration` in a file, passes
/// `Comment`/`Include` through unchanged, and ensures `#include <array>` is
/// present exactly once (the array-returning multi-parameter functions need
/// it; a file that already includes it is not given a second copy).
pub fn differentiate_file(
    file: &FileNode,
    registry: Rc<FunctionDiffStorage>,
) -> Result<FileNode, DifferentiationError> {
    let mut statements = Vec::with_capacity(file.statements.len() + 1);
    statements.push(Statement::Include {
        name: "array".to_string(),
        angle: true,
    });

    for stmt in &file.statements {
        match stmt {
            Statement::Include { name, angle } if name == "array" && *angle => {}
            Statement::Include { .. } | Statement::Comment(_) => statements.push(stmt.clone()),
            Statement::FunctionDeclaration(decl) => statements.push(Statement::FunctionDeclaration(
                differentiate_function_declaration(decl),
            )),
            Statement::Function(func) => {
                let d_func = differentiate_function(func, registry.clone())?;
                statements.push(Statement::Function(d_func));
            }
            _ => return Err(DifferentiationError::UnsupportedFileStatement),
        }
    }

    Ok(FileNode {
        name: file.name.clone(),
        statements,
        context: file.context.copy(),
    })
}

/// Peephole simplifier (§4.6): folds constant arithmetic and additive/
/// multiplicative identities bottom-up. Exposed standalone rather than
/// wired into statement differentiation, so callers that want the raw
/// chain-rule expansion and callers that want a simplified result both have
/// a direct path to what they need.
pub fn simplify(expr: &Expression) -> Expression {
    match expr {
        Expression::Number(_) | Expression::Variable(_) => expr.clone(),
        Expression::Unary(u) => simplify_unary(u),
        Expression::Binary(b) => simplify_binary(b),
        Expression::Call(c) => Expression::Call(Call::new(
            c.signature.clone(),
            c.args.iter().map(simplify).collect(),
        )),
    }
}

fn simplify_unary(u: &UnaryOperator) -> Expression {
    let operand = simplify(&u.operand);
    match u.op {
        UnaryOp::Braces | UnaryOp::Plus => operand,
        UnaryOp::Minus => match &operand {
            Expression::Number(n) => Expression::number(-n),
            Expression::Unary(inner) if matches!(inner.op, UnaryOp::Minus) => {
                (*inner.operand).clone()
            }
            _ => Expression::unary(UnaryOp::Minus, operand, true),
        },
        UnaryOp::Not | UnaryOp::Increment | UnaryOp::Decrement => {
            Expression::unary(u.op, operand, u.prefix)
        }
    }
}

fn simplify_binary(b: &BinaryOperator) -> Expression {
    if matches!(b.op, BinaryOp::Dot | BinaryOp::Index) {
        return Expression::binary(b.op, simplify(&b.left), simplify(&b.right));
    }
    let left = simplify(&b.left);
    let right = simplify(&b.right);
    match b.op {
        BinaryOp::Add => {
            if left.is_zero() {
                return right;
            }
            if right.is_zero() {
                return left;
            }
            if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
                return Expression::number(l + r);
            }
            Expression::binary(BinaryOp::Add, left, right)
        }
        BinaryOp::Sub => {
            if right.is_zero() {
                return left;
            }
            if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
                return Expression::number(l - r);
            }
            Expression::binary(BinaryOp::Sub, left, right)
        }
        BinaryOp::Mul => {
            if left.is_zero() || right.is_zero() {
                return Expression::number(0.0);
            }
            if left.is_one() {
                return right;
            }
            if right.is_one() {
                return left;
            }
            if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
                return Expression::number(l * r);
            }
            Expression::binary(BinaryOp::Mul, left, right)
        }
        BinaryOp::Div => {
            if right.is_one() {
                return left;
            }
            if left.is_zero() && !right.is_zero() {
                return Expression::number(0.0);
            }
            if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
                if r != 0.0 {
                    return Expression::number(l / r);
                }
            }
            Expression::binary(BinaryOp::Div, left, right)
        }
        _ => Expression::binary(b.op, left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn var(name: &str) -> Expression {
        Expression::variable(Variable::reference(name, Type::named("double")))
    }

    #[test]
    fn derivative_of_the_variable_itself_is_one() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let result = differentiate_expression(&var("x"), &mut ctx, "x").unwrap();
        assert!(result.is_one());
    }

    #[test]
    fn derivative_of_an_unrelated_variable_is_zero() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let result = differentiate_expression(&var("y"), &mut ctx, "x").unwrap();
        assert!(result.is_zero());
    }

    #[test]
    fn product_rule_builds_both_cross_terms() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let expr = Expression::mul(var("x"), var("x"));
        let result = differentiate_expression(&expr, &mut ctx, "x").unwrap();
        // d(x*x)/dx = 1*x + x*1
        assert_eq!(result.to_source(), "1 * x + x * 1");
    }

    #[test]
    fn cos_rule_is_reachable_through_the_default_registry() {
        let mut ctx = DiffContext::for_test();
        ctx.context
            .add_function(FunctionSignature::new("std::cos", vec![Type::Unknown]));
        ctx.declare_parameter("x", Type::named("double"));
        let call = Expression::call(
            FunctionSignature::new("std::cos", vec![Type::named("double")]),
            vec![var("x")],
        );
        let result = differentiate_expression(&call, &mut ctx, "x").unwrap();
        assert_eq!(result.to_source(), "-std::sin(x) * 1");
    }

    #[test]
    fn increment_and_decrement_pass_the_operand_derivative_through_unchanged() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let incremented = Expression::unary(UnaryOp::Increment, var("x"), true);
        let decremented = Expression::unary(UnaryOp::Decrement, var("x"), false);
        assert!(differentiate_expression(&incremented, &mut ctx, "x")
            .unwrap()
            .is_one());
        assert!(differentiate_expression(&decremented, &mut ctx, "x")
            .unwrap()
            .is_one());
    }

    #[test]
    fn compound_add_assign_keeps_the_operator_and_differentiates_the_right_side() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let stmt = Statement::Expression(Expression::binary(
            BinaryOp::AddAssign,
            Expression::Variable(Variable::reference("y", Type::named("double"))),
            var("x"),
        ));
        let out = differentiate_statement(&stmt, &mut ctx).unwrap();
        // one derivative compound-assignment (wrt x) + the original statement
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to_string(), "double d_x_y += 1;\n");
    }

    #[test]
    fn compound_mul_assign_rewrites_to_an_explicit_product_rule_assignment() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let stmt = Statement::Expression(Expression::binary(
            BinaryOp::MulAssign,
            Expression::Variable(Variable::reference("y", Type::named("double"))),
            var("x"),
        ));
        let out = differentiate_statement(&stmt, &mut ctx).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to_string(), "double d_x_y = d_x_y * x + y * 1;\n");
    }

    #[test]
    fn assignment_statement_declares_a_derivative_local_once() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let declare_y = Statement::Expression(Expression::Variable(Variable::declared(
            "y",
            Type::named("double"),
            None,
        )));
        let out = differentiate_statement(&declare_y, &mut ctx).unwrap();
        // one derivative declaration (wrt x) + the original statement
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to_string(), "double d_x_y;\n");
    }

    #[test]
    fn single_parameter_return_differentiates_the_expression_directly() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let result = differentiate_return_statement(&var("x"), &mut ctx).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].to_string(), "return 1;\n");
    }

    #[test]
    fn multi_parameter_return_requires_a_bare_variable() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        ctx.declare_parameter("y", Type::named("double"));
        let non_variable = Expression::add(var("x"), var("y"));
        let err = differentiate_return_statement(&non_variable, &mut ctx).unwrap_err();
        assert_eq!(err, DifferentiationError::NonVariableMultiParamReturn);
    }

    #[test]
    fn multi_parameter_return_declares_return_array_and_assigns_each_index() {
        let mut ctx = DiffContext::for_test();
        ctx.return_type = Type::named("double");
        ctx.declare_parameter("x", Type::named("double"));
        ctx.declare_parameter("y", Type::named("double"));
        let result = differentiate_return_statement(&var("x"), &mut ctx).unwrap();
        // declaration + one indexed assignment per parameter + final return
        assert_eq!(result.len(), 4);
        assert_eq!(result[0].to_string(), "std::array<double, 2> _return;\n");
        assert_eq!(result[1].to_string(), "_return[0] = 1;\n");
        assert_eq!(result[2].to_string(), "_return[1] = 0;\n");
        assert_eq!(result[3].to_string(), "return _return;\n");
    }

    #[test]
    fn indexed_assignment_differentiates_the_base_array_variable() {
        let mut ctx = DiffContext::for_test();
        ctx.declare_parameter("x", Type::named("double"));
        let array_ty = Type::generic("std::array", vec![Type::named("double"), Type::constant(4)]);
        let r = Variable::reference("r", array_ty);
        let stmt = Statement::Expression(Expression::binary(
            BinaryOp::Assign,
            Expression::binary(BinaryOp::Index, Expression::Variable(r), Expression::number(0.0)),
            var("x"),
        ));
        let out = differentiate_statement(&stmt, &mut ctx).unwrap();
        // one derivative assignment (wrt x, combined with its first
        // declaration) + the original statement
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].to_string(),
            "std::array<double, 4> d_x_r[0] = 1;\n"
        );
    }

    #[test]
    fn empty_function_body_differentiates_to_an_empty_body() {
        let func = Function {
            declaration: FunctionDeclaration {
                name: "noop".to_string(),
                return_type: Type::named("double"),
                params: vec![Variable::reference("x", Type::named("double"))],
            },
            body: Vec::new(),
            context: Context::new(),
        };
        let registry = Rc::new(FunctionDiffStorage::with_defaults());
        let result = differentiate_function(&func, registry).unwrap();
        assert!(result.body.is_empty());
    }

    #[test]
    fn simplify_folds_additive_and_multiplicative_identities() {
        let expr = Expression::add(
            Expression::mul(Expression::number(1.0), var("x")),
            Expression::number(0.0),
        );
        assert_eq!(simplify(&expr).to_source(), "x");
    }

    #[test]
    fn simplify_folds_constants() {
        let expr = Expression::sub(Expression::number(3.0), Expression::number(1.0));
        assert_eq!(simplify(&expr).to_source(), "2");
    }

    #[test]
    fn simplify_is_idempotent() {
        let expr = Expression::mul(
            Expression::number(1.0),
            Expression::add(var("x"), Expression::number(0.0)),
        );
        let once = simplify(&expr);
        let twice = simplify(&once);
        assert_eq!(once, twice);
    }
}
