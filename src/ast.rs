// ABOUTME: Tagged-enum AST for the parsed language: expressions, statements, and files

use crate::context::Context;
use crate::types::{FunctionSignature, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    Increment,
    Decrement,
    Braces,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    Dot,
    Index,
}

impl BinaryOp {
    /// Numeric binding strength per the printer's precedence table (§4.3):
    /// lower numbers bind *tighter*.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Dot | BinaryOp::Index => 2,
            BinaryOp::Mul | BinaryOp::Div => 5,
            BinaryOp::Add | BinaryOp::Sub => 6,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 9,
            BinaryOp::Eq | BinaryOp::NotEq => 10,
            BinaryOp::And => 14,
            BinaryOp::Or => 15,
            BinaryOp::Assign
            | BinaryOp::AddAssign
            | BinaryOp::SubAssign
            | BinaryOp::MulAssign
            | BinaryOp::DivAssign => 16,
        }
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign
        )
    }
}

/// A declared or referenced variable. `declaration = true` marks a node that
/// introduces the name (`Type name(args)`); `false` marks a bare reference
/// to an already-declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub declaration: bool,
    pub constructor: Option<Box<Call>>,
}

impl Variable {
    pub fn reference(name: impl Into<String>, ty: Type) -> Variable {
        Variable {
            name: name.into(),
            ty,
            declaration: false,
            constructor: None,
        }
    }

    pub fn declared(name: impl Into<String>, ty: Type, constructor: Option<Call>) -> Variable {
        Variable {
            name: name.into(),
            ty,
            declaration: true,
            constructor: constructor.map(Box::new),
        }
    }
}

/// A resolved call: the signature was already matched against the context's
/// function set at parse time (§3 invariants), so differentiation never
/// re-resolves it.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub signature: FunctionSignature,
    pub args: Vec<Expression>,
}

impl Call {
    pub fn new(signature: FunctionSignature, args: Vec<Expression>) -> Call {
        Call { signature, args }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOperator {
    pub op: UnaryOp,
    pub operand: Box<Expression>,
    pub prefix: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperator {
    pub op: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),
    Variable(Variable),
    Unary(UnaryOperator),
    Binary(BinaryOperator),
    Call(Call),
}

/// Builds `op(left, right)`, rotating `left` right when it is itself an
/// `op`-chain so the result stays right-nested. Only valid for operators
/// that are associative over their operands (`Add`, `Mul`); using it for
/// `Sub`/`Div` would silently change the computed value.
fn right_nest(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    if let Expression::Binary(b) = &left {
        if b.op == op {
            let a = (*b.left).clone();
            let inner = (*b.right).clone();
            return right_nest(op, a, right_nest(op, inner, right));
        }
    }
    Expression::binary(op, left, right)
}

impl Expression {
    pub fn number(value: f64) -> Expression {
        Expression::Number(value)
    }

    pub fn variable(v: Variable) -> Expression {
        Expression::Variable(v)
    }

    pub fn unary(op: UnaryOp, operand: Expression, prefix: bool) -> Expression {
        Expression::Unary(UnaryOperator {
            op,
            operand: Box::new(operand),
            prefix,
        })
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
        Expression::Binary(BinaryOperator {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn call(signature: FunctionSignature, args: Vec<Expression>) -> Expression {
        Expression::Call(Call::new(signature, args))
    }

    /// `left + right`. Chains of `+` parse right-associative in this
    /// grammar (see the rotation rule in `parser.rs`), so when `left` is
    /// itself an `Add` this rotates the new node into a right-nested chain
    /// rather than building a tree that would need parentheses to print
    /// and reparse back to the same value. Safe because `+` over these
    /// operands is associative: the rotation never changes the result.
    pub fn add(left: Expression, right: Expression) -> Expression {
        right_nest(BinaryOp::Add, left, right)
    }

    pub fn sub(left: Expression, right: Expression) -> Expression {
        Expression::binary(BinaryOp::Sub, left, right)
    }

    /// `left * right`, right-nested like `add` for the same reason.
    pub fn mul(left: Expression, right: Expression) -> Expression {
        right_nest(BinaryOp::Mul, left, right)
    }

    pub fn div(left: Expression, right: Expression) -> Expression {
        Expression::binary(BinaryOp::Div, left, right)
    }

    pub fn gt(left: Expression, right: Expression) -> Expression {
        Expression::binary(BinaryOp::Gt, left, right)
    }

    pub fn lt(left: Expression, right: Expression) -> Expression {
        Expression::binary(BinaryOp::Lt, left, right)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expression::Number(n) if *n == 0.0)
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expression::Number(n) if *n == 1.0)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expression::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A function's name, return type, and parameter list — shared by
/// `FunctionDeclaration` (prototype only) and `Function` (prototype + body).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Variable>,
}

impl FunctionDeclaration {
    pub fn signature(&self) -> FunctionSignature {
        FunctionSignature::new(
            self.name.clone(),
            self.params.iter().map(|p| p.ty.clone()).collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub declaration: FunctionDeclaration,
    pub body: Vec<Statement>,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    Block(Vec<Statement>),
    Conditional {
        repeat: bool,
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    For {
        init: Box<Statement>,
        condition: Option<Expression>,
        step: Option<Expression>,
        body: Box<Statement>,
    },
    Return(Expression),
    Comment(String),
    Include {
        name: String,
        angle: bool,
    },
    FunctionDeclaration(FunctionDeclaration),
    Function(Function),
    Break,
}

/// The root of a parsed translation unit: a path, ordered top-level
/// statements, and the context accumulated while parsing it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub name: String,
    pub statements: Vec<Statement>,
    pub context: Context,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_op_precedence_matches_table() {
        assert!(BinaryOp::Dot.precedence() < BinaryOp::Mul.precedence());
        assert!(BinaryOp::Mul.precedence() < BinaryOp::Add.precedence());
        assert!(BinaryOp::Add.precedence() < BinaryOp::Lt.precedence());
        assert!(BinaryOp::Lt.precedence() < BinaryOp::Eq.precedence());
        assert!(BinaryOp::Eq.precedence() < BinaryOp::And.precedence());
        assert!(BinaryOp::And.precedence() < BinaryOp::Or.precedence());
        assert!(BinaryOp::Or.precedence() < BinaryOp::Assign.precedence());
    }

    #[test]
    fn zero_and_one_detection() {
        assert!(Expression::number(0.0).is_zero());
        assert!(Expression::number(1.0).is_one());
        assert!(!Expression::number(2.0).is_zero());
    }

    #[test]
    fn function_declaration_signature_uses_param_types() {
        let decl = FunctionDeclaration {
            name: "f".to_string(),
            return_type: Type::named("double"),
            params: vec![Variable::reference("x", Type::named("double"))],
        };
        assert_eq!(
            decl.signature(),
            FunctionSignature::new("f", vec![Type::named("double")])
        );
    }
}
