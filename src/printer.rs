// ABOUTME: Pretty-printer turning AST nodes back into source text

use crate::ast::{
    BinaryOp, BinaryOperator, Call, Expression, FileNode, Function, FunctionDeclaration,
    Statement, UnaryOp, UnaryOperator, Variable,
};
use std::fmt;

const INDENT: &str = "\t";

/// Renders a number the way the language spells it: integral values without
/// a trailing `.0`, everything else via the default `f64` formatting.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Plus => "+",
        UnaryOp::Minus => "-",
        UnaryOp::Not => "!",
        UnaryOp::Increment => "++",
        UnaryOp::Decrement => "--",
        UnaryOp::Braces => "",
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        BinaryOp::Assign => "=",
        BinaryOp::AddAssign => "+=",
        BinaryOp::SubAssign => "-=",
        BinaryOp::MulAssign => "*=",
        BinaryOp::DivAssign => "/=",
        BinaryOp::Dot => ".",
        BinaryOp::Index => "[",
    }
}

/// Whether `child` needs parentheses when printed as a direct operand of a
/// binary operator with `parent_precedence`, on the given side. Lower
/// precedence numbers bind tighter (see `BinaryOp::precedence`).
///
/// Equal-precedence chains in this grammar always parse right-associative
/// (see the rotation rule in `parser.rs`), so a flat, unparenthesized chain
/// reconstructs a right-nested tree: an equal-precedence right child never
/// needs parens, but an equal-precedence left child does, or printing it
/// flat would silently re-nest it to the wrong side.
fn needs_parens(child: &Expression, parent_precedence: u8, is_right: bool) -> bool {
    match child {
        Expression::Binary(b) if !matches!(b.op, BinaryOp::Dot | BinaryOp::Index) => {
            let child_precedence = b.op.precedence();
            if child_precedence > parent_precedence {
                true
            } else {
                child_precedence == parent_precedence && !is_right
            }
        }
        _ => false,
    }
}

impl Expression {
    pub fn to_source(&self) -> String {
        match self {
            Expression::Number(n) => format_number(*n),
            Expression::Variable(v) => v.to_source(),
            Expression::Unary(u) => u.to_source(),
            Expression::Binary(b) => b.to_source(),
            Expression::Call(c) => c.to_source(false),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_source())
    }
}

impl Variable {
    pub fn to_source(&self) -> String {
        if !self.declaration {
            return self.name.clone();
        }
        match &self.constructor {
            Some(call) => format!("{} {}{}", self.ty, self.name, call.args_source()),
            None => format!("{} {}", self.ty, self.name),
        }
    }
}

impl UnaryOperator {
    pub fn to_source(&self) -> String {
        if matches!(self.op, UnaryOp::Braces) {
            return format!("({})", self.operand.to_source());
        }
        let symbol = unary_symbol(self.op);
        let operand = self.operand.to_source();
        if self.prefix {
            format!("{symbol}{operand}")
        } else {
            format!("{operand}{symbol}")
        }
    }
}

impl Call {
    fn args_source(&self) -> String {
        let args: Vec<String> = self.args.iter().map(Expression::to_source).collect();
        format!("({})", args.join(", "))
    }

    /// `as_method`: print only the last `::`-qualified segment of the name,
    /// used when this call is the right child of a `Dot` expression.
    pub fn to_source(&self, as_method: bool) -> String {
        let name = if as_method {
            self.signature
                .name
                .rsplit("::")
                .next()
                .unwrap_or(&self.signature.name)
        } else {
            &self.signature.name
        };
        format!("{name}{}", self.args_source())
    }
}

impl BinaryOperator {
    pub fn to_source(&self) -> String {
        if matches!(self.op, BinaryOp::Index) {
            return format!("{}[{}]", self.left.to_source(), self.right.to_source());
        }
        if matches!(self.op, BinaryOp::Dot) {
            let method = match self.right.as_ref() {
                Expression::Call(call) => call.to_source(true),
                other => other.to_source(),
            };
            return format!("{}.{}", self.left.to_source(), method);
        }
        let precedence = self.op.precedence();
        let left = if needs_parens(&self.left, precedence, false) {
            format!("({})", self.left.to_source())
        } else {
            self.left.to_source()
        };
        let right = if needs_parens(&self.right, precedence, true) {
            format!("({})", self.right.to_source())
        } else {
            self.right.to_source()
        };
        format!("{left} {} {right}", binary_symbol(self.op))
    }
}

impl FunctionDeclaration {
    pub fn to_source(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect();
        format!("{} {}({})", self.return_type, self.name, params.join(", "))
    }
}

struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn new() -> Printer {
        Printer {
            out: String::new(),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn line(&mut self, text: &str) {
        self.indent();
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn print_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Expression(e) => self.line(&format!("{};", e.to_source())),
            Statement::Block(stmts) => {
                self.line("{");
                self.depth += 1;
                for s in stmts {
                    self.print_statement(s);
                }
                self.depth -= 1;
                self.line("}");
            }
            Statement::Conditional {
                repeat,
                condition,
                then_branch,
                else_branch,
            } => {
                let keyword = if *repeat { "while" } else { "if" };
                self.line(&format!("{keyword} ({})", condition.to_source()));
                self.print_statement(then_branch);
                if let Some(else_stmt) = else_branch {
                    self.line("else");
                    self.print_statement(else_stmt);
                }
            }
            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                let init_source = statement_header_source(init);
                let condition_source = condition.as_ref().map(Expression::to_source).unwrap_or_default();
                let step_source = step.as_ref().map(Expression::to_source).unwrap_or_default();
                self.line(&format!(
                    "for ({init_source} {condition_source}; {step_source})"
                ));
                self.print_statement(body);
            }
            Statement::Return(e) => self.line(&format!("return {};", e.to_source())),
            Statement::Comment(text) => self.line(&format!("//{text}")),
            Statement::Include { name, angle } => {
                if *angle {
                    self.line(&format!("#include <{name}>"));
                } else {
                    self.line(&format!("#include \"{name}\""));
                }
            }
            Statement::FunctionDeclaration(decl) => self.line(&format!("{};", decl.to_source())),
            Statement::Function(func) => self.print_function(func),
            Statement::Break => self.line("break;"),
        }
    }

    fn print_function(&mut self, func: &Function) {
        self.line(&format!("{} {{", func.declaration.to_source()));
        self.depth += 1;
        for stmt in &func.body {
            self.print_statement(stmt);
        }
        self.depth -= 1;
        self.line("}");
    }
}

impl Statement {
    pub fn to_source(&self) -> String {
        let mut printer = Printer::new();
        printer.print_statement(self);
        printer.out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_source())
    }
}

/// The text of a statement used as a `for`-loop's init clause, without its
/// trailing `;` (the caller supplies the loop's own separators).
fn statement_header_source(stmt: &Statement) -> String {
    match stmt {
        Statement::Expression(e) => format!("{};", e.to_source()),
        other => {
            let mut printer = Printer::new();
            printer.print_statement(other);
            printer.out.trim().to_string()
        }
    }
}

impl FileNode {
    pub fn to_source(&self) -> String {
        let mut printer = Printer::new();
        for (i, stmt) in self.statements.iter().enumerate() {
            if i != 0 {
                if matches!(stmt, Statement::Function(_))
                    || matches!(self.statements[i - 1], Statement::Function(_))
                {
                    printer.out.push('\n');
                }
            }
            printer.print_statement(stmt);
        }
        printer.out
    }
}

impl fmt::Display for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_source())
    }
}
