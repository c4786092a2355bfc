// ABOUTME: Recursive-descent parser building ast.rs nodes over a Lexer and Context

use crate::ast::{
    BinaryOp, BinaryOperator, Call, Expression, FileNode, Function, FunctionDeclaration,
    Statement, UnaryOp, Variable,
};
use crate::context::Context;
use crate::error::ParsingError;
use crate::lexer::{is_digit, is_identifier_start, is_terminator, Lexer};
use crate::types::{FunctionSignature, Type};
use std::rc::Rc;

pub struct Parser {
    lexer: Lexer,
}

impl Parser {
    pub fn new(source: &str) -> Parser {
        Parser {
            lexer: Lexer::new(source),
        }
    }

    // ---- expressions ----

    pub fn parse_expression(&mut self, ctx: &mut Context) -> Result<Expression, ParsingError> {
        self.lexer.skip_whitespace()?;
        let mut left = self.parse_primary(ctx)?;
        loop {
            self.lexer.skip_whitespace()?;
            if self.lexer.at_eof() || is_terminator(self.lexer.current()) {
                break;
            }
            if self.lexer.current() == '.' {
                let receiver = left.take().ok_or(ParsingError::MissingExpression)?;
                left = Some(self.parse_method_call(ctx, receiver)?);
                continue;
            }
            if self.lexer.current() == '[' {
                let receiver = left.take().ok_or(ParsingError::MissingExpression)?;
                left = Some(self.parse_index(ctx, receiver)?);
                continue;
            }
            let op_str = self.lexer.parse_operator()?;
            self.lexer.skip_whitespace()?;
            let right = self.parse_expression(ctx)?;
            left = Some(match left.take() {
                None => {
                    let op = unary_op_from_str(&op_str)?;
                    Expression::unary(op, right, true)
                }
                Some(l) => {
                    let op = binary_op_from_str(&op_str)?;
                    combine_with_rotation(op, l, right)
                }
            });
            // the recursive call above already consumed everything to the right
            break;
        }
        left.ok_or(ParsingError::MissingExpression)
    }

    fn parse_primary(&mut self, ctx: &mut Context) -> Result<Option<Expression>, ParsingError> {
        self.lexer.skip_whitespace()?;
        if self.lexer.at_eof() {
            return Ok(None);
        }
        let c = self.lexer.current();
        if c == '(' {
            self.lexer.step()?;
            self.lexer.skip_whitespace()?;
            let inner = self.parse_expression(ctx)?;
            self.lexer.verify_next_char_is(')', true)?;
            return Ok(Some(Expression::unary(UnaryOp::Braces, inner, true)));
        }
        if is_digit(c) {
            let value = self.lexer.parse_number()?;
            self.lexer.skip_whitespace()?;
            return Ok(Some(Expression::number(value)));
        }
        if is_identifier_start(c) {
            let name = self.lexer.parse_identifier(true, true)?;
            if ctx.is_variable_present(&name) {
                let var = ctx.get_variable(&name).unwrap().clone();
                return Ok(Some(Expression::variable(Variable::reference(
                    var.name, var.ty,
                ))));
            }
            if ctx.is_type_present(&name) {
                return Ok(Some(self.parse_variable_declaration(ctx, name)?));
            }
            if self.lexer.current() == '(' {
                return Ok(Some(Expression::Call(self.parse_call(ctx, &name)?)));
            }
            return Err(ParsingError::UndefinedIdentifier(name));
        }
        Ok(None)
    }

    fn parse_variable_declaration(
        &mut self,
        ctx: &mut Context,
        type_name: String,
    ) -> Result<Expression, ParsingError> {
        let params = self.parse_type_generics(ctx)?;
        self.lexer.skip_whitespace()?;
        let ty = if params.is_empty() {
            Type::named(type_name.clone())
        } else {
            Type::generic(type_name.clone(), params)
        };
        let var_name = self.lexer.parse_identifier(true, true)?;
        let constructor = if self.lexer.current() == '(' {
            Some(self.parse_call(ctx, &type_name)?)
        } else {
            None
        };
        let var = Variable::declared(var_name, ty, constructor);
        ctx.add_variable(var.clone());
        Ok(Expression::variable(var))
    }

    fn parse_method_call(
        &mut self,
        ctx: &mut Context,
        receiver: Expression,
    ) -> Result<Expression, ParsingError> {
        self.lexer.verify_next_char_is('.', true)?;
        let method = self.lexer.parse_identifier(false, true)?;
        let receiver_type = receiver_type_name(&receiver)?;
        let qualified = format!("{receiver_type}::{method}");
        let call = self.parse_call(ctx, &qualified)?;
        Ok(Expression::binary(
            BinaryOp::Dot,
            receiver,
            Expression::Call(call),
        ))
    }

    fn parse_index(
        &mut self,
        ctx: &mut Context,
        receiver: Expression,
    ) -> Result<Expression, ParsingError> {
        self.lexer.verify_next_char_is('[', true)?;
        let index = self.parse_expression(ctx)?;
        self.lexer.verify_next_char_is(']', true)?;
        Ok(Expression::binary(BinaryOp::Index, receiver, index))
    }

    fn parse_call(&mut self, ctx: &mut Context, name: &str) -> Result<Call, ParsingError> {
        self.lexer.verify_next_char_is('(', true)?;
        let mut args = Vec::new();
        while self.lexer.current() != ')' {
            if !args.is_empty() {
                self.lexer.verify_next_char_is(',', true)?;
            }
            args.push(self.parse_expression(ctx)?);
        }
        self.lexer.verify_next_char_is(')', true)?;
        let param_types = args.iter().map(infer_type).collect();
        let desired = FunctionSignature::new(name.to_string(), param_types);
        let signature = ctx
            .find_function(&desired)
            .ok_or_else(|| ParsingError::UnresolvedCall(name.to_string()))?;
        Ok(Call::new(signature, args))
    }

    // ---- types ----

    fn parse_type(&mut self, ctx: &Context) -> Result<Type, ParsingError> {
        self.lexer.skip_whitespace()?;
        if is_digit(self.lexer.current()) {
            let digits = self.lexer.parse_digit_string()?;
            self.lexer.skip_whitespace()?;
            return Ok(Type::named(digits));
        }
        let name = self.lexer.parse_identifier(true, true)?;
        if !ctx.is_type_present(&name) {
            return Err(ParsingError::UnknownType(name));
        }
        let params = self.parse_type_generics(ctx)?;
        self.lexer.skip_whitespace()?;
        Ok(if params.is_empty() {
            Type::named(name)
        } else {
            Type::generic(name, params)
        })
    }

    fn parse_type_generics(&mut self, ctx: &Context) -> Result<Vec<Type>, ParsingError> {
        let mut params = Vec::new();
        if self.lexer.current() != '<' {
            return Ok(params);
        }
        self.lexer.step()?;
        self.lexer.skip_whitespace()?;
        loop {
            params.push(self.parse_type(ctx)?);
            self.lexer.skip_whitespace()?;
            if self.lexer.current() == ',' {
                self.lexer.step()?;
                self.lexer.skip_whitespace()?;
                continue;
            }
            break;
        }
        self.lexer.verify_next_char_is('>', true)?;
        Ok(params)
    }

    // ---- statements ----

    pub fn parse_statement(
        &mut self,
        ctx: &mut Context,
        in_function: bool,
    ) -> Result<Statement, ParsingError> {
        self.lexer.skip_whitespace()?;
        if self.lexer.current() == '{' {
            return Ok(Statement::Block(self.parse_block(ctx, in_function)?));
        }
        if self.lexer.current() == '/' && self.lexer.peek_next() == '/' {
            return self.parse_comment();
        }
        if is_identifier_start(self.lexer.current()) {
            let identifier = self.lexer.parse_identifier(false, false)?;
            match identifier.as_str() {
                "if" | "while" => {
                    return self.parse_conditional(ctx, in_function, identifier == "while");
                }
                "for" => return self.parse_for(ctx, in_function),
                "return" => {
                    if !in_function {
                        return Err(ParsingError::StatementOutsideFunction {
                            keyword: "return".to_string(),
                        });
                    }
                    self.lexer.skip_whitespace()?;
                    let expr = self.parse_expression(ctx)?;
                    self.lexer.verify_next_char_is(';', true)?;
                    return Ok(Statement::Return(expr));
                }
                "break" => {
                    if !in_function {
                        return Err(ParsingError::StatementOutsideFunction {
                            keyword: "break".to_string(),
                        });
                    }
                    self.lexer.skip_whitespace()?;
                    self.lexer.verify_next_char_is(';', true)?;
                    return Ok(Statement::Break);
                }
                _ => {
                    self.lexer.step_back(identifier.chars().count())?;
                }
            }
        }
        let expr = self.parse_expression(ctx)?;
        self.lexer.verify_next_char_is(';', true)?;
        Ok(Statement::Expression(expr))
    }

    fn parse_comment(&mut self) -> Result<Statement, ParsingError> {
        self.lexer.step()?;
        self.lexer.step()?;
        let mut text = String::new();
        while !self.lexer.at_eof() && self.lexer.current() != '\n' {
            text.push(self.lexer.current());
            self.lexer.step()?;
        }
        self.lexer.skip_whitespace()?;
        Ok(Statement::Comment(text))
    }

    fn parse_conditional(
        &mut self,
        ctx: &mut Context,
        in_function: bool,
        repeat: bool,
    ) -> Result<Statement, ParsingError> {
        self.lexer.skip_whitespace()?;
        self.lexer.verify_next_char_is('(', true)?;
        let condition = self.parse_expression(ctx)?;
        self.lexer.verify_next_char_is(')', true)?;
        let then_branch = Box::new(self.parse_statement(ctx, in_function)?);
        let mut else_branch = None;
        if !repeat && is_identifier_start(self.lexer.current()) {
            let word = self.lexer.parse_identifier(false, false)?;
            if word == "else" {
                self.lexer.skip_whitespace()?;
                else_branch = Some(Box::new(self.parse_statement(ctx, in_function)?));
            } else {
                self.lexer.step_back(word.chars().count())?;
            }
        }
        Ok(Statement::Conditional {
            repeat,
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self, ctx: &mut Context, in_function: bool) -> Result<Statement, ParsingError> {
        self.lexer.skip_whitespace()?;
        self.lexer.verify_next_char_is('(', true)?;
        let init = Box::new(self.parse_statement(ctx, in_function)?);
        let condition = if self.lexer.current() == ';' {
            None
        } else {
            Some(self.parse_expression(ctx)?)
        };
        self.lexer.verify_next_char_is(';', true)?;
        let step = if self.lexer.current() == ')' {
            None
        } else {
            Some(self.parse_expression(ctx)?)
        };
        self.lexer.verify_next_char_is(')', true)?;
        let body = Box::new(self.parse_statement(ctx, in_function)?);
        Ok(Statement::For {
            init,
            condition,
            step,
            body,
        })
    }

    fn parse_block(
        &mut self,
        ctx: &mut Context,
        in_function: bool,
    ) -> Result<Vec<Statement>, ParsingError> {
        self.lexer.verify_next_char_is('{', true)?;
        let mut statements = Vec::new();
        while self.lexer.current() != '}' {
            statements.push(self.parse_statement(ctx, in_function)?);
        }
        self.lexer.verify_next_char_is('}', true)?;
        Ok(statements)
    }

    // ---- file-level ----

    fn parse_file_statement(&mut self, ctx: &mut Context) -> Result<Statement, ParsingError> {
        self.lexer.skip_whitespace()?;
        if self.lexer.current() == '#' {
            return self.parse_include();
        }
        if self.lexer.current() == '/' && self.lexer.peek_next() == '/' {
            return self.parse_comment();
        }
        self.parse_function_or_declaration(ctx)
    }

    fn parse_include(&mut self) -> Result<Statement, ParsingError> {
        self.lexer.step()?;
        let word = self.lexer.parse_identifier(false, true)?;
        if word != "include" {
            return Err(ParsingError::UnsupportedFileStatement(word));
        }
        let angle = self.lexer.current() == '<';
        let close = if angle { '>' } else { '"' };
        self.lexer.step()?;
        let mut name = String::new();
        while self.lexer.current() != close {
            name.push(self.lexer.current());
            self.lexer.step()?;
        }
        self.lexer.verify_next_char_is(close, true)?;
        if self.lexer.current() == ';' {
            self.lexer.step()?;
            self.lexer.skip_whitespace()?;
        }
        Ok(Statement::Include { name, angle })
    }

    fn parse_function_or_declaration(
        &mut self,
        ctx: &mut Context,
    ) -> Result<Statement, ParsingError> {
        let return_type = self.parse_type(ctx)?;
        let name = self.lexer.parse_identifier(true, true)?;
        self.lexer.verify_next_char_is('(', true)?;
        let mut params = Vec::new();
        while self.lexer.current() != ')' {
            if !params.is_empty() {
                self.lexer.verify_next_char_is(',', true)?;
            }
            let param_type = self.parse_type(ctx)?;
            let param_name = self.lexer.parse_identifier(true, true)?;
            params.push(Variable::reference(param_name, param_type));
        }
        self.lexer.verify_next_char_is(')', true)?;
        let declaration = FunctionDeclaration {
            name,
            return_type,
            params: params.clone(),
        };
        ctx.add_function(declaration.signature());
        if self.lexer.current() == ';' {
            self.lexer.step()?;
            self.lexer.skip_whitespace()?;
            return Ok(Statement::FunctionDeclaration(declaration));
        }
        let mut fn_ctx = Context::child(Rc::new(ctx.clone()));
        for param in &params {
            fn_ctx.add_variable(param.clone());
        }
        let body = self.parse_block(&mut fn_ctx, true)?;
        Ok(Statement::Function(Function {
            declaration,
            body,
            context: fn_ctx,
        }))
    }
}

/// Parses a whole translation unit. Any `ParsingError` that escapes is
/// wrapped exactly once here with the file/line/column of the lexer
/// position at the point of failure.
pub fn parse_file(
    source: &str,
    file_name: &str,
    default_context: &Context,
) -> Result<FileNode, ParsingError> {
    let mut parser = Parser::new(source);
    match parse_file_body(&mut parser, file_name, default_context) {
        Ok(file) => Ok(file),
        Err(e) => Err(e.at(file_name, parser.lexer.line(), parser.lexer.column())),
    }
}

fn parse_file_body(
    parser: &mut Parser,
    file_name: &str,
    default_context: &Context,
) -> Result<FileNode, ParsingError> {
    let mut ctx = Context::child(Rc::new(default_context.clone()));
    let mut statements = Vec::new();
    parser.lexer.skip_whitespace()?;
    while !parser.lexer.at_eof() {
        statements.push(parser.parse_file_statement(&mut ctx)?);
        parser.lexer.skip_whitespace()?;
    }
    Ok(FileNode {
        name: file_name.to_string(),
        statements,
        context: ctx,
    })
}

/// Rotates the freshly-built `BinaryOperator(op, left, right)` against
/// `right`'s root operator so that a tighter-binding `op` ends up deeper in
/// the tree than a looser-binding one parsed before it. Equal precedence
/// never rotates, which makes chains of same-precedence operators parse
/// right-associative.
fn combine_with_rotation(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    if let Expression::Binary(mut right_bin) = right {
        if op.precedence() < right_bin.op.precedence() {
            let rotated_left = Expression::binary(op, left, *right_bin.left);
            right_bin.left = Box::new(rotated_left);
            return Expression::Binary(right_bin);
        }
        return Expression::binary(op, left, Expression::Binary(right_bin));
    }
    Expression::binary(op, left, right)
}

fn unary_op_from_str(s: &str) -> Result<UnaryOp, ParsingError> {
    Ok(match s {
        "+" => UnaryOp::Plus,
        "-" => UnaryOp::Minus,
        "!" => UnaryOp::Not,
        "++" => UnaryOp::Increment,
        "--" => UnaryOp::Decrement,
        _ => return Err(ParsingError::UnsupportedOperator(s.to_string())),
    })
}

fn binary_op_from_str(s: &str) -> Result<BinaryOp, ParsingError> {
    Ok(match s {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::NotEq,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        "=" => BinaryOp::Assign,
        "+=" => BinaryOp::AddAssign,
        "-=" => BinaryOp::SubAssign,
        "*=" => BinaryOp::MulAssign,
        "/=" => BinaryOp::DivAssign,
        _ => return Err(ParsingError::UnsupportedOperator(s.to_string())),
    })
}

/// Infers a call argument's type for signature matching. Only a bare
/// variable carries a directly-known type; everything else resolves
/// against the context as `unknown` and relies on the coercion search in
/// `Context::find_function`.
fn infer_type(expr: &Expression) -> Type {
    match expr {
        Expression::Number(_) => Type::Unknown,
        Expression::Variable(v) => v.ty.clone(),
        Expression::Unary(u) => infer_type(&u.operand),
        Expression::Binary(b) => match b.op {
            BinaryOp::Dot | BinaryOp::Index => Type::Unknown,
            _ => {
                let left_ty = infer_type(&b.left);
                if left_ty.is_unknown() {
                    infer_type(&b.right)
                } else {
                    left_ty
                }
            }
        },
        Expression::Call(_) => Type::Unknown,
    }
}

fn receiver_type_name(expr: &Expression) -> Result<String, ParsingError> {
    match expr {
        Expression::Variable(v) => v
            .ty
            .name()
            .map(|s| s.to_string())
            .ok_or_else(|| ParsingError::UnsupportedOperator(".".to_string())),
        _ => Err(ParsingError::UnsupportedOperator(".".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double() -> Type {
        Type::named("double")
    }

    fn ctx_with(vars: &[(&str, Type)]) -> Context {
        let mut ctx = Context::new();
        ctx.add_type("double", double());
        for (name, ty) in vars {
            ctx.add_variable(Variable::reference(*name, ty.clone()));
        }
        ctx
    }

    #[test]
    fn equal_precedence_chain_is_right_associative() {
        let mut ctx = ctx_with(&[("x", double())]);
        let mut parser = Parser::new("x * x * x * x;");
        let expr = parser.parse_expression(&mut ctx).unwrap();
        match expr {
            Expression::Binary(BinaryOperator {
                op: BinaryOp::Mul,
                right,
                ..
            }) => match *right {
                Expression::Binary(BinaryOperator {
                    op: BinaryOp::Mul, ..
                }) => {}
                other => panic!("expected a nested multiplication, got {other:?}"),
            },
            other => panic!("expected a top-level multiplication, got {other:?}"),
        }
    }

    #[test]
    fn tighter_operator_rotates_into_the_right_subtree() {
        let mut ctx = ctx_with(&[("a", double()), ("b", double()), ("c", double())]);
        let mut parser = Parser::new("a + b * c;");
        let expr = parser.parse_expression(&mut ctx).unwrap();
        match expr {
            Expression::Binary(BinaryOperator {
                op: BinaryOp::Add,
                left,
                right,
            }) => {
                assert!(matches!(*left, Expression::Variable(_)));
                assert!(matches!(
                    *right,
                    Expression::Binary(BinaryOperator {
                        op: BinaryOp::Mul,
                        ..
                    })
                ));
            }
            other => panic!("expected a top-level addition, got {other:?}"),
        }
    }

    #[test]
    fn looser_operator_does_not_rotate() {
        let mut ctx = ctx_with(&[("a", double()), ("b", double()), ("c", double())]);
        let mut parser = Parser::new("a * b + c;");
        let expr = parser.parse_expression(&mut ctx).unwrap();
        match expr {
            Expression::Binary(BinaryOperator {
                op: BinaryOp::Mul,
                right,
                ..
            }) => {
                assert!(matches!(*right, Expression::Variable(_)));
            }
            other => panic!("expected a top-level multiplication, got {other:?}"),
        }
    }

    #[test]
    fn method_call_qualifies_name_with_receiver_type() {
        let mut ctx = ctx_with(&[]);
        let vector_ty = Type::generic("std::vector", vec![double()]);
        ctx.add_type("std::vector", Type::named("std::vector"));
        ctx.add_variable(Variable::reference("values", vector_ty));
        ctx.add_function(FunctionSignature::new("std::vector::size", vec![]));
        let mut parser = Parser::new("values.size();");
        let expr = parser.parse_expression(&mut ctx).unwrap();
        match expr {
            Expression::Binary(BinaryOperator {
                op: BinaryOp::Dot,
                right,
                ..
            }) => match *right {
                Expression::Call(call) => assert_eq!(call.signature.name, "std::vector::size"),
                other => panic!("expected a call, got {other:?}"),
            },
            other => panic!("expected a dot expression, got {other:?}"),
        }
    }

    #[test]
    fn if_without_trailing_else_parses_cleanly() {
        let mut ctx = ctx_with(&[("a", double())]);
        let mut parser = Parser::new("if (a) return a; ");
        let stmt = parser.parse_statement(&mut ctx, true).unwrap();
        match stmt {
            Statement::Conditional {
                repeat,
                else_branch,
                ..
            } => {
                assert!(!repeat);
                assert!(else_branch.is_none());
            }
            other => panic!("expected a conditional, got {other:?}"),
        }
    }

    #[test]
    fn if_else_attaches_the_else_branch() {
        let mut ctx = ctx_with(&[("a", double())]);
        let mut parser = Parser::new("if (a) return a; else return a;");
        let stmt = parser.parse_statement(&mut ctx, true).unwrap();
        match stmt {
            Statement::Conditional { else_branch, .. } => assert!(else_branch.is_some()),
            other => panic!("expected a conditional, got {other:?}"),
        }
    }

    #[test]
    fn local_declaration_registers_the_variable_in_context() {
        let mut ctx = ctx_with(&[]);
        let mut parser = Parser::new("double y;");
        let stmt = parser.parse_statement(&mut ctx, true).unwrap();
        assert!(ctx.is_variable_present("y"));
        match stmt {
            Statement::Expression(Expression::Variable(v)) => {
                assert!(v.declaration);
                assert_eq!(v.name, "y");
            }
            other => panic!("expected a variable declaration expression, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_definition_with_nested_block() {
        let mut ctx = Context::new();
        ctx.add_type("double", double());
        let mut parser = Parser::new("double f(double x) { return x; }");
        let stmt = parser.parse_file_statement(&mut ctx).unwrap();
        match stmt {
            Statement::Function(func) => {
                assert_eq!(func.declaration.name, "f");
                assert_eq!(func.body.len(), 1);
            }
            other => panic!("expected a function, got {other:?}"),
        }
    }
}
