// ABOUTME: Error types for parsing and differentiation failures

use thiserror::Error;

/// A file:line:column annotation attached once, at the parser's top-level
/// entry point, to the first `ParsingError` that escapes a parse.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParsingError {
    #[error("unexpected character '{found}', expected '{expected}'")]
    UnexpectedChar { expected: char, found: char },

    #[error("invalid character '{0}' in identifier")]
    InvalidIdentifierChar(char),

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("identifier '{0}' was not defined in this context")]
    UndefinedIdentifier(String),

    #[error("type '{0}' is not supported")]
    UnknownType(String),

    #[error("missing expression")]
    MissingExpression,

    #[error("function '{name}' expects {expected} argument{}, but {actual} were provided",
        if *.expected == 1 { "" } else { "s" })]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("'{keyword}' is not allowed outside of a function body")]
    StatementOutsideFunction { keyword: String },

    #[error("no function matches call to '{0}'")]
    UnresolvedCall(String),

    #[error("file statement of type '{0}' is not supported")]
    UnsupportedFileStatement(String),

    #[error("unable to step back {steps} characters before the line start")]
    StepBackPastLineStart { steps: usize },

    #[error("file ended before expected")]
    UnexpectedEof,

    #[error("failed to read '{path}': {message}")]
    Io { path: String, message: String },

    #[error("{inner}")]
    Located {
        #[source]
        inner: Box<ParsingError>,
        location: SourceLocation,
    },
}

impl ParsingError {
    /// Wraps `self` with a file:line:column annotation, done exactly once at
    /// the outermost parse entry point.
    pub fn at(self, file: &str, line: usize, column: usize) -> ParsingError {
        ParsingError::Located {
            inner: Box::new(self),
            location: SourceLocation {
                file: file.to_string(),
                line,
                column,
            },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DifferentiationError {
    #[error("unsupported expression kind for differentiation")]
    UnsupportedExpression,

    #[error("unsupported statement kind for differentiation")]
    UnsupportedStatement,

    #[error("unsupported unary operator for differentiation")]
    UnsupportedUnaryOperator,

    #[error("unsupported binary operator for differentiation")]
    UnsupportedBinaryOperator,

    #[error("only variables are allowed as assignable targets in equalities")]
    NonAssignableLeftHandSide,

    #[error("cannot differentiate: variable '{0}' was not defined")]
    UndefinedVariable(String),

    #[error("cannot differentiate call to '{0}': no derivative rule is registered")]
    NoRuleForCall(String),

    #[error("only a bare variable is allowed as the return expression of a function with multiple parameters")]
    NonVariableMultiParamReturn,

    #[error("at least one statement is required here")]
    EmptyStatementList,

    #[error("unsupported file statement for differentiation")]
    UnsupportedFileStatement,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DifferError {
    #[error(transparent)]
    Parsing(#[from] ParsingError),

    #[error(transparent)]
    Differentiation(#[from] DifferentiationError),
}
