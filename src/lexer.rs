// ABOUTME: Character-oriented scanner with one-character lookahead and line/column tracking

use crate::error::ParsingError;

const EOF_SENTINEL: char = '\0';

/// Scans an owned source buffer one character at a time. Plain struct over
/// a `String`, not a file handle, so it is independently unit-testable
/// (file reading is a thin wrapper in `driver.rs`).
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    current: char,
    at_eof: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Lexer {
        let chars: Vec<char> = source.chars().collect();
        let current = chars.first().copied().unwrap_or(EOF_SENTINEL);
        Lexer {
            at_eof: chars.is_empty(),
            chars,
            pos: 0,
            line: 1,
            column: 1,
            current,
        }
    }

    pub fn current(&self) -> char {
        self.current
    }

    pub fn at_eof(&self) -> bool {
        self.at_eof
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn step(&mut self) -> Result<(), ParsingError> {
        if self.at_eof {
            return Err(ParsingError::UnexpectedEof);
        }
        if self.current == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += 1;
        if self.pos >= self.chars.len() {
            self.at_eof = true;
            self.current = EOF_SENTINEL;
        } else {
            self.current = self.chars[self.pos];
        }
        Ok(())
    }

    /// Steps back `steps` characters within the current line.
    pub fn step_back(&mut self, steps: usize) -> Result<(), ParsingError> {
        if self.column <= steps {
            return Err(ParsingError::StepBackPastLineStart { steps });
        }
        self.pos -= steps;
        self.column -= steps;
        self.current = self.chars[self.pos];
        self.at_eof = false;
        Ok(())
    }

    pub fn skip_whitespace(&mut self) -> Result<(), ParsingError> {
        while !self.at_eof && is_whitespace(self.current) {
            self.step()?;
        }
        Ok(())
    }

    pub fn verify_next_char_is(&mut self, c: char, skip_space: bool) -> Result<(), ParsingError> {
        if self.current != c {
            return Err(ParsingError::UnexpectedChar {
                expected: c,
                found: self.current,
            });
        }
        self.step()?;
        if skip_space {
            self.skip_whitespace()?;
        }
        Ok(())
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`, optionally allowing embedded `:` for
    /// qualified names (`std::cos`).
    pub fn parse_identifier(
        &mut self,
        allow_colon: bool,
        skip_space: bool,
    ) -> Result<String, ParsingError> {
        if !is_identifier_start(self.current) {
            return Err(ParsingError::InvalidIdentifierChar(self.current));
        }
        let mut s = String::new();
        loop {
            if is_identifier_continue(self.current) {
                s.push(self.current);
                self.step()?;
            } else if allow_colon && self.current == ':' && self.peek_is(':') {
                s.push(':');
                s.push(':');
                self.step()?;
                self.step()?;
            } else {
                break;
            }
        }
        if skip_space {
            self.skip_whitespace()?;
        }
        Ok(s)
    }

    fn peek_is(&self, c: char) -> bool {
        self.chars.get(self.pos + 1).copied() == Some(c)
    }

    /// `[0-9]+(\.[0-9]+)?(e-?[0-9]+)?`, parsed locale-independently.
    pub fn parse_number(&mut self) -> Result<f64, ParsingError> {
        let mut s = String::new();
        while is_digit(self.current) {
            s.push(self.current);
            self.step()?;
        }
        if self.current == '.' && self.chars.get(self.pos + 1).is_some_and(|c| is_digit(*c)) {
            s.push('.');
            self.step()?;
            while is_digit(self.current) {
                s.push(self.current);
                self.step()?;
            }
        }
        if self.current == 'e' {
            let mut exponent = String::from('e');
            let save_pos = self.pos;
            let save_line = self.line;
            let save_col = self.column;
            self.step()?;
            if self.current == '-' {
                exponent.push('-');
                self.step()?;
            }
            if is_digit(self.current) {
                while is_digit(self.current) {
                    exponent.push(self.current);
                    self.step()?;
                }
                s.push_str(&exponent);
            } else {
                self.pos = save_pos;
                self.line = save_line;
                self.column = save_col;
                self.current = self.chars[self.pos];
                self.at_eof = false;
            }
        }
        s.parse::<f64>()
            .map_err(|_| ParsingError::InvalidIdentifierChar(self.current))
    }

    pub fn peek_next(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or(EOF_SENTINEL)
    }

    /// `[0-9]+`, used for type-level numeric constants (`std::array<double, 4>`'s `4`).
    pub fn parse_digit_string(&mut self) -> Result<String, ParsingError> {
        let mut s = String::new();
        while is_digit(self.current) {
            s.push(self.current);
            self.step()?;
        }
        if s.is_empty() {
            return Err(ParsingError::InvalidIdentifierChar(self.current));
        }
        Ok(s)
    }

    /// The maximal run of non-alphanumeric, non-whitespace, non-paren
    /// characters starting at the current position.
    pub fn parse_operator(&mut self) -> Result<String, ParsingError> {
        let mut s = String::new();
        while !self.at_eof && is_operator_char(self.current) {
            s.push(self.current);
            self.step()?;
        }
        if s.is_empty() {
            return Err(ParsingError::UnsupportedOperator(self.current.to_string()));
        }
        Ok(s)
    }
}

pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

pub fn is_low_char(c: char) -> bool {
    c.is_ascii_lowercase()
}

pub fn is_upper_char(c: char) -> bool {
    c.is_ascii_uppercase()
}

pub fn is_identifier_start(c: char) -> bool {
    is_low_char(c) || is_upper_char(c) || c == '_'
}

pub fn is_identifier_continue(c: char) -> bool {
    is_identifier_start(c) || is_digit(c)
}

pub fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\n' || c == '\r' || c == EOF_SENTINEL
}

pub fn is_terminator(c: char) -> bool {
    c == ')' || c == ';' || c == ',' || c == ']'
}

pub fn is_operator_char(c: char) -> bool {
    !c.is_alphanumeric()
        && c != '_'
        && !is_whitespace(c)
        && !matches!(c, '(' | ')' | '{' | '}' | ';' | ',' | '[' | ']')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_through_source_tracking_line_and_column() {
        let mut lexer = Lexer::new("ab\ncd");
        assert_eq!(lexer.current(), 'a');
        lexer.step().unwrap();
        assert_eq!(lexer.current(), 'b');
        assert_eq!(lexer.column(), 2);
        lexer.step().unwrap();
        assert_eq!(lexer.current(), '\n');
        lexer.step().unwrap();
        assert_eq!(lexer.current(), 'c');
        assert_eq!(lexer.line(), 2);
        assert_eq!(lexer.column(), 1);
    }

    #[test]
    fn step_back_restores_earlier_character() {
        let mut lexer = Lexer::new("abc");
        lexer.step().unwrap();
        lexer.step().unwrap();
        assert_eq!(lexer.current(), 'c');
        lexer.step_back(2).unwrap();
        assert_eq!(lexer.current(), 'a');
    }

    #[test]
    fn parses_qualified_identifier() {
        let mut lexer = Lexer::new("std::cos(");
        let name = lexer.parse_identifier(true, false).unwrap();
        assert_eq!(name, "std::cos");
        assert_eq!(lexer.current(), '(');
    }

    #[test]
    fn parses_number_with_exponent() {
        let mut lexer = Lexer::new("3.5e-2 ");
        let value = lexer.parse_number().unwrap();
        assert_eq!(value, 3.5e-2);
    }

    #[test]
    fn parses_plain_integer() {
        let mut lexer = Lexer::new("42;");
        let value = lexer.parse_number().unwrap();
        assert_eq!(value, 42.0);
        assert_eq!(lexer.current(), ';');
    }

    #[test]
    fn parses_maximal_operator_run() {
        let mut lexer = Lexer::new("+= x");
        let op = lexer.parse_operator().unwrap();
        assert_eq!(op, "+=");
    }

    #[test]
    fn verify_next_char_mismatch_is_an_error() {
        let mut lexer = Lexer::new("abc");
        assert!(lexer.verify_next_char_is('x', false).is_err());
    }
}
