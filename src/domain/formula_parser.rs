//! Threshold formula parser.
//!
//! Recursive descent over the grammar:
//!
//! ```text
//! comparison := additive (("<" | "<=" | ">" | ">=" | "==" | "!=") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := ("-" | "+") unary | power
//! power      := primary ("**" unary)?
//! primary    := number | field | "(" comparison ")"
//! ```
//!
//! Errors carry the character offset of the offending token. Nesting of
//! parentheses, unary signs and powers is capped at [`MAX_DEPTH`].

use crate::domain::error::ParseError;
use crate::domain::formula::{BinaryOp, Expr};

pub const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            position: self.pos,
        }
    }

    fn found(&self) -> String {
        self.peek()
            .map(|c| format!("'{c}'"))
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn parse_number(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut digits = 0;
        let mut has_dot = false;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            let exp_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            if self.pos == exp_start {
                self.pos = mark;
            }
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map(Expr::Number).map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_identifier(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let name = self.input[start..self.pos].to_string();

        self.skip_whitespace();
        if self.peek() == Some('(') {
            return Err(ParseError {
                message: format!("function calls are not allowed: '{}'", name),
                position: start,
            });
        }
        if self.peek() == Some('.') {
            return Err(self.error(format!("attribute access is not allowed on '{}'", name)));
        }
        Ok(Expr::Field(name))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.parse_number(),
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => self.parse_identifier(),
            Some('(') => {
                self.advance();
                let expr = self.parse_comparison()?;
                self.expect_char(')')?;
                Ok(expr)
            }
            _ => Err(self.error(format!("expected number, field or '(', found {}", self.found()))),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        self.skip_whitespace();
        if self.consume_exact("**") {
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    // Every recursive path passes through here.
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!(
                "formula nested deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = self.parse_unary_inner();
        self.depth -= 1;
        result
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        if self.consume_exact("-") {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        if self.consume_exact("+") {
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = if self.remaining().starts_with("**") {
                break;
            } else if self.consume_exact("*") {
                BinaryOp::Mul
            } else if self.consume_exact("/") {
                BinaryOp::Div
            } else if self.consume_exact("%") {
                BinaryOp::Rem
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let op = if self.consume_exact("+") {
                BinaryOp::Add
            } else if self.consume_exact("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_term()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison_op(&mut self) -> Option<BinaryOp> {
        self.skip_whitespace();
        // Two-character operators first.
        for (text, op) in [
            ("<=", BinaryOp::Le),
            (">=", BinaryOp::Ge),
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            ("<", BinaryOp::Lt),
            (">", BinaryOp::Gt),
        ] {
            if self.consume_exact(text) {
                return Some(op);
            }
        }
        None
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        match self.parse_comparison_op() {
            Some(op) => {
                let right = self.parse_additive()?;
                Ok(Expr::binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return Err(self.error("empty formula".to_string()));
        }
        let expr = self.parse_comparison()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after formula: '{}'",
                self.remaining()
            )));
        }
        Ok(expr)
    }
}

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
