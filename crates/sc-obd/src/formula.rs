//! Catalog formula evaluator.
//!
//! Formulas are plain arithmetic over the data bytes of a response, named
//! `A` (first data byte) through `G` (seventh): `((A*256)+B)/4`, `A-40`,
//! `A*100/255.0`. The grammar is
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := '-' unary | '+' unary | atom
//! atom   := number | variable | '(' expr ')'
//! ```
//!
//! Integer literals and byte variables are integers. Integer `/` integer is
//! floor division; any float operand makes the result a float.

use thiserror::Error;

/// Highest number of positional byte variables (`A`..=`G`).
pub const MAX_VARIABLES: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected {token} at {pos}")]
    UnexpectedToken { token: String, pos: usize },

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unknown variable {0:?}")]
    UnknownVariable(String),

    #[error("variable {0} not bound")]
    MissingVariable(char),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,
}

/// Result of evaluating a formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Int(i64),
    Float(f64),
    Var(usize),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Var(usize),
    Op(Op),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(v) => v.to_string(),
            Token::Float(v) => v.to_string(),
            Token::Var(i) => variable_name(*i).to_string(),
            Token::Op(Op::Add) => "'+'".into(),
            Token::Op(Op::Sub) => "'-'".into(),
            Token::Op(Op::Mul) => "'*'".into(),
            Token::Op(Op::Div) => "'/'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

fn variable_name(index: usize) -> char {
    (b'A' + index as u8) as char
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let start = i;
        match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => tokens.push((Token::Op(Op::Add), start)),
            '-' => tokens.push((Token::Op(Op::Sub), start)),
            '*' => tokens.push((Token::Op(Op::Mul), start)),
            '/' => tokens.push((Token::Op(Op::Div), start)),
            '(' => tokens.push((Token::LParen, start)),
            ')' => tokens.push((Token::RParen, start)),
            c if c.is_ascii_digit() || c == '.' => {
                while i + 1 < chars.len() && (chars[i + 1].is_ascii_digit() || chars[i + 1] == '.') {
                    i += 1;
                }
                let text: String = chars[start..=i].iter().collect();
                let token = if text.contains('.') {
                    text.parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| FormulaError::UnexpectedToken { token: text.clone(), pos: start })?
                } else {
                    text.parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| FormulaError::Overflow)?
                };
                tokens.push((token, start));
            }
            c if c.is_ascii_alphabetic() => {
                while i + 1 < chars.len() && chars[i + 1].is_ascii_alphanumeric() {
                    i += 1;
                }
                let name: String = chars[start..=i].iter().collect();
                let index = match name.as_bytes() {
                    [b @ b'A'..=b'G'] => (b - b'A') as usize,
                    _ => return Err(FormulaError::UnknownVariable(name)),
                };
                tokens.push((Token::Var(index), start));
            }
            other => return Err(FormulaError::UnexpectedChar { ch: other, pos: start }),
        }
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        item
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (Op::Add | Op::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (Op::Mul | Op::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Op(Op::Sub)) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op(Op::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some((Token::Int(v), _)) => Ok(Expr::Int(v)),
            Some((Token::Float(v), _)) => Ok(Expr::Float(v)),
            Some((Token::Var(i), _)) => Ok(Expr::Var(i)),
            Some((Token::LParen, _)) => {
                let inner = self.expr()?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(inner),
                    Some((tok, pos)) => Err(FormulaError::UnexpectedToken { token: tok.describe(), pos }),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            Some((tok, pos)) => Err(FormulaError::UnexpectedToken { token: tok.describe(), pos }),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}

/// A compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parse a formula once; evaluation never re-parses.
    pub fn compile(source: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        if let Some((tok, pos)) = parser.next() {
            return Err(FormulaError::UnexpectedToken { token: tok.describe(), pos });
        }
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `bytes[0]` bound to `A`, `bytes[1]` to `B`, and so on.
    pub fn eval(&self, bytes: &[u8]) -> Result<Number, FormulaError> {
        eval(&self.expr, bytes)
    }
}

fn eval(expr: &Expr, bytes: &[u8]) -> Result<Number, FormulaError> {
    match expr {
        Expr::Int(v) => Ok(Number::Int(*v)),
        Expr::Float(v) => Ok(Number::Float(*v)),
        Expr::Var(i) => bytes
            .get(*i)
            .filter(|_| *i < MAX_VARIABLES)
            .map(|b| Number::Int(i64::from(*b)))
            .ok_or(FormulaError::MissingVariable(variable_name(*i))),
        Expr::Neg(inner) => match eval(inner, bytes)? {
            Number::Int(v) => v.checked_neg().map(Number::Int).ok_or(FormulaError::Overflow),
            Number::Float(v) => Ok(Number::Float(-v)),
        },
        Expr::Binary(op, lhs, rhs) => apply(*op, eval(lhs, bytes)?, eval(rhs, bytes)?),
    }
}

fn apply(op: Op, lhs: Number, rhs: Number) -> Result<Number, FormulaError> {
    match (lhs, rhs) {
        (Number::Int(a), Number::Int(b)) => {
            let result = match op {
                Op::Add => a.checked_add(b),
                Op::Sub => a.checked_sub(b),
                Op::Mul => a.checked_mul(b),
                Op::Div => {
                    if b == 0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    floor_div(a, b)
                }
            };
            result.map(Number::Int).ok_or(FormulaError::Overflow)
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            let value = match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Div => {
                    if b == 0.0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    a / b
                }
            };
            Ok(Number::Float(value))
        }
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(src: &str, bytes: &[u8]) -> Number {
        Formula::compile(src).unwrap().eval(bytes).unwrap()
    }

    #[test]
    fn rpm_formula() {
        // 1A F8 → (26*256 + 248) / 4 = 1726
        assert_eq!(eval_str("((A*256)+B)/4", &[0x1A, 0xF8]), Number::Int(1726));
        assert_eq!(eval_str("((A*256)+B)/4.0", &[0x1A, 0xF9]), Number::Float(1726.25));
    }

    #[test]
    fn integer_division_floors() {
        assert_eq!(eval_str("A/2", &[7]), Number::Int(3));
        assert_eq!(eval_str("(A-10)/2", &[3]), Number::Int(-4));
    }

    #[test]
    fn precedence_and_unary_minus() {
        assert_eq!(eval_str("A-40", &[0x73]), Number::Int(75));
        assert_eq!(eval_str("2+3*4", &[]), Number::Int(14));
        assert_eq!(eval_str("-A+1", &[5]), Number::Int(-4));
        assert_eq!(eval_str("(B-128)*100/128.0", &[0, 0x90]), Number::Float(12.5));
    }

    #[test]
    fn all_seven_variables_bind() {
        let bytes = [1, 2, 3, 4, 5, 6, 7];
        assert_eq!(eval_str("A+B+C+D+E+F+G", &bytes), Number::Int(28));
    }

    #[test]
    fn rejects_anything_but_arithmetic() {
        assert!(matches!(
            Formula::compile("__import__('os')"),
            Err(FormulaError::UnexpectedChar { .. }) | Err(FormulaError::UnknownVariable(_))
        ));
        assert_eq!(
            Formula::compile("H*2"),
            Err(FormulaError::UnknownVariable("H".into()))
        );
        assert!(matches!(
            Formula::compile("A**2"),
            Err(FormulaError::UnexpectedToken { .. })
        ));
        assert_eq!(Formula::compile("(A+1"), Err(FormulaError::UnexpectedEnd));
        assert!(matches!(
            Formula::compile("A B"),
            Err(FormulaError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn evaluation_errors() {
        let f = Formula::compile("A/B").unwrap();
        assert_eq!(f.eval(&[1, 0]), Err(FormulaError::DivisionByZero));
        assert_eq!(f.eval(&[1]), Err(FormulaError::MissingVariable('B')));
    }
}
