//! Recursive descent parser for filter expressions.
//!
//! ```text
//! expr    := or
//! or      := and (("or" | "||") and)*
//! and     := unary (("and" | "&&") unary)*
//! unary   := ("not" | "!") unary | primary
//! primary := "(" expr ")" | path (op literal)?
//! path    := ident ("." ident)*
//! ```

use crate::error::FilterError;

use super::lexer::{tokenize, Lexeme, Spanned};
use super::CompareOp;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Bare path: layer presence or property truthiness
    Test(Vec<String>),
    Compare {
        path: Vec<String>,
        op: CompareOp,
        literal: Literal,
    },
}

pub(crate) fn parse(input: &str) -> Result<Expr, FilterError> {
    let lexemes = tokenize(input)?;
    let mut parser = Parser { lexemes, pos: 0 };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(extra) => Err(unexpected(extra)),
    }
}

struct Parser {
    lexemes: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.lexemes.get(self.pos)
    }

    fn next(&mut self) -> Result<Spanned, FilterError> {
        let spanned = self
            .lexemes
            .get(self.pos)
            .cloned()
            .ok_or(FilterError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(spanned)
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.peek().is_some_and(|s| &s.lexeme == lexeme) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.and()?;
        while self.eat(&Lexeme::Or) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.unary()?;
        while self.eat(&Lexeme::And) {
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&Lexeme::Not) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FilterError> {
        let first = self.next()?;
        match first.lexeme {
            Lexeme::LParen => {
                let inner = self.or()?;
                let close = self.next()?;
                if close.lexeme != Lexeme::RParen {
                    return Err(unexpected(&close));
                }
                Ok(inner)
            }
            Lexeme::Ident(name) => {
                let path = self.path(name)?;
                let op = match self.peek() {
                    Some(Spanned {
                        lexeme: Lexeme::Op(op),
                        ..
                    }) => *op,
                    _ => return Ok(Expr::Test(path)),
                };
                self.pos += 1;
                let literal = self.literal()?;
                Ok(Expr::Compare { path, op, literal })
            }
            _ => Err(unexpected(&first)),
        }
    }

    fn path(&mut self, first: String) -> Result<Vec<String>, FilterError> {
        let mut segments = vec![first];
        while self.eat(&Lexeme::Dot) {
            let segment = self.next()?;
            match segment.lexeme {
                Lexeme::Ident(name) => segments.push(name),
                _ => return Err(unexpected(&segment)),
            }
        }
        Ok(segments)
    }

    fn literal(&mut self) -> Result<Literal, FilterError> {
        let spanned = self.next()?;
        match spanned.lexeme {
            Lexeme::Int(v) => Ok(Literal::Int(v)),
            Lexeme::Float(v) => Ok(Literal::Float(v)),
            Lexeme::Str(s) => Ok(Literal::Str(s)),
            Lexeme::Bool(b) => Ok(Literal::Bool(b)),
            _ => Err(unexpected(&spanned)),
        }
    }
}

fn unexpected(spanned: &Spanned) -> FilterError {
    FilterError::UnexpectedToken {
        found: spanned.lexeme.to_string(),
        pos: spanned.pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(String::from).collect()
    }

    #[test]
    fn test_precedence() {
        // and binds tighter than or
        let expr = parse("a or b and not c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::Test(path("a"))),
                Box::new(Expr::And(
                    Box::new(Expr::Test(path("b"))),
                    Box::new(Expr::Not(Box::new(Expr::Test(path("c"))))),
                )),
            )
        );
    }

    #[test]
    fn test_parentheses() {
        let expr = parse("(a || b) && tcp.dst == 80").unwrap();
        assert_eq!(
            expr,
            Expr::And(
                Box::new(Expr::Or(
                    Box::new(Expr::Test(path("a"))),
                    Box::new(Expr::Test(path("b"))),
                )),
                Box::new(Expr::Compare {
                    path: path("tcp.dst"),
                    op: CompareOp::Eq,
                    literal: Literal::Int(80),
                }),
            )
        );
    }

    #[test]
    fn test_nested_path() {
        let expr = parse("http.headers.host != 'example.com'").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                path: path("http.headers.host"),
                op: CompareOp::NotEq,
                literal: Literal::Str("example.com".into()),
            }
        );
    }

    #[test]
    fn test_errors_carry_position() {
        assert_eq!(
            parse("tcp.dst == == 80"),
            Err(FilterError::UnexpectedToken {
                found: "'=='".into(),
                pos: 11
            })
        );
        assert_eq!(parse("tcp.dst =="), Err(FilterError::UnexpectedEnd));
        assert_eq!(parse("(a"), Err(FilterError::UnexpectedEnd));
        assert_eq!(
            parse("a b").unwrap_err().position(),
            Some(2)
        );
        assert_eq!(parse("tcp.").unwrap_err(), FilterError::UnexpectedEnd);
        assert_eq!(parse("").unwrap_err(), FilterError::UnexpectedEnd);
        assert_eq!(parse("80 == tcp.dst").unwrap_err().position(), Some(0));
    }
}
