//! Filter expression lexer.

use std::fmt;

use crate::error::FilterError;

use super::CompareOp;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lexeme {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Dot,
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(CompareOp),
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lexeme::Ident(name) => write!(f, "identifier {name:?}"),
            Lexeme::Int(v) => write!(f, "number {v}"),
            Lexeme::Float(v) => write!(f, "number {v}"),
            Lexeme::Str(s) => write!(f, "string {s:?}"),
            Lexeme::Bool(b) => write!(f, "{b}"),
            Lexeme::Dot => f.write_str("'.'"),
            Lexeme::LParen => f.write_str("'('"),
            Lexeme::RParen => f.write_str("')'"),
            Lexeme::And => f.write_str("'and'"),
            Lexeme::Or => f.write_str("'or'"),
            Lexeme::Not => f.write_str("'not'"),
            Lexeme::Op(op) => write!(f, "'{op}'"),
        }
    }
}

/// A lexeme and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub lexeme: Lexeme,
    pub pos: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, FilterError> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let b = bytes[i];
        let lexeme = match b {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'(' => {
                i += 1;
                Lexeme::LParen
            }
            b')' => {
                i += 1;
                Lexeme::RParen
            }
            b'.' => {
                i += 1;
                Lexeme::Dot
            }
            b'=' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                Lexeme::Op(CompareOp::Eq)
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                Lexeme::Op(CompareOp::NotEq)
            }
            b'!' => {
                i += 1;
                Lexeme::Not
            }
            b'<' | b'>' => {
                let eq = bytes.get(i + 1) == Some(&b'=');
                i += if eq { 2 } else { 1 };
                Lexeme::Op(match (b, eq) {
                    (b'<', false) => CompareOp::Lt,
                    (b'<', true) => CompareOp::LtEq,
                    (_, false) => CompareOp::Gt,
                    (_, true) => CompareOp::GtEq,
                })
            }
            b'&' if bytes.get(i + 1) == Some(&b'&') => {
                i += 2;
                Lexeme::And
            }
            b'|' if bytes.get(i + 1) == Some(&b'|') => {
                i += 2;
                Lexeme::Or
            }
            b'"' | b'\'' => {
                let (s, end) = string(input, i)?;
                i = end;
                Lexeme::Str(s)
            }
            b'0'..=b'9' => {
                let (n, end) = number(input, i)?;
                i = end;
                n
            }
            b'-' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                let (n, end) = number(input, i)?;
                i = end;
                n
            }
            b if is_ident_start(b) => {
                i += 1;
                while i < bytes.len() && is_ident_continue(bytes[i]) {
                    i += 1;
                }
                match &input[start..i] {
                    "and" => Lexeme::And,
                    "or" => Lexeme::Or,
                    "not" => Lexeme::Not,
                    "true" => Lexeme::Bool(true),
                    "false" => Lexeme::Bool(false),
                    word => Lexeme::Ident(word.to_string()),
                }
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or('\u{fffd}');
                return Err(FilterError::UnexpectedChar { ch, pos: i });
            }
        };
        out.push(Spanned { lexeme, pos: start });
    }
    Ok(out)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'@'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Quoted string starting at `start`. Backslash escapes the next character.
fn string(input: &str, start: usize) -> Result<(String, usize), FilterError> {
    let quote = input.as_bytes()[start] as char;
    let mut out = String::new();
    let mut chars = input[start + 1..].char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => return Err(FilterError::UnexpectedEnd),
            },
            c if c == quote => return Ok((out, start + 1 + offset + 1)),
            c => out.push(c),
        }
    }
    Err(FilterError::UnexpectedEnd)
}

fn number(input: &str, start: usize) -> Result<(Lexeme, usize), FilterError> {
    let bytes = input.as_bytes();
    let mut end = start + 1;
    let mut float = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' | b'x' | b'X' | b'a'..=b'f' | b'A'..=b'F' | b'_' => end += 1,
            b'.' if !float && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) => {
                float = true;
                end += 1;
            }
            _ => break,
        }
    }

    let literal = &input[start..end];
    let invalid = || FilterError::InvalidLiteral {
        literal: literal.to_string(),
        pos: start,
    };
    let digits = literal.replace('_', "");
    let lexeme = if float {
        Lexeme::Float(digits.parse().map_err(|_| invalid())?)
    } else if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Lexeme::Int(i64::from_str_radix(hex, 16).map_err(|_| invalid())?)
    } else {
        Lexeme::Int(digits.parse().map_err(|_| invalid())?)
    };
    Ok((lexeme, end))
}
