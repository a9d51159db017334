//! Compiled filter predicates.
//!
//! Paths are resolved to tokens once at compile time; matching a frame only
//! compares tokens and values.

use std::cmp::Ordering;

use compact_str::{CompactString, ToCompactString};

use crate::frame::{Frame, Layer, Value};
use crate::token::{Token, TokenRegistry};

use super::parser::{Expr, Literal};
use super::CompareOp;

/// Resolved path: layer, optional property, then nested map keys.
#[derive(Debug, Clone)]
pub(crate) struct Selector {
    layer: Token,
    property: Option<Token>,
    keys: Vec<CompactString>,
}

impl Selector {
    fn resolve(path: &[String], tokens: &TokenRegistry) -> Self {
        Self {
            layer: tokens.get(&path[0]),
            property: path.get(1).map(|name| tokens.get(&format!(".{name}"))),
            keys: path.iter().skip(2).map(|k| k.to_compact_string()).collect(),
        }
    }

    /// Layers selected by the first path segment, matched by id or tag.
    fn layers<'a>(&'a self, frame: &'a Frame) -> impl Iterator<Item = &'a Layer> + 'a {
        frame
            .layers()
            .map(|(layer, _)| layer)
            .filter(move |layer| layer.id == self.layer || layer.has_tag(self.layer))
    }

    /// Values the path resolves to on `frame`, one per matching layer.
    fn values<'a>(&'a self, frame: &'a Frame) -> impl Iterator<Item = &'a Value> + 'a {
        self.layers(frame).filter_map(move |layer| {
            let mut value = layer.property(self.property?)?;
            for key in &self.keys {
                value = value.get(key)?;
            }
            Some(value)
        })
    }

    fn test(&self, frame: &Frame) -> bool {
        if self.property.is_none() {
            return self.layers(frame).next().is_some();
        }
        self.values(frame).any(Value::is_truthy)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Operand {
    literal: Literal,
    text: CompactString,
}

impl Operand {
    fn new(literal: Literal) -> Self {
        let text = match &literal {
            Literal::Int(v) => v.to_compact_string(),
            Literal::Float(v) => v.to_compact_string(),
            Literal::Str(s) => s.to_compact_string(),
            Literal::Bool(b) => b.to_compact_string(),
        };
        Self { literal, text }
    }

    /// Numeric when both sides are numeric, by display string otherwise.
    fn compare(&self, value: &Value) -> Option<Ordering> {
        let int = match self.literal {
            Literal::Int(v) => Some(v),
            Literal::Bool(b) => Some(i64::from(b)),
            _ => None,
        };
        match (value, int, &self.literal) {
            (Value::UInt(v), Some(n), _) => Some(i128::from(*v).cmp(&i128::from(n))),
            (Value::Int(v), Some(n), _) => Some(v.cmp(&n)),
            (Value::Float(v), Some(n), _) => v.partial_cmp(&(n as f64)),
            (v, None, Literal::Float(x)) if v.is_numeric() => v.as_f64()?.partial_cmp(x),
            (v, _, _) => Some(v.to_compact_string().as_str().cmp(self.text.as_str())),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    Or(Box<Predicate>, Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Test(Selector),
    Compare {
        selector: Selector,
        op: CompareOp,
        operand: Operand,
    },
}

impl Predicate {
    pub(crate) fn compile(expr: Expr, tokens: &TokenRegistry) -> Self {
        match expr {
            Expr::Or(l, r) => Predicate::Or(
                Box::new(Self::compile(*l, tokens)),
                Box::new(Self::compile(*r, tokens)),
            ),
            Expr::And(l, r) => Predicate::And(
                Box::new(Self::compile(*l, tokens)),
                Box::new(Self::compile(*r, tokens)),
            ),
            Expr::Not(inner) => Predicate::Not(Box::new(Self::compile(*inner, tokens))),
            Expr::Test(path) => Predicate::Test(Selector::resolve(&path, tokens)),
            Expr::Compare { path, op, literal } => Predicate::Compare {
                selector: Selector::resolve(&path, tokens),
                op,
                operand: Operand::new(literal),
            },
        }
    }

    pub(crate) fn matches(&self, frame: &Frame) -> bool {
        match self {
            Predicate::Or(l, r) => l.matches(frame) || r.matches(frame),
            Predicate::And(l, r) => l.matches(frame) && r.matches(frame),
            Predicate::Not(inner) => !inner.matches(frame),
            Predicate::Test(selector) => selector.test(frame),
            Predicate::Compare {
                selector,
                op,
                operand,
            } => {
                let mut values = selector.values(frame).peekable();
                if values.peek().is_none() {
                    // Missing property: matches nothing except !=
                    return *op == CompareOp::NotEq;
                }
                values.any(|v| op.holds(operand.compare(v)))
            }
        }
    }
}
