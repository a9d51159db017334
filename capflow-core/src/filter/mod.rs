//! Frame filter expressions and the filter thread pool.
//!
//! A filter is compiled once against the session's [`TokenRegistry`] and can
//! then be matched against any number of frames from any thread:
//!
//! ```text
//! tcp.dst == 80 and http.method == "GET"
//! not (ipv4.src == '10.0.0.1' || udp)
//! ```
//!
//! The first path segment names a layer (by id or tag), the second one of its
//! properties, and any further segments index into map values. A bare path
//! tests layer presence or property truthiness.

mod compiled;
mod lexer;
mod parser;
mod pool;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub use pool::FilterPool;

use crate::error::FilterError;
use crate::frame::Frame;
use crate::token::TokenRegistry;

use compiled::Predicate;

/// Comparison operators for predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Whether an ordering satisfies the operator. Unordered values are only
    /// ever not-equal.
    fn holds(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return self == CompareOp::NotEq;
        };
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        })
    }
}

/// A compiled filter. Cheap to clone and share across threads.
#[derive(Clone)]
pub struct Filter {
    source: Arc<str>,
    predicate: Arc<Predicate>,
}

impl Filter {
    pub fn matches(&self, frame: &Frame) -> bool {
        self.predicate.matches(frame)
    }

    /// The expression this filter was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.source).finish()
    }
}

/// Compile a filter expression, interning every path it names.
pub fn compile(expr: &str, tokens: &TokenRegistry) -> Result<Filter, FilterError> {
    let ast = parser::parse(expr)?;
    Ok(Filter {
        source: expr.into(),
        predicate: Arc::new(Predicate::compile(ast, tokens)),
    })
}
