//! Error types for capflow-core.
//!
//! This module provides structured error types for all engine operations:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`DissectError`] - A dissector could not decode its layer
//! - [`StreamError`] - Stream reassembly or stream analyzer failures
//! - [`FilterError`] - Filter expression compile errors
//! - [`StoreError`] - Frame store write violations
//!
//! All errors implement `std::error::Error` and can be converted to `anyhow::Error`.

use thiserror::Error;

use crate::frame::FrameId;

/// Main error type for capflow-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A dissector failed on a layer
    #[error("Dissect error: {0}")]
    Dissect(#[from] DissectError),

    /// Stream reassembly or analysis failed
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Filter expression did not compile
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Frame store rejected a write
    #[error("Frame store error: {0}")]
    Store(#[from] StoreError),

    /// The dissector input queue is full and the pool drops on overflow
    #[error("Input queue full, capture record dropped")]
    QueueFull,

    /// The pool no longer accepts work
    #[error("Pool has been stopped")]
    Stopped,

    /// Registration attempted after the pools were started
    #[error("Session already started")]
    AlreadyStarted,

    /// Work submitted before the pools were started
    #[error("Session not started")]
    NotStarted,

    /// A worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors raised by dissectors while decoding a layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DissectError {
    /// Packet too short for protocol header
    #[error("{protocol}: packet too short (need {needed} bytes, have {have})")]
    Truncated {
        protocol: &'static str,
        needed: usize,
        have: usize,
    },

    /// Header could not be decoded
    #[error("{protocol}: malformed header: {reason}")]
    Malformed {
        protocol: &'static str,
        reason: String,
    },

    /// Layer carries no payload of the expected type
    #[error("{protocol}: layer has no payload to decode")]
    MissingPayload { protocol: &'static str },

    /// Free-form failure reported by a user dissector
    #[error("{0}")]
    Other(String),
}

/// Errors related to stream reassembly and stream analyzers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A stream analyzer rejected a unit
    #[error("{analyzer}: {reason}")]
    Analyzer {
        analyzer: &'static str,
        reason: String,
    },

    /// Requested range is not (or no longer) buffered
    #[error("read of {length} bytes at offset {offset} is outside buffered range {base}..{end}")]
    OutOfRange {
        offset: usize,
        length: usize,
        base: usize,
        end: usize,
    },

    /// A flow buffered more bytes than allowed without yielding a unit
    #[error("flow buffered {buffered} bytes, limit is {limit}")]
    BufferLimit { buffered: usize, limit: usize },
}

/// Errors from compiling filter expressions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Character that starts no valid lexeme
    #[error("unexpected character {ch:?} at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    /// Valid lexeme in the wrong place
    #[error("unexpected {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    /// Expression ended early
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// Literal that could not be parsed
    #[error("invalid literal {literal:?} at position {pos}")]
    InvalidLiteral { literal: String, pos: usize },
}

impl FilterError {
    /// Byte offset into the expression, when known.
    pub fn position(&self) -> Option<usize> {
        match self {
            FilterError::UnexpectedChar { pos, .. }
            | FilterError::UnexpectedToken { pos, .. }
            | FilterError::InvalidLiteral { pos, .. } => Some(*pos),
            FilterError::UnexpectedEnd => None,
        }
    }
}

/// Errors from writing to the frame store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Frames must be appended with consecutive ids
    #[error("frame {got} appended out of order, expected {expected}")]
    OutOfOrder { expected: FrameId, got: FrameId },

    /// Layer appended to a frame that was never stored
    #[error("unknown frame {id}")]
    UnknownFrame { id: FrameId },
}

/// Result type alias for capflow-core operations.
pub type Result<T> = std::result::Result<T, Error>;
