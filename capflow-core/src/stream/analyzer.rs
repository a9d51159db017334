use crate::error::StreamError;
use crate::frame::{FrameId, Layer};
use crate::token::{Token, TokenRegistry};

use super::FlowKey;

/// Direction of data flow relative to the endpoint that sent the first
/// segment seen on the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ToServer,
    ToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToServer => "to_server",
            Direction::ToClient => "to_client",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::ToServer => 0,
            Direction::ToClient => 1,
        }
    }
}

/// Context handed to a stream analyzer with every delimited unit.
#[derive(Debug, Clone, Copy)]
pub struct StreamContext<'a> {
    /// Frame whose payload completed this unit
    pub frame_id: FrameId,
    pub flow: &'a FlowKey,
    pub direction: Direction,
    pub src_port: u16,
    pub dst_port: u16,
    /// Absolute stream offset of the unit's first byte
    pub offset: usize,
    /// Units already delivered on this direction of the flow
    pub units: usize,
    pub tokens: &'a TokenRegistry,
}

/// Analyzer for delimited units of a reassembled byte stream.
///
/// The pool owns all per-flow state; implementations see one complete unit
/// (the bytes between the previous delimiter and the next one) per call.
pub trait StreamAnalyzer: Send + Sync {
    /// Analyzer identifier (e.g., "http").
    fn name(&self) -> &'static str;

    /// Layer tags this analyzer subscribes to, e.g. `tcp-stream`.
    fn hints(&self) -> &[Token];

    /// Id of the layers this analyzer derives.
    fn layer_id(&self) -> Token;

    /// Unit delimiter, e.g. `\r\n`.
    fn delimiter(&self) -> &[u8];

    /// Session option holding the accepted port set. `None` accepts all ports.
    fn ports_option(&self) -> Option<&str> {
        None
    }

    /// Analyze one unit. `Ok(None)` derives nothing; `Err` closes the flow.
    fn analyze(&self, unit: &[u8], ctx: &StreamContext<'_>) -> Result<Option<Layer>, StreamError>;
}
