//! Frames and their layer trees.
//!
//! A [`Frame`] is one captured record plus the tree of [`Layer`]s the
//! dissectors decoded from it. Frames are immutable once stored, except for
//! layers appended by stream analyzers, which go through the
//! [`FrameStore`](crate::store::FrameStore) write path.

mod layer;
mod value;

use bytes::Bytes;
use compact_str::CompactString;

pub use layer::{Layer, Payload, Property, Walk};
pub use value::Value;

use crate::token::Token;

/// Frame sequence number. The first frame of a session is 1.
pub type FrameId = u64;

/// One record handed to the engine by a capture source.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    /// Link-layer hint token, e.g. `[eth]`
    pub link: Token,
    /// Raw captured bytes
    pub data: Bytes,
    /// Capture timestamp in microseconds since the Unix epoch
    pub timestamp_us: i64,
}

impl CaptureRecord {
    pub fn new(link: Token, data: impl Into<Bytes>, timestamp_us: i64) -> Self {
        Self {
            link,
            data: data.into(),
            timestamp_us,
        }
    }
}

/// A captured record and its decoded layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    id: FrameId,
    timestamp_us: i64,
    link: Token,
    data: Bytes,
    roots: Vec<Layer>,
    error: Option<CompactString>,
}

impl Frame {
    pub fn new(id: FrameId, record: CaptureRecord) -> Self {
        Self {
            id,
            timestamp_us: record.timestamp_us,
            link: record.link,
            data: record.data,
            roots: Vec::new(),
            error: None,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn link(&self) -> Token {
        self.link
    }

    /// Raw captured bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn roots(&self) -> &[Layer] {
        &self.roots
    }

    pub fn push_root(&mut self, layer: Layer) {
        self.roots.push(layer);
    }

    /// First error reported while dissecting this frame.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Record an error. The first error wins.
    pub fn set_error(&mut self, message: impl Into<CompactString>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    /// All layers in pre-order with their parents.
    pub fn layers(&self) -> Walk<'_> {
        Walk::over(&self.roots)
    }

    /// First layer with the given id.
    pub fn find(&self, id: Token) -> Option<&Layer> {
        self.layers().map(|(layer, _)| layer).find(|l| l.id == id)
    }

    /// First layer tagged with any of `hints`, along with its parent.
    pub fn find_tagged(&self, hints: &[Token]) -> Option<(&Layer, Option<&Layer>)> {
        self.layers().find(|(layer, _)| layer.has_any_tag(hints))
    }

    /// Attach a layer on top of the layer stack: under the deepest layer of
    /// the last-child chain of the last root. Becomes a root if the frame has
    /// no layers yet.
    pub fn attach_top(&mut self, layer: Layer) {
        match self.roots.last_mut() {
            Some(root) => {
                root.top_mut().add_child(layer);
            }
            None => self.roots.push(layer),
        }
    }
}
