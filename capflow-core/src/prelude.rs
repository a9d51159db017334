//! Convenient re-exports for common usage.
//!
//! ```rust,no_run
//! use capflow_core::prelude::*;
//!
//! let session = Session::new(SessionConfig::default());
//! ```

// Session and configuration
pub use crate::config::{Backpressure, SessionConfig};
pub use crate::session::{Session, SessionStatus};

// Data model
pub use crate::frame::{CaptureRecord, Frame, FrameId, Layer, Payload, Value};
pub use crate::token::{Token, TokenRegistry};

// Extension points
pub use crate::dissector::{DissectContext, Dissector, LINK_ETHERNET};
pub use crate::stream::{StreamAnalyzer, StreamContext};

// Error types
pub use crate::error::{Error, Result};
