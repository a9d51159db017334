//! # capflow-core
//!
//! Multi-threaded packet analysis engine.
//!
//! Capture records are decoded into trees of [`Layer`]s by hint-dispatched
//! [`Dissector`]s on a worker pool, committed to an append-only
//! [`FrameStore`] in submission order, followed per flow by
//! [`StreamAnalyzer`]s that derive new layers from the reassembled byte
//! stream, and queried with compiled [`Filter`] expressions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use capflow_core::prelude::*;
//!
//! let session = Session::new(SessionConfig::new().with_option("httpPorts", vec![80u16]));
//! session.start()?;
//!
//! let link = session.tokens().get(LINK_ETHERNET);
//! # let packets: Vec<Vec<u8>> = Vec::new();
//! for (i, packet) in packets.into_iter().enumerate() {
//!     session.submit(CaptureRecord::new(link, packet, i as i64))?;
//! }
//! session.stop();
//!
//! let end = session.store().len() as u64 + 1;
//! for id in session.filter("http.method == 'GET'", 1..end)? {
//!     println!("frame {id}");
//! }
//! # Ok::<(), capflow_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        capflow-core                                 |
//! +---------------------------------------------------------------------+
//! |  token/      - String interning, well-known tokens                  |
//! |  frame/      - Frame, Layer, Payload, Value                         |
//! |  dissector/  - Dissector trait, registry, pool, built-in protocols  |
//! |  store/      - Versioned append-only frame store                    |
//! |  stream/     - Flow-affine stream pool, reader, HTTP analyzer       |
//! |  filter/     - Filter language and filter pool                      |
//! |  session/    - Wires the pools together                             |
//! |  config/     - SessionConfig                                        |
//! |  error/      - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```

pub mod config;
pub mod dissector;
pub mod error;
pub mod filter;
pub mod frame;
pub mod prelude;
pub mod session;
pub mod store;
pub mod stream;
pub mod token;

// Re-export commonly used types at crate root for convenience
pub use config::{Backpressure, SessionConfig};
pub use dissector::{
    default_dissectors, default_registry, DissectContext, Dissector, DissectorPool,
    DissectorRegistry, LINK_ETHERNET, TCP_STREAM,
};
pub use error::{DissectError, Error, FilterError, Result, StoreError, StreamError};
pub use filter::{compile, CompareOp, Filter, FilterPool};
pub use frame::{CaptureRecord, Frame, FrameId, Layer, Payload, Property, Value};
pub use session::{Session, SessionState, SessionStatus};
pub use store::{FrameStore, Snapshot, Version};
pub use stream::{
    Direction, Endpoint, FlowKey, HttpLineAnalyzer, StreamAnalyzer, StreamContext,
    StreamDissectorPool, StreamReader,
};
pub use token::{Token, TokenRegistry, WellKnown};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
