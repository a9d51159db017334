//! Stream reassembly and stream analysis.
//!
//! Dissectors mark layers that carry in-order stream bytes with a hint such as
//! `tcp-stream` and attach those bytes as `@reassembled` payloads. The
//! [`StreamDissectorPool`] routes such frames to one thread per analyzer and
//! flow, where a [`StreamWorker`] feeds the bytes into a [`StreamReader`],
//! cuts them at the analyzer's delimiter and hands each unit to a
//! [`StreamAnalyzer`]. Layers the analyzer derives are appended to the frame
//! that completed the unit.
//!
//! ## Components
//!
//! - [`StreamReader`] - Zero-copy byte stream with cross-slice search
//! - [`StreamWorker`] - Per-flow, per-analyzer state
//! - [`StreamDissectorPool`] - Flow-affine worker threads and the inspector channel
//! - [`StreamAnalyzer`] - Trait for unit analyzers (HTTP)
//!
//! ## Built-in Stream Analyzers
//!
//! - HTTP/1.x request, status and header lines

mod analyzer;
pub mod analyzers;
mod flow;
mod inspector;
mod pool;
mod reader;
mod worker;

pub use analyzer::{Direction, StreamAnalyzer, StreamContext};
pub use analyzers::HttpLineAnalyzer;
pub use flow::{Endpoint, FlowKey};
pub use inspector::InspectorCallback;
pub use pool::{ProgressCallback, StreamDissectorPool};
pub use reader::StreamReader;
pub use worker::{StreamWorker, WorkerState};
