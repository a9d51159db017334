//! capflow - replay packet captures through the capflow engine.
//!
//! This library backs the `capflow` binary: argument parsing, capture file
//! replay and frame output. The engine itself lives in `capflow-core`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use capflow::replay::{replay, CaptureReader};
//! use capflow_core::{Session, SessionConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let session = Session::new(SessionConfig::default());
//!     session.start()?;
//!     let mut reader = CaptureReader::open(Path::new("capture.pcap"))?;
//!     replay(&session, &mut reader)?;
//!     session.stop();
//!     println!("{} frames", session.store().len());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod replay;
