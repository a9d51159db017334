//! Dissector framework.
//!
//! This module provides:
//! - [`Dissector`] trait for implementing layer decoders
//! - [`DissectorRegistry`] for hint-based dispatch and layer tree building
//! - [`DissectorPool`] for running dissection on worker threads
//! - Built-in dissectors for common protocols
//!
//! ## Dispatch
//!
//! Every captured record becomes a root layer whose id and tag are the
//! record's link hint (e.g. `[eth]`) and whose `@data` payload is the raw
//! buffer. A dissector runs on every layer carrying one of its hints. The
//! layers it returns become children of that layer and are dispatched in
//! turn. Built-in dissectors tag their layers with the hint of the next
//! protocol (`[ipv4]`, `[tcp]`, ...) so the chain continues.
//!
//! ## Supported Protocols
//!
//! | Layer | Protocols |
//! |-------|-----------|
//! | Link | Ethernet II |
//! | Network | IPv4, IPv6 |
//! | Transport | TCP, UDP |
//!
//! Note: HTTP is analyzed from the TCP byte stream (see `stream::analyzers`).

mod ethernet;
mod ipv4;
mod ipv6;
mod pool;
mod registry;
mod tcp;
mod udp;

// Test utilities (only compiled for tests)
#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use bytes::Bytes;

pub use ethernet::{ethertype, EthernetDissector, LINK_ETHERNET};
pub use ipv4::Ipv4Dissector;
pub use ipv6::Ipv6Dissector;
pub use pool::DissectorPool;
pub use registry::DissectorRegistry;
pub use tcp::{TcpDissector, TCP_STREAM};
pub use udp::UdpDissector;

use crate::config::SessionConfig;
use crate::error::DissectError;
use crate::frame::{FrameId, Layer, Value};
use crate::token::{Token, TokenRegistry, WellKnown};

/// Read-only context for one dissector invocation.
#[derive(Debug, Clone, Copy)]
pub struct DissectContext<'a> {
    pub frame_id: FrameId,
    pub timestamp_us: i64,
    /// Depth of the layer being analyzed; the root layer is depth 0
    pub depth: usize,
    pub tokens: &'a TokenRegistry,
    pub config: &'a SessionConfig,
}

impl DissectContext<'_> {
    /// Session option by name.
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.config.option(name)
    }

    pub fn well_known(&self) -> &WellKnown {
        self.tokens.well_known()
    }
}

/// Core trait all dissectors must implement.
pub trait Dissector: Send + Sync {
    /// Unique identifier for this dissector (e.g., "tcp").
    fn name(&self) -> &'static str;

    /// Layer tags this dissector runs on.
    fn hints(&self) -> &[Token];

    /// Decode `layer` into zero or more child layers.
    ///
    /// Must not assume anything about other dissectors that may run on the
    /// same layer.
    fn analyze(&self, ctx: &DissectContext<'_>, layer: &Layer) -> Result<Vec<Layer>, DissectError>;
}

/// Bytes of the first `@data` payload of `layer`.
pub fn layer_data(layer: &Layer, wk: &WellKnown) -> Option<Bytes> {
    layer.payloads_of(wk.data).next().map(|p| p.contiguous())
}

/// Built-in dissectors in dispatch order.
pub fn default_dissectors(tokens: &TokenRegistry) -> Vec<Arc<dyn Dissector>> {
    vec![
        Arc::new(EthernetDissector::new(tokens)),
        Arc::new(Ipv4Dissector::new(tokens)),
        Arc::new(Ipv6Dissector::new(tokens)),
        Arc::new(TcpDissector::new(tokens)),
        Arc::new(UdpDissector::new(tokens)),
    ]
}

/// Registry with all built-in dissectors.
pub fn default_registry(tokens: &TokenRegistry) -> DissectorRegistry {
    let mut registry = DissectorRegistry::new();
    for dissector in default_dissectors(tokens) {
        registry.register_arc(dissector);
    }
    registry
}
