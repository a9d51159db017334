//! Per-flow stream state.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::StreamError;
use crate::frame::{FrameId, Layer, Value};
use crate::token::TokenRegistry;

use super::flow::{endpoints, Endpoint};
use super::{Direction, FlowKey, StreamAnalyzer, StreamContext, StreamReader};

/// Lifecycle of a [`StreamWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, no frame accepted yet
    Uninitialized,
    /// Accepting frames
    Active,
    /// Analyzer failed or buffer limit hit; all further frames are ignored
    Closed,
}

/// Reassembly state of one direction of a flow.
#[derive(Debug, Default)]
struct HalfStream {
    reader: StreamReader,
    offset: usize,
    units: usize,
}

/// State of one analyzer on one flow.
///
/// Owned by exactly one stream pool thread; never shared.
#[derive(Debug)]
pub struct StreamWorker {
    flow: FlowKey,
    ports: HashSet<u16>,
    state: WorkerState,
    client: Option<Endpoint>,
    halves: [HalfStream; 2],
    limit: usize,
}

impl StreamWorker {
    /// Build the state for a new flow. Reads the analyzer's accepted-port
    /// option from `config`.
    pub fn create(flow: FlowKey, analyzer: &dyn StreamAnalyzer, config: &SessionConfig) -> Self {
        let ports = analyzer
            .ports_option()
            .map(|name| config.port_set(name))
            .unwrap_or_default();

        Self {
            flow,
            ports,
            state: WorkerState::Uninitialized,
            client: None,
            halves: Default::default(),
            limit: config.stream_buffer_limit,
        }
    }

    pub fn flow(&self) -> &FlowKey {
        &self.flow
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// True if either port is in the accepted set, or the set is empty.
    pub fn accepts(&self, src_port: u16, dst_port: u16) -> bool {
        self.ports.is_empty() || self.ports.contains(&src_port) || self.ports.contains(&dst_port)
    }

    /// Bytes buffered and not yet delivered, both directions.
    pub fn buffered(&self) -> usize {
        self.halves.iter().map(|h| h.reader.buffered()).sum()
    }

    /// Feed one frame's stream layer and collect the layers derived from
    /// every unit it completes.
    ///
    /// `parent` supplies the addresses used to tell the two directions apart.
    pub fn process(
        &mut self,
        analyzer: &dyn StreamAnalyzer,
        frame_id: FrameId,
        layer: &Layer,
        parent: Option<&Layer>,
        tokens: &TokenRegistry,
    ) -> Vec<Layer> {
        if self.state == WorkerState::Closed {
            return Vec::new();
        }

        let wk = tokens.well_known();
        let Some((src, dst)) = endpoints(layer, parent, wk) else {
            return Vec::new();
        };
        if !self.accepts(src.port, dst.port) {
            return Vec::new();
        }

        if self.state == WorkerState::Uninitialized {
            debug!(flow = %self.flow, analyzer = analyzer.name(), "stream worker active");
            self.client = Some(src.clone());
            self.state = WorkerState::Active;
        }

        let direction = if self.client.as_ref() == Some(&src) {
            Direction::ToServer
        } else {
            Direction::ToClient
        };
        let half = &mut self.halves[direction.index()];

        for payload in layer.payloads_of(wk.reassembled) {
            for slice in payload.slices() {
                half.reader.add_payload(slice.clone());
            }
        }

        let delimiter = analyzer.delimiter();
        let mut derived = Vec::new();
        loop {
            let start = half.offset;
            let Some(found) = half.reader.search(delimiter, &mut half.offset) else {
                break;
            };

            let unit = match half.reader.read(found.start - start, start) {
                Ok(unit) => unit,
                Err(e) => {
                    warn!(flow = %self.flow, analyzer = analyzer.name(), error = %e, "stream read failed");
                    half.reader.discard(half.offset);
                    continue;
                }
            };

            let ctx = StreamContext {
                frame_id,
                flow: &self.flow,
                direction,
                src_port: src.port,
                dst_port: dst.port,
                offset: start,
                units: half.units,
                tokens,
            };

            // A panic is reported like any other analyzer failure.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&unit, &ctx)))
                .unwrap_or_else(|_| {
                    Err(StreamError::Analyzer {
                        analyzer: analyzer.name(),
                        reason: "analyzer panicked".into(),
                    })
                });
            match outcome {
                Ok(Some(layer)) => derived.push(layer),
                Ok(None) => {}
                Err(e) => {
                    warn!(flow = %self.flow, analyzer = analyzer.name(), error = %e, "stream analyzer failed, closing flow");
                    derived.push(
                        Layer::new(analyzer.layer_id())
                            .with_tag(wk.error)
                            .with_property(wk.error, Value::from(e.to_string())),
                    );
                    self.close();
                    return derived;
                }
            }

            half.units += 1;
            half.reader.discard(half.offset);
        }

        let buffered = self.buffered();
        if buffered > self.limit {
            let e = StreamError::BufferLimit {
                buffered,
                limit: self.limit,
            };
            warn!(flow = %self.flow, analyzer = analyzer.name(), error = %e, "closing flow");
            self.close();
        }

        derived
    }

    /// Transition to `Closed` and release buffered data.
    pub fn close(&mut self) {
        self.state = WorkerState::Closed;
        self.halves = Default::default();
    }
}
