//! Session configuration.

use std::collections::{HashMap, HashSet};
use std::thread;

use crate::frame::Value;

/// Default bounded capacity of the dissector input queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Default per-flow reassembly buffer ceiling (16MB).
pub const DEFAULT_STREAM_BUFFER_LIMIT: usize = 16 * 1024 * 1024;

/// Default cap on layer tree depth during dispatch.
pub const DEFAULT_MAX_LAYER_DEPTH: usize = 16;

/// What `submit` does when the dissector input queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Block the producer until a worker frees a slot
    #[default]
    Block,
    /// Reject the record with [`Error::QueueFull`](crate::Error::QueueFull)
    Drop,
}

/// Engine knobs plus free-form dissector options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Dissector worker threads
    pub workers: usize,
    /// Stream analyzer worker threads
    pub stream_workers: usize,
    /// Filter worker threads
    pub filter_workers: usize,
    /// Bounded dissector queue capacity
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
    /// Maximum undelivered bytes buffered per flow. A flow over the limit
    /// is closed and its buffers released; the flow's entry itself stays
    /// until the stream pool stops, so its later frames are still ignored.
    pub stream_buffer_limit: usize,
    pub max_layer_depth: usize,
    /// Register the built-in Ethernet/IP/TCP/UDP dissectors and HTTP analyzer
    pub builtin_dissectors: bool,
    /// Dissector-specific options, e.g. `httpPorts`. Unknown keys are ignored.
    pub options: HashMap<String, Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let parallelism = default_parallelism();
        Self {
            workers: parallelism,
            stream_workers: parallelism,
            filter_workers: parallelism,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backpressure: Backpressure::default(),
            stream_buffer_limit: DEFAULT_STREAM_BUFFER_LIMIT,
            max_layer_depth: DEFAULT_MAX_LAYER_DEPTH,
            builtin_dissectors: true,
            options: HashMap::new(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_stream_workers(mut self, workers: usize) -> Self {
        self.stream_workers = workers.max(1);
        self
    }

    pub fn with_filter_workers(mut self, workers: usize) -> Self {
        self.filter_workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_stream_buffer_limit(mut self, limit: usize) -> Self {
        self.stream_buffer_limit = limit;
        self
    }

    pub fn with_max_layer_depth(mut self, depth: usize) -> Self {
        self.max_layer_depth = depth;
        self
    }

    pub fn with_builtin_dissectors(mut self, enabled: bool) -> Self {
        self.builtin_dissectors = enabled;
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Read a port-set option.
    ///
    /// Accepts a single integer or a list of integers. Values outside the
    /// `u16` range are skipped. A missing option yields an empty set, which
    /// consumers treat as "accept every port".
    pub fn port_set(&self, name: &str) -> HashSet<u16> {
        match self.option(name) {
            Some(Value::List(items)) => items.iter().filter_map(Value::as_u16).collect(),
            Some(value) => value.as_u16().into_iter().collect(),
            None => HashSet::new(),
        }
    }
}

fn default_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.workers >= 1);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.backpressure, Backpressure::Block);
        assert_eq!(config.stream_buffer_limit, 16 * 1024 * 1024);
        assert!(config.builtin_dissectors);
    }

    #[test]
    fn test_builder_clamps_counts() {
        let config = SessionConfig::new().with_workers(0).with_queue_capacity(0);
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_port_set() {
        let config = SessionConfig::new()
            .with_option("httpPorts", vec![80u16, 8080])
            .with_option("single", 443u16)
            .with_option("bad", vec![Value::UInt(70000), Value::from("x"), Value::UInt(81)]);

        assert_eq!(config.port_set("httpPorts"), HashSet::from([80, 8080]));
        assert_eq!(config.port_set("single"), HashSet::from([443]));
        assert_eq!(config.port_set("bad"), HashSet::from([81]));
        assert!(config.port_set("missing").is_empty());
    }
}
