//! Session: one token registry, one frame store and the three pools.
//!
//! ```text
//! submit ─▶ DissectorPool ─▶ sequencer ─▶ FrameStore ◀─ FilterPool
//!                                 │            ▲
//!                                 ▼            │ derived layers
//!                         StreamDissectorPool ─┘
//! ```

use std::ops::Range;
use std::sync::Arc;

use compact_str::CompactString;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::dissector::{default_registry, Dissector, DissectorPool, DissectorRegistry};
use crate::error::{Error, Result};
use crate::filter::{compile, Filter, FilterPool};
use crate::frame::{CaptureRecord, FrameId};
use crate::store::{FrameStore, Version};
use crate::stream::{HttpLineAnalyzer, StreamAnalyzer, StreamDissectorPool};
use crate::token::TokenRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    /// Frames committed to the store
    pub frames: usize,
    pub version: Version,
    /// Records rejected by a full input queue
    pub dropped: u64,
    pub state: SessionState,
}

pub struct Session {
    tokens: Arc<TokenRegistry>,
    config: Arc<SessionConfig>,
    store: Arc<FrameStore>,
    dissectors: DissectorPool,
    streams: Arc<StreamDissectorPool>,
    filters: FilterPool,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let tokens = Arc::new(TokenRegistry::new());
        let config = Arc::new(config);
        let store = Arc::new(FrameStore::new());

        let (registry, analyzers) = if config.builtin_dissectors {
            let http: Arc<dyn StreamAnalyzer> = Arc::new(HttpLineAnalyzer::new(&tokens));
            (default_registry(&tokens), vec![http])
        } else {
            (DissectorRegistry::new(), Vec::new())
        };

        let streams = Arc::new(StreamDissectorPool::with_analyzers(
            Arc::clone(&tokens),
            Arc::clone(&config),
            analyzers,
        ));
        streams.set_frame_store(Arc::clone(&store));
        let dissectors = DissectorPool::new(
            registry,
            Arc::clone(&tokens),
            Arc::clone(&config),
            Arc::clone(&store),
            Some(Arc::clone(&streams)),
        );
        let filters = FilterPool::new(Arc::clone(&store), config.filter_workers);

        Self {
            tokens,
            config,
            store,
            dissectors,
            streams,
            filters,
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub fn register_dissector<D: Dissector + 'static>(&mut self, dissector: D) -> Result<()> {
        self.dissectors.register(dissector)
    }

    pub fn register_stream_analyzer<A: StreamAnalyzer + 'static>(&self, analyzer: A) -> Result<()> {
        self.streams.register_analyzer(analyzer)
    }

    /// Start the filter, stream and dissector pools.
    ///
    /// If any pool fails to start, the ones already running are stopped and
    /// the session ends up `Stopped`.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Idle => {}
            SessionState::Running => return Err(Error::AlreadyStarted),
            SessionState::Stopped => return Err(Error::Stopped),
        }
        let started = self
            .filters
            .start()
            .and_then(|()| self.streams.start())
            .and_then(|()| self.dissectors.start());
        if let Err(e) = started {
            warn!(error = %e, "session failed to start");
            self.dissectors.stop();
            self.streams.stop();
            self.filters.stop();
            *state = SessionState::Stopped;
            return Err(e);
        }
        *state = SessionState::Running;
        info!(
            workers = self.config.workers,
            stream_workers = self.config.stream_workers,
            filter_workers = self.config.filter_workers,
            dissectors = ?self.dissectors.registry().names(),
            analyzers = ?self.streams.analyzer_names(),
            "session started"
        );
        Ok(())
    }

    /// Queue a capture record; returns the id its frame will have.
    pub fn submit(&self, record: CaptureRecord) -> Result<FrameId> {
        self.dissectors.submit(record)
    }

    /// Drain the dissector pool, then the stream pool. Filtering keeps working
    /// on the final store contents until the session is dropped.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Stopped {
            return;
        }
        self.dissectors.stop();
        self.streams.stop();
        *state = SessionState::Stopped;
        info!(
            frames = self.store.len(),
            version = self.store.version(),
            dropped = self.dissectors.dropped(),
            "session stopped"
        );
    }

    pub fn store(&self) -> &Arc<FrameStore> {
        &self.store
    }

    pub fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Compile `expr` against this session's tokens.
    pub fn compile(&self, expr: &str) -> Result<Filter> {
        Ok(compile(expr, &self.tokens)?)
    }

    /// Ids of frames in `ids` matching `expr`, ascending.
    pub fn filter(&self, expr: &str, ids: Range<FrameId>) -> Result<Vec<FrameId>> {
        let filter = self.compile(expr)?;
        self.evaluate(&filter, ids)
    }

    pub fn evaluate(&self, filter: &Filter, ids: Range<FrameId>) -> Result<Vec<FrameId>> {
        self.filters.evaluate(filter, ids)
    }

    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.streams.set_callback(callback);
    }

    pub fn set_inspector_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.streams.set_inspector_callback(callback);
    }

    pub fn send_inspector_message(&self, id: &str, message: impl Into<String>) -> Result<()> {
        self.streams.send_inspector_message(id, message)
    }

    pub fn inspectors(&self) -> Vec<CompactString> {
        self.streams.inspectors()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            frames: self.store.len(),
            version: self.store.version(),
            dropped: self.dissectors.dropped(),
            state: *self.state.lock(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
        self.filters.stop();
        debug!("session dropped");
    }
}
