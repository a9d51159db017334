//! Stream dissector thread pool.
//!
//! Each analyzer finds its own stream layer in a frame. The pair of analyzer
//! and flow key is pinned to a fixed worker thread, so all frames of one flow
//! are seen by one thread per analyzer, in the order they were submitted. A
//! frame whose analyzers map to different threads is sent to each of them.
//! Each thread owns the [`StreamWorker`] state of its flows; nothing per-flow
//! is shared between threads.
//!
//! Flow entries live as long as the pool. A closed flow keeps its entry so
//! later frames of it are still ignored; its buffered bytes are released when
//! it closes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use compact_str::CompactString;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::frame::{Frame, Layer, Value};
use crate::store::FrameStore;
use crate::token::{Token, TokenRegistry, WellKnown};

use super::inspector::{Inspector, InspectorCallback};
use super::{FlowKey, StreamAnalyzer, StreamWorker};

/// Progress callback receiving the number of frames processed so far.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Idle,
    Running,
    Stopped,
}

struct Router {
    state: PoolState,
    analyzers: Vec<Arc<dyn StreamAnalyzer>>,
    /// Union of all analyzer hints
    hints: Vec<Token>,
    senders: Vec<Sender<Job>>,
    /// Worker owning each (analyzer index, flow) pair
    flows: HashMap<(usize, FlowKey), usize>,
    next_worker: usize,
}

/// The analyzers one worker thread runs on one frame.
struct Job {
    frame: Arc<Frame>,
    analyzers: SmallVec<[usize; 4]>,
    /// Jobs of this frame not yet finished
    pending: Arc<AtomicUsize>,
}

struct Progress {
    processed: AtomicU64,
    callback: RwLock<Option<ProgressCallback>>,
}

impl Progress {
    fn frame_done(&self) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(callback) = self.callback.read().as_ref() {
            callback(processed);
        }
    }
}

pub struct StreamDissectorPool {
    tokens: Arc<TokenRegistry>,
    config: Arc<SessionConfig>,
    store: RwLock<Option<Arc<FrameStore>>>,
    router: Mutex<Router>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    progress: Arc<Progress>,
    inspector: Inspector,
}

impl StreamDissectorPool {
    pub fn new(tokens: Arc<TokenRegistry>, config: Arc<SessionConfig>) -> Self {
        Self::with_analyzers(tokens, config, Vec::new())
    }

    /// Pool with `analyzers` already registered.
    pub fn with_analyzers(
        tokens: Arc<TokenRegistry>,
        config: Arc<SessionConfig>,
        analyzers: Vec<Arc<dyn StreamAnalyzer>>,
    ) -> Self {
        let mut hints: Vec<Token> = Vec::new();
        for hint in analyzers.iter().flat_map(|a| a.hints()) {
            if !hints.contains(hint) {
                hints.push(*hint);
            }
        }
        Self {
            tokens,
            config,
            store: RwLock::new(None),
            router: Mutex::new(Router {
                state: PoolState::Idle,
                analyzers,
                hints,
                senders: Vec::new(),
                flows: HashMap::new(),
                next_worker: 0,
            }),
            handles: Mutex::new(Vec::new()),
            progress: Arc::new(Progress {
                processed: AtomicU64::new(0),
                callback: RwLock::new(None),
            }),
            inspector: Inspector::new(),
        }
    }

    /// Register an analyzer. Only allowed before [`start`](Self::start).
    pub fn register_analyzer<A: StreamAnalyzer + 'static>(&self, analyzer: A) -> Result<()> {
        self.register_arc(Arc::new(analyzer))
    }

    pub fn register_arc(&self, analyzer: Arc<dyn StreamAnalyzer>) -> Result<()> {
        let mut router = self.router.lock();
        if router.state != PoolState::Idle {
            return Err(Error::AlreadyStarted);
        }
        for hint in analyzer.hints() {
            if !router.hints.contains(hint) {
                router.hints.push(*hint);
            }
        }
        router.analyzers.push(analyzer);
        Ok(())
    }

    /// Names of registered analyzers, in registration order.
    pub fn analyzer_names(&self) -> Vec<&'static str> {
        self.router.lock().analyzers.iter().map(|a| a.name()).collect()
    }

    /// Store that derived layers are appended to. Must be set before start.
    pub fn set_frame_store(&self, store: Arc<FrameStore>) {
        *self.store.write() = Some(store);
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        *self.progress.callback.write() = Some(Arc::new(callback));
    }

    /// Frames that went through a stream worker thread.
    pub fn processed(&self) -> u64 {
        self.progress.processed.load(Ordering::Relaxed)
    }

    pub fn set_inspector_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let callback: InspectorCallback = Arc::new(callback);
        self.inspector.set_callback(callback);
    }

    pub fn send_inspector_message(&self, id: &str, message: impl Into<String>) -> Result<()> {
        self.inspector.send(id, message)
    }

    /// Inspector ids that have posted at least one message.
    pub fn inspectors(&self) -> Vec<CompactString> {
        self.inspector.ids()
    }

    /// True if any layer of `frame` carries a hint some analyzer subscribes to.
    pub fn is_stream_capable(&self, frame: &Frame) -> bool {
        let router = self.router.lock();
        !router.hints.is_empty() && frame.find_tagged(&router.hints).is_some()
    }

    /// Spawn `stream_workers` threads.
    pub fn start(&self) -> Result<()> {
        let mut router = self.router.lock();
        match router.state {
            PoolState::Idle => {}
            PoolState::Running => return Err(Error::AlreadyStarted),
            PoolState::Stopped => return Err(Error::Stopped),
        }
        let store = self.store.read().clone().ok_or(Error::NotStarted)?;

        let analyzers: Arc<[Arc<dyn StreamAnalyzer>]> = router.analyzers.clone().into();
        let mut handles = self.handles.lock();
        for index in 0..self.config.stream_workers.max(1) {
            let (tx, rx) = unbounded();
            let worker = WorkerThread {
                index,
                rx,
                analyzers: Arc::clone(&analyzers),
                store: Arc::clone(&store),
                tokens: Arc::clone(&self.tokens),
                config: Arc::clone(&self.config),
                progress: Arc::clone(&self.progress),
            };
            let handle = thread::Builder::new()
                .name(format!("capflow-stream-{index}"))
                .spawn(move || worker.run())?;
            router.senders.push(tx);
            handles.push(handle);
        }
        self.inspector.start()?;

        router.state = PoolState::Running;
        debug!(
            workers = handles.len(),
            analyzers = analyzers.len(),
            "stream pool started"
        );
        Ok(())
    }

    /// Route a committed frame to the workers owning its flows.
    ///
    /// Every analyzer is routed by the flow of its own stream layer. Frames
    /// with no subscribed stream layer, or whose stream layers have no ports,
    /// are ignored.
    pub fn submit(&self, frame: Arc<Frame>) -> Result<()> {
        let mut router = self.router.lock();
        match router.state {
            PoolState::Running => {}
            PoolState::Idle => return Err(Error::NotStarted),
            PoolState::Stopped => return Err(Error::Stopped),
        }

        let wk = self.tokens.well_known();
        let Router {
            analyzers,
            senders,
            flows,
            next_worker,
            ..
        } = &mut *router;

        // (worker, analyzer indices) in first-routed order
        let mut routes: SmallVec<[(usize, SmallVec<[usize; 4]>); 4]> = SmallVec::new();
        for (index, analyzer) in analyzers.iter().enumerate() {
            let Some(flow) = frame
                .find_tagged(analyzer.hints())
                .and_then(|(layer, parent)| FlowKey::from_layer(layer, parent, wk))
            else {
                continue;
            };
            let worker = *flows.entry((index, flow)).or_insert_with(|| {
                let worker = *next_worker % senders.len();
                *next_worker += 1;
                worker
            });
            match routes.iter_mut().find(|(w, _)| *w == worker) {
                Some((_, indices)) => indices.push(index),
                None => routes.push((worker, smallvec::smallvec![index])),
            }
        }
        if routes.is_empty() {
            return Ok(());
        }

        let pending = Arc::new(AtomicUsize::new(routes.len()));
        for (worker, indices) in routes {
            let job = Job {
                frame: Arc::clone(&frame),
                analyzers: indices,
                pending: Arc::clone(&pending),
            };
            senders[worker].send(job).map_err(|_| Error::Stopped)?;
        }
        Ok(())
    }

    /// Worker index the flow of analyzer `name` is pinned to, if it has been
    /// seen.
    pub fn worker_for(&self, name: &str, flow: &FlowKey) -> Option<usize> {
        let router = self.router.lock();
        let index = router.analyzers.iter().position(|a| a.name() == name)?;
        router.flows.get(&(index, flow.clone())).copied()
    }

    /// Stop accepting frames, drain the queues and join all threads.
    pub fn stop(&self) {
        {
            let mut router = self.router.lock();
            if router.state == PoolState::Stopped {
                return;
            }
            router.state = PoolState::Stopped;
            router.senders.clear();
        }
        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                warn!("stream worker thread panicked");
            }
        }
        self.inspector.stop();
        debug!(processed = self.processed(), "stream pool stopped");
    }
}

impl Drop for StreamDissectorPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One stream pool thread and everything it owns.
struct WorkerThread {
    index: usize,
    rx: Receiver<Job>,
    analyzers: Arc<[Arc<dyn StreamAnalyzer>]>,
    store: Arc<FrameStore>,
    tokens: Arc<TokenRegistry>,
    config: Arc<SessionConfig>,
    progress: Arc<Progress>,
}

impl WorkerThread {
    fn run(self) {
        let wk = *self.tokens.well_known();
        let mut workers: HashMap<(usize, FlowKey), StreamWorker> = HashMap::new();

        for job in self.rx.iter() {
            let Job {
                frame,
                analyzers,
                pending,
            } = job;
            let id = frame.id();
            let mut derived = Vec::new();

            for index in analyzers {
                let Some(analyzer) = self.analyzers.get(index) else {
                    continue;
                };
                let Some((layer, parent)) = frame.find_tagged(analyzer.hints()) else {
                    continue;
                };
                let Some(flow) = FlowKey::from_layer(layer, parent, &wk) else {
                    continue;
                };

                let worker = match workers.entry((index, flow)) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let worker = StreamWorker::create(
                            entry.key().1.clone(),
                            analyzer.as_ref(),
                            &self.config,
                        );
                        let (src, dst) = ports(layer, &wk);
                        if !worker.accepts(src, dst) {
                            continue;
                        }
                        entry.insert(worker)
                    }
                };

                derived.extend(worker.process(analyzer.as_ref(), id, layer, parent, &self.tokens));
            }

            // The store copies the frame on write while other handles to it
            // are alive.
            drop(frame);
            for layer in derived {
                if let Err(e) = self.store.append_layer(id, layer) {
                    warn!(frame = id, error = %e, "failed to append derived layer");
                }
            }
            if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.progress.frame_done();
            }
        }

        debug!(
            worker = self.index,
            flows = workers.len(),
            "stream worker exiting"
        );
    }
}

fn ports(layer: &Layer, wk: &WellKnown) -> (u16, u16) {
    let port = |id| layer.property(id).and_then(Value::as_u16).unwrap_or(0);
    (port(wk.src), port(wk.dst))
}
