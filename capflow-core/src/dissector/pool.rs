//! Dissector thread pool.
//!
//! Capture records are numbered when submitted and decoded on whichever
//! worker thread is free. Decoded frames pass through a sequencer that
//! commits them to the [`FrameStore`] strictly in id order, then forwards
//! each committed frame to the stream pool.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{Backpressure, SessionConfig};
use crate::error::{Error, Result};
use crate::frame::{CaptureRecord, Frame, FrameId};
use crate::store::FrameStore;
use crate::stream::StreamDissectorPool;
use crate::token::TokenRegistry;

use super::{Dissector, DissectorRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Idle,
    Running,
    Stopped,
}

struct Job {
    id: FrameId,
    record: CaptureRecord,
}

/// Submission side. Ids are assigned under this lock so queue order is id
/// order.
struct Intake {
    state: PoolState,
    sender: Option<Sender<Job>>,
    next_id: FrameId,
}

struct Pending {
    next: FrameId,
    frames: BTreeMap<FrameId, Frame>,
}

/// Reorder buffer between the workers and the store.
struct Sequencer {
    store: Arc<FrameStore>,
    stream: Option<Arc<StreamDissectorPool>>,
    pending: Mutex<Pending>,
}

impl Sequencer {
    fn complete(&self, frame: Frame) {
        let mut pending = self.pending.lock();
        pending.frames.insert(frame.id(), frame);

        loop {
            let next = pending.next;
            let Some(frame) = pending.frames.remove(&next) else {
                break;
            };
            pending.next += 1;

            let frame = Arc::new(frame);
            if let Err(e) = self.store.append_shared(Arc::clone(&frame)) {
                warn!(frame = next, error = %e, "frame store rejected frame");
                continue;
            }
            if let Some(stream) = &self.stream {
                if let Err(e) = stream.submit(frame) {
                    warn!(frame = next, error = %e, "stream pool did not take frame");
                }
            }
        }
    }

    fn committed(&self) -> FrameId {
        self.pending.lock().next - 1
    }
}

pub struct DissectorPool {
    registry: Arc<DissectorRegistry>,
    tokens: Arc<TokenRegistry>,
    config: Arc<SessionConfig>,
    sequencer: Arc<Sequencer>,
    intake: Mutex<Intake>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl DissectorPool {
    /// Pool dispatching with `registry`, committing into `store` and
    /// forwarding committed frames to `stream` when given.
    pub fn new(
        registry: DissectorRegistry,
        tokens: Arc<TokenRegistry>,
        config: Arc<SessionConfig>,
        store: Arc<FrameStore>,
        stream: Option<Arc<StreamDissectorPool>>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            tokens,
            config,
            sequencer: Arc::new(Sequencer {
                store,
                stream,
                pending: Mutex::new(Pending {
                    next: 1,
                    frames: BTreeMap::new(),
                }),
            }),
            intake: Mutex::new(Intake {
                state: PoolState::Idle,
                sender: None,
                next_id: 1,
            }),
            handles: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a dissector. Only allowed before [`start`](Self::start).
    pub fn register<D: Dissector + 'static>(&mut self, dissector: D) -> Result<()> {
        self.register_arc(Arc::new(dissector))
    }

    pub fn register_arc(&mut self, dissector: Arc<dyn Dissector>) -> Result<()> {
        if self.intake.get_mut().state != PoolState::Idle {
            return Err(Error::AlreadyStarted);
        }
        Arc::get_mut(&mut self.registry)
            .ok_or(Error::AlreadyStarted)?
            .register_arc(dissector);
        Ok(())
    }

    pub fn registry(&self) -> &DissectorRegistry {
        &self.registry
    }

    /// Spawn `workers` threads behind a queue of `queue_capacity` records.
    pub fn start(&self) -> Result<()> {
        let mut intake = self.intake.lock();
        match intake.state {
            PoolState::Idle => {}
            PoolState::Running => return Err(Error::AlreadyStarted),
            PoolState::Stopped => return Err(Error::Stopped),
        }

        let (tx, rx) = bounded(self.config.queue_capacity.max(1));
        let mut handles = self.handles.lock();
        for index in 0..self.config.workers.max(1) {
            let worker = WorkerThread {
                rx: rx.clone(),
                registry: Arc::clone(&self.registry),
                tokens: Arc::clone(&self.tokens),
                config: Arc::clone(&self.config),
                sequencer: Arc::clone(&self.sequencer),
            };
            let handle = thread::Builder::new()
                .name(format!("capflow-dissect-{index}"))
                .spawn(move || worker.run())?;
            handles.push(handle);
        }

        intake.sender = Some(tx);
        intake.state = PoolState::Running;
        debug!(
            workers = handles.len(),
            dissectors = self.registry.len(),
            capacity = self.config.queue_capacity,
            "dissector pool started"
        );
        Ok(())
    }

    /// Queue a record for dissection and return the frame id it will get.
    ///
    /// When the queue is full this blocks, or with [`Backpressure::Drop`]
    /// fails with [`Error::QueueFull`] without consuming an id.
    pub fn submit(&self, record: CaptureRecord) -> Result<FrameId> {
        let mut intake = self.intake.lock();
        match intake.state {
            PoolState::Running => {}
            PoolState::Idle => return Err(Error::NotStarted),
            PoolState::Stopped => return Err(Error::Stopped),
        }
        let id = intake.next_id;
        let sender = intake.sender.as_ref().ok_or(Error::Stopped)?;
        let job = Job { id, record };

        match self.config.backpressure {
            Backpressure::Block => sender.send(job).map_err(|_| Error::Stopped)?,
            Backpressure::Drop => match sender.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(dropped, "input queue full, dropping capture record");
                    return Err(Error::QueueFull);
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::Stopped),
            },
        }
        intake.next_id += 1;
        Ok(id)
    }

    /// Records rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records waiting for a worker.
    pub fn queued(&self) -> usize {
        self.intake.lock().sender.as_ref().map_or(0, Sender::len)
    }

    /// Highest frame id committed to the store.
    pub fn committed(&self) -> FrameId {
        self.sequencer.committed()
    }

    /// Stop accepting records, finish everything queued and join the workers.
    pub fn stop(&self) {
        {
            let mut intake = self.intake.lock();
            if intake.state == PoolState::Stopped {
                return;
            }
            intake.state = PoolState::Stopped;
            intake.sender = None;
        }
        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                warn!("dissector worker thread panicked");
            }
        }
        debug!(
            committed = self.committed(),
            dropped = self.dropped(),
            "dissector pool stopped"
        );
    }
}

impl Drop for DissectorPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerThread {
    rx: Receiver<Job>,
    registry: Arc<DissectorRegistry>,
    tokens: Arc<TokenRegistry>,
    config: Arc<SessionConfig>,
    sequencer: Arc<Sequencer>,
}

impl WorkerThread {
    fn run(self) {
        for Job { id, record } in self.rx.iter() {
            let fallback = record.clone();
            let frame = panic::catch_unwind(AssertUnwindSafe(|| {
                self.registry
                    .dissect(id, record, &self.tokens, &self.config)
            }))
            .unwrap_or_else(|_| {
                // The sequencer waits for every id, so a frame is committed
                // even when dissection did not finish.
                warn!(frame = id, "dissection panicked");
                let mut frame = Frame::new(id, fallback);
                frame.set_error("dissection panicked");
                frame
            });
            self.sequencer.complete(frame);
        }
    }
}
