//! Filter thread pool.
//!
//! Evaluation splits a frame range into one chunk per worker, evaluates the
//! chunks on persistent worker threads and concatenates the results in chunk
//! order, so the output is the same for any worker count.

use std::ops::Range;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameId};
use crate::store::FrameStore;

use super::Filter;

struct Task {
    chunk: usize,
    filter: Filter,
    frames: Vec<Arc<Frame>>,
    reply: Sender<(usize, Vec<FrameId>)>,
}

impl Task {
    fn run(self) {
        let matched = self
            .frames
            .iter()
            .filter(|frame| self.filter.matches(frame))
            .map(|frame| frame.id())
            .collect();
        // The caller may have given up; nothing to report then.
        let _ = self.reply.send((self.chunk, matched));
    }
}

pub struct FilterPool {
    store: Arc<FrameStore>,
    workers: usize,
    sender: Mutex<Option<Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FilterPool {
    pub fn new(store: Arc<FrameStore>, workers: usize) -> Self {
        Self {
            store,
            workers: workers.max(1),
            sender: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    pub fn start(&self) -> Result<()> {
        let mut sender = self.sender.lock();
        if sender.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let (tx, rx) = unbounded::<Task>();
        let mut handles = self.handles.lock();
        for index in 0..self.workers {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("capflow-filter-{index}"))
                .spawn(move || {
                    for task in rx.iter() {
                        task.run();
                    }
                })?;
            handles.push(handle);
        }
        *sender = Some(tx);
        debug!(workers = self.workers, "filter pool started");
        Ok(())
    }

    /// Ids of frames in `ids` matching `filter`, ascending.
    ///
    /// Frames are read from the store once, up front; layers appended while
    /// the evaluation runs are not seen.
    pub fn evaluate(&self, filter: &Filter, ids: Range<FrameId>) -> Result<Vec<FrameId>> {
        let frames = self.store.range(ids);
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_len = frames.len().div_ceil(self.workers);
        let chunks: Vec<Vec<Arc<Frame>>> = frames.chunks(chunk_len).map(<[_]>::to_vec).collect();
        let count = chunks.len();
        let (reply, results) = bounded(count);
        {
            let sender = self.sender.lock();
            let sender = sender.as_ref().ok_or(Error::NotStarted)?;
            for (chunk, frames) in chunks.into_iter().enumerate() {
                let task = Task {
                    chunk,
                    filter: filter.clone(),
                    frames,
                    reply: reply.clone(),
                };
                sender.send(task).map_err(|_| Error::Stopped)?;
            }
        }
        drop(reply);

        let mut parts: Vec<Option<Vec<FrameId>>> = vec![None; count];
        for _ in 0..count {
            let (chunk, matched) = results.recv().map_err(|_| Error::Stopped)?;
            parts[chunk] = Some(matched);
        }
        Ok(parts.into_iter().flatten().flatten().collect())
    }

    pub fn stop(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }
        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                warn!("filter worker thread panicked");
            }
        }
        debug!("filter pool stopped");
    }
}

impl Drop for FilterPool {
    fn drop(&mut self) {
        self.stop();
    }
}
