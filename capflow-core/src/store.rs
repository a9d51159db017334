//! Append-only, versioned frame store.
//!
//! Every mutation (a new frame, or a layer appended to an existing frame)
//! bumps the version by one and records which frame changed, so readers can
//! ask "what changed since version v" and get a consistent answer.
//!
//! Frames are stored behind `Arc`. Appending a layer copies the frame on write
//! if a reader still holds the previous snapshot, so snapshots never change
//! underneath their holders.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::error::StoreError;
use crate::frame::{Frame, FrameId, Layer};

/// Monotonic store version. Version 0 is the empty store.
pub type Version = u64;

/// Frames changed since some version, and the version they reflect.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub version: Version,
    pub frames: Vec<Arc<Frame>>,
}

#[derive(Default)]
struct Inner {
    frames: Vec<Arc<Frame>>,
    version: Version,
    /// `changes[i]` is the frame that produced version `i + 1`
    changes: Vec<FrameId>,
}

impl Inner {
    fn bump(&mut self, id: FrameId) -> Version {
        self.version += 1;
        self.changes.push(id);
        self.version
    }
}

#[derive(Default)]
pub struct FrameStore {
    inner: RwLock<Inner>,
    published: Mutex<Version>,
    changed: Condvar,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new frame. Its id must be exactly one past the last stored id.
    pub fn append(&self, frame: Frame) -> Result<Version, StoreError> {
        self.append_shared(Arc::new(frame))
    }

    pub fn append_shared(&self, frame: Arc<Frame>) -> Result<Version, StoreError> {
        let version = {
            let mut inner = self.inner.write();
            let expected = inner.frames.len() as FrameId + 1;
            if frame.id() != expected {
                return Err(StoreError::OutOfOrder {
                    expected,
                    got: frame.id(),
                });
            }
            let id = frame.id();
            inner.frames.push(frame);
            inner.bump(id)
        };
        self.publish(version);
        Ok(version)
    }

    /// Attach a derived layer on top of the layer stack of frame `id`.
    ///
    /// The whole frame is cloned first if any other `Arc` to it is alive, so
    /// writers should drop their own handle to the frame before calling this.
    pub fn append_layer(&self, id: FrameId, layer: Layer) -> Result<Version, StoreError> {
        let version = {
            let mut inner = self.inner.write();
            let slot = index(id)
                .and_then(|i| inner.frames.get_mut(i))
                .ok_or(StoreError::UnknownFrame { id })?;
            Arc::make_mut(slot).attach_top(layer);
            inner.bump(id)
        };
        self.publish(version);
        Ok(version)
    }

    /// Every frame changed after version `since`, in id order, each listed
    /// once, together with the version the answer reflects.
    pub fn frames_since(&self, since: Version) -> Snapshot {
        let inner = self.inner.read();
        let from = since.min(inner.version) as usize;
        let ids: BTreeSet<FrameId> = inner.changes[from..].iter().copied().collect();
        let frames = ids
            .into_iter()
            .filter_map(|id| index(id).and_then(|i| inner.frames.get(i)).cloned())
            .collect();
        Snapshot {
            version: inner.version,
            frames,
        }
    }

    pub fn get(&self, id: FrameId) -> Option<Arc<Frame>> {
        let i = index(id)?;
        self.inner.read().frames.get(i).cloned()
    }

    /// Frames with ids in `ids`, clamped to what is stored.
    pub fn range(&self, ids: Range<FrameId>) -> Vec<Arc<Frame>> {
        let inner = self.inner.read();
        let len = inner.frames.len();
        let start = (ids.start.max(1) - 1).min(len as FrameId) as usize;
        let end = (ids.end.max(1) - 1).min(len as FrameId) as usize;
        if start >= end {
            return Vec::new();
        }
        inner.frames[start..end].to_vec()
    }

    pub fn version(&self) -> Version {
        self.inner.read().version
    }

    pub fn len(&self) -> usize {
        self.inner.read().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until the version exceeds `version` or `timeout` elapses.
    /// Returns the latest published version.
    pub fn wait_for_version(&self, version: Version, timeout: Duration) -> Version {
        let deadline = Instant::now() + timeout;
        let mut published = self.published.lock();
        while *published <= version {
            if self.changed.wait_until(&mut published, deadline).timed_out() {
                break;
            }
        }
        *published
    }

    fn publish(&self, version: Version) {
        let mut published = self.published.lock();
        if version > *published {
            *published = version;
        }
        self.changed.notify_all();
    }
}

fn index(id: FrameId) -> Option<usize> {
    id.checked_sub(1).map(|i| i as usize)
}
