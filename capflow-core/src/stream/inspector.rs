//! Inspector side channel.
//!
//! Stream analyzers and host code can post `(id, message)` pairs that are
//! delivered, in order, to a single callback on a dedicated thread.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use compact_str::CompactString;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};

/// Callback receiving `(inspector id, message)`.
pub type InspectorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

struct Shared {
    callback: RwLock<Option<InspectorCallback>>,
    ids: Mutex<BTreeSet<CompactString>>,
}

pub(crate) struct Inspector {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<(CompactString, String)>>>,
    receiver: Mutex<Option<Receiver<(CompactString, String)>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Inspector {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                callback: RwLock::new(None),
                ids: Mutex::new(BTreeSet::new()),
            }),
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the delivery thread. Messages posted earlier are delivered
    /// once it runs.
    pub(crate) fn start(&self) -> Result<()> {
        let Some(rx) = self.receiver.lock().take() else {
            return Ok(());
        };
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("capflow-inspector".into())
            .spawn(move || {
                for (id, message) in rx.iter() {
                    let callback = shared.callback.read().clone();
                    match callback {
                        Some(callback) => callback(&id, &message),
                        None => debug!(inspector = %id, "no inspector callback, message dropped"),
                    }
                }
            })?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    pub(crate) fn send(&self, id: &str, message: impl Into<String>) -> Result<()> {
        let id = CompactString::from(id);
        self.shared.ids.lock().insert(id.clone());
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(Error::Stopped)?;
        sender
            .send((id, message.into()))
            .map_err(|_| Error::Stopped)
    }

    pub(crate) fn set_callback(&self, callback: InspectorCallback) {
        *self.shared.callback.write() = Some(callback);
    }

    pub(crate) fn ids(&self) -> Vec<CompactString> {
        self.shared.ids.lock().iter().cloned().collect()
    }

    /// Close the channel and wait for pending messages to be delivered.
    pub(crate) fn stop(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}
