//! Release policy for evicted values
//!
//! Evicted nodes are moved out of the cache lock into a local holder, then
//! handed here. The policy decides where the actual drop happens: inline on
//! the calling thread, on a shared background worker, or on the host's
//! main/UI thread via an installed dispatcher. Thread-affine values (e.g.
//! handles that must be destroyed where they were created) are the reason
//! the main-thread path exists.

use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;

use tracing::warn;

use super::config::MainThreadDispatcher;

type ReleaseJob = Box<dyn FnOnce() + Send>;

/// Policy object that takes ownership of evicted values and drops them
/// according to the configured threading rules.
pub(crate) struct Releaser {
    release_async: bool,
    dispatcher: Option<MainThreadDispatcher>,
    worker: Mutex<Option<Sender<ReleaseJob>>>,
}

impl Releaser {
    pub(crate) fn new(
        release_async: bool,
        release_on_main_thread: bool,
        dispatcher: Option<MainThreadDispatcher>,
    ) -> Self {
        // The dispatcher is only consulted when the main-thread knob is set.
        let dispatcher = if release_on_main_thread { dispatcher } else { None };
        Self { release_async, dispatcher, worker: Mutex::new(None) }
    }

    /// Take ownership of a holder of evicted values and drop it per policy.
    pub(crate) fn release<T: Send + 'static>(&self, holder: Vec<T>) {
        if holder.is_empty() {
            return;
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher(Box::new(move || drop(holder)));
            return;
        }
        if self.release_async {
            if let Some(job) = self.post(Box::new(move || drop(holder))) {
                // Worker unavailable; fall back to the calling thread.
                job();
            }
            return;
        }
        drop(holder);
    }

    /// Post a job to the background worker, lazily spawning it.
    ///
    /// Returns the job back when no worker can run it.
    fn post(&self, job: ReleaseJob) -> Option<ReleaseJob> {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(_) => return Some(job),
        };
        if guard.is_none() {
            let (tx, rx) = mpsc::channel::<ReleaseJob>();
            let spawned = thread::Builder::new()
                .name("strata-mem-release".into())
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                });
            match spawned {
                Ok(_) => *guard = Some(tx),
                Err(e) => {
                    warn!("failed to spawn release worker: {}", e);
                    return Some(job);
                }
            }
        }
        match guard.as_ref() {
            Some(tx) => tx.send(job).err().map(|e| e.0),
            None => Some(job),
        }
    }
}
