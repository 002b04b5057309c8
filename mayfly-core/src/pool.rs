//! Worker pool used as a deferred destructor.
//!
//! Dropping a large container is CPU-bound work that would stall the reactor
//! thread, so detached values are handed to a small fixed pool instead. All
//! workers drain one shared FIFO; job order across workers is not
//! guaranteed, and jobs return nothing — releasing the owned memory is the
//! whole effect.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads consuming one job queue.
///
/// Dropping the pool closes the queue and joins every worker, so queued
/// jobs finish before the pool goes away.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads (at least one) draining a shared queue.
    ///
    /// A failed thread spawn is logged and tolerated; with no workers at
    /// all, jobs run inline on the caller.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(workers.max(1));
        for worker_id in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let spawned = thread::Builder::new()
                .name(format!("mayfly-drop-{worker_id}"))
                .spawn(move || worker_main(&receiver));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    tracing::warn!("failed to spawn destructor worker {worker_id}: {error}");
                }
            }
        }
        Self {
            sender: Some(sender),
            workers: handles,
        }
    }

    /// Enqueues one job; falls back to running it on the caller when no
    /// worker thread is available.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if self.workers.is_empty() {
            job();
            return;
        }
        let Some(sender) = self.sender.as_ref() else {
            job();
            return;
        };
        if let Err(rejected) = sender.send(Box::new(job)) {
            (rejected.0)();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_main(receiver: &Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let Ok(guard) = receiver.lock() else { return };
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => return,
        }
    }
}
