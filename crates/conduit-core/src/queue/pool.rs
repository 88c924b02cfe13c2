//! Background pool: N threads draining one shared FIFO channel

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error};
use parking_lot::Mutex;

use super::serial::panic_message;
use super::{DispatchQueue, Job, QueueToken};
use crate::{BridgeError, BridgeResult};

/// Multi-threaded queue.
///
/// Jobs are taken in dispatch order, but up to `threads` of them run at the
/// same time, so completion order is unspecified.
pub struct PoolQueue {
    label: String,
    token: QueueToken,
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl PoolQueue {
    /// Start `threads` worker threads (at least one)
    pub fn spawn(label: impl Into<String>, threads: usize) -> BridgeResult<Self> {
        let label = label.into();
        let token = QueueToken::new();
        let (sender, receiver) = channel::unbounded::<Job>();

        let mut handles = Vec::with_capacity(threads.max(1));
        for id in 0..threads.max(1) {
            let receiver = receiver.clone();
            let worker_label = format!("{}-{}", label, id);
            let handle = thread::Builder::new()
                .name(worker_label.clone())
                .spawn(move || Self::run_loop(worker_label, token, receiver))
                .map_err(|e| BridgeError::QueueSpawn {
                    label: label.clone(),
                    reason: e.to_string(),
                })?;
            handles.push(handle);
        }

        Ok(Self {
            label,
            token,
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
        })
    }

    fn run_loop(label: String, token: QueueToken, receiver: Receiver<Job>) {
        token.enter();
        for job in receiver.iter() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                error!(
                    "event=queue_job_panicked queue={} reason={}",
                    label,
                    panic_message(payload.as_ref())
                );
            }
        }
        debug!("event=queue_drained queue={}", label);
    }

    /// Number of worker threads still attached
    pub fn thread_count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl DispatchQueue for PoolQueue {
    fn label(&self) -> &str {
        &self.label
    }

    fn dispatch(&self, job: Job) -> BridgeResult<()> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or_else(|| BridgeError::QueueClosed {
            label: self.label.clone(),
        })?;
        sender.send(job).map_err(|_| BridgeError::QueueClosed {
            label: self.label.clone(),
        })
    }

    fn is_current(&self) -> bool {
        self.token.is_current()
    }

    fn seal(&self) {
        drop(self.sender.lock().take());
    }

    fn close(&self) {
        self.seal();
        if self.token.is_current() {
            return;
        }
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("event=queue_join_failed queue={}", self.label);
            }
        }
    }
}

impl Drop for PoolQueue {
    fn drop(&mut self) {
        self.close();
    }
}
