//! Serial queues backed by one dedicated thread

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error};
use parking_lot::Mutex;

use super::{DispatchQueue, Job, QueueToken};
use crate::{BridgeError, BridgeResult};

type StateJob<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// A serial queue whose thread owns a piece of state.
///
/// Jobs run one at a time, in dispatch order, with `&mut S`. The state never
/// leaves the queue thread and is dropped there once the queue is closed and
/// drained.
pub struct StatefulQueue<S: Send + 'static> {
    label: String,
    token: QueueToken,
    sender: Mutex<Option<Sender<StateJob<S>>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<S: Send + 'static> StatefulQueue<S> {
    /// Start the queue thread, moving `state` onto it
    pub fn spawn(label: impl Into<String>, state: S) -> BridgeResult<Self> {
        let label = label.into();
        let token = QueueToken::new();
        let (sender, receiver) = channel::unbounded::<StateJob<S>>();

        let thread_label = label.clone();
        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || Self::run_loop(thread_label, token, state, receiver))
            .map_err(|e| BridgeError::QueueSpawn {
                label: label.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            label,
            token,
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    fn run_loop(label: String, token: QueueToken, mut state: S, receiver: Receiver<StateJob<S>>) {
        token.enter();
        for job in receiver.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&mut state)));
            if let Err(payload) = outcome {
                error!(
                    "event=queue_job_panicked queue={} reason={}",
                    label,
                    panic_message(payload.as_ref())
                );
            }
        }
        debug!("event=queue_drained queue={}", label);
    }

    /// Enqueue a job that receives the queue's state
    pub fn dispatch_with<F>(&self, job: F) -> BridgeResult<()>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or_else(|| BridgeError::QueueClosed {
            label: self.label.clone(),
        })?;
        sender
            .send(Box::new(job))
            .map_err(|_| BridgeError::QueueClosed {
                label: self.label.clone(),
            })
    }

    /// Queue label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the calling thread is this queue's thread
    pub fn is_current(&self) -> bool {
        self.token.is_current()
    }

    /// Whether the queue still accepts work
    pub fn is_open(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Stop accepting jobs without waiting for the thread
    pub fn seal(&self) {
        drop(self.sender.lock().take());
    }

    /// Stop accepting jobs. Already queued jobs still run. Joins the thread
    /// unless called from it.
    pub fn close(&self) {
        self.seal();
        if self.token.is_current() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!("event=queue_join_failed queue={}", self.label);
            }
        }
    }
}

impl<S: Send + 'static> Drop for StatefulQueue<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A plain serial queue: one thread, FIFO
pub struct SerialQueue {
    inner: StatefulQueue<()>,
}

impl SerialQueue {
    /// Start a serial queue thread named `label`
    pub fn spawn(label: impl Into<String>) -> BridgeResult<Self> {
        Ok(Self {
            inner: StatefulQueue::spawn(label, ())?,
        })
    }
}

impl DispatchQueue for SerialQueue {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn dispatch(&self, job: Job) -> BridgeResult<()> {
        self.inner.dispatch_with(move |_| job())
    }

    fn is_current(&self) -> bool {
        self.inner.is_current()
    }

    fn seal(&self) {
        self.inner.seal();
    }

    fn close(&self) {
        self.inner.close();
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
