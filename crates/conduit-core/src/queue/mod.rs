//! Dispatch queues
//!
//! Every native method runs on a queue: the host's main queue, the shared
//! background pool, or a named serial queue. The script runtime has its own
//! serial queue whose thread owns the execution context.

mod pool;
mod serial;

pub use pool::PoolQueue;
pub use serial::{SerialQueue, StatefulQueue};

pub(crate) use serial::panic_message;

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use conduit_sdk::QueueId;
use rustc_hash::FxHashMap;

use crate::BridgeResult;

/// A unit of work for a native queue
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO executor for native work.
///
/// Jobs dispatched to one queue start in dispatch order. Serial queues also
/// finish in that order; pool queues may overlap.
pub trait DispatchQueue: Send + Sync {
    /// Human-readable label, also used as the thread name prefix
    fn label(&self) -> &str;

    /// Enqueue `job`; fails with `QueueClosed` once the queue is closed
    fn dispatch(&self, job: Job) -> BridgeResult<()>;

    /// Whether the calling thread belongs to this queue
    fn is_current(&self) -> bool;

    /// Stop accepting work without waiting. Queued jobs still run and the
    /// threads exit once drained.
    fn seal(&self);

    /// Stop accepting work, drain what is queued and release the threads
    fn close(&self);
}

/// Identity of a queue's threads, used for `is_current`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueToken(u64);

impl QueueToken {
    /// Create a new unique token
    pub fn new() -> Self {
        static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
        QueueToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// Mark the calling thread as belonging to this token's queue
    pub(crate) fn enter(self) {
        CURRENT_QUEUE.with(|current| current.set(self.0));
    }

    /// Whether the calling thread belongs to this token's queue
    pub fn is_current(self) -> bool {
        CURRENT_QUEUE.with(|current| current.get() == self.0)
    }
}

impl Default for QueueToken {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static CURRENT_QUEUE: Cell<u64> = const { Cell::new(0) };
}

/// The native queues of one bridge, resolved from `QueueId`s
pub struct QueueSet {
    main: Arc<dyn DispatchQueue>,
    background: Arc<dyn DispatchQueue>,
    named: FxHashMap<String, Arc<dyn DispatchQueue>>,
    owns_main: bool,
}

impl QueueSet {
    /// Create a queue set. `owns_main` is false when the host supplied the
    /// main queue and keeps responsibility for closing it.
    pub fn new(
        main: Arc<dyn DispatchQueue>,
        background: Arc<dyn DispatchQueue>,
        owns_main: bool,
    ) -> Self {
        Self {
            main,
            background,
            named: FxHashMap::default(),
            owns_main,
        }
    }

    /// Create the serial queue for `label` if it does not exist yet
    pub fn ensure_named(&mut self, label: &str, thread_prefix: &str) -> BridgeResult<()> {
        if !self.named.contains_key(label) {
            let queue = SerialQueue::spawn(format!("{}.{}", thread_prefix, label))?;
            self.named.insert(label.to_string(), Arc::new(queue));
        }
        Ok(())
    }

    /// Resolve a queue id
    pub fn get(&self, id: &QueueId) -> Option<&Arc<dyn DispatchQueue>> {
        match id {
            QueueId::Main => Some(&self.main),
            QueueId::Background => Some(&self.background),
            QueueId::Named(label) => self.named.get(label),
        }
    }

    /// Number of named serial queues
    pub fn named_count(&self) -> usize {
        self.named.len()
    }

    /// Whether the calling thread belongs to any queue in this set
    pub fn is_current(&self) -> bool {
        self.main.is_current()
            || self.background.is_current()
            || self.named.values().any(|queue| queue.is_current())
    }

    /// Stop every owned queue from accepting work, without joining
    pub fn seal_all(&self) {
        for queue in self.named.values() {
            queue.seal();
        }
        self.background.seal();
        if self.owns_main {
            self.main.seal();
        }
    }

    /// Close every queue this set owns
    pub fn close_all(&self) {
        for queue in self.named.values() {
            queue.close();
        }
        self.background.close();
        if self.owns_main {
            self.main.close();
        }
    }
}
