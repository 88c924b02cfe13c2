//! Invalidation state machine
//!
//! `Active → Invalidating → Invalidated`, one way. Teardown work is tracked
//! with tickets: the initiator holds one, every teardown step forks its own,
//! and whoever releases the last ticket moves the state to `Invalidated`.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::{BridgeError, BridgeResult};

/// Lifecycle state of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationState {
    /// Accepting calls in both directions
    Active,
    /// Teardown started; new calls fail with `BridgeInvalidated`
    Invalidating,
    /// Teardown finished (terminal)
    Invalidated,
}

impl InvalidationState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => InvalidationState::Active,
            1 => InvalidationState::Invalidating,
            _ => InvalidationState::Invalidated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            InvalidationState::Active => 0,
            InvalidationState::Invalidating => 1,
            InvalidationState::Invalidated => 2,
        }
    }
}

impl fmt::Display for InvalidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationState::Active => f.write_str("active"),
            InvalidationState::Invalidating => f.write_str("invalidating"),
            InvalidationState::Invalidated => f.write_str("invalidated"),
        }
    }
}

type DoneHook = Box<dyn FnOnce() + Send + 'static>;

/// Coordinates teardown of one bridge
pub struct InvalidationController {
    state: AtomicU8,
    tickets: AtomicUsize,
    on_done: Mutex<Option<DoneHook>>,
    latch: Mutex<()>,
    done: Condvar,
}

impl InvalidationController {
    /// A controller in the `Active` state
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(InvalidationState::Active.as_u8()),
            tickets: AtomicUsize::new(0),
            on_done: Mutex::new(None),
            latch: Mutex::new(()),
            done: Condvar::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> InvalidationState {
        InvalidationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether calls are still accepted
    pub fn is_active(&self) -> bool {
        self.state() == InvalidationState::Active
    }

    /// Fail with `BridgeInvalidated` unless active
    pub fn check_active(&self) -> BridgeResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(BridgeError::BridgeInvalidated)
        }
    }

    /// Move `Active → Invalidating`.
    ///
    /// Only the first caller gets the initiator ticket; later calls return
    /// `None`. `on_done` runs once, on the thread that releases the last
    /// ticket, just before the state becomes `Invalidated`.
    pub fn begin<F>(self: &Arc<Self>, on_done: F) -> Option<TeardownTicket>
    where
        F: FnOnce() + Send + 'static,
    {
        // Hold a ticket before the state flips so it cannot reach zero early.
        self.tickets.fetch_add(1, Ordering::AcqRel);
        let flipped = self
            .state
            .compare_exchange(
                InvalidationState::Active.as_u8(),
                InvalidationState::Invalidating.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if !flipped {
            // The teardown in flight owns the hook and finishes the state.
            self.release();
            return None;
        }

        *self.on_done.lock() = Some(Box::new(on_done));
        Some(TeardownTicket {
            controller: self.clone(),
        })
    }

    /// Tickets still outstanding
    pub fn outstanding(&self) -> usize {
        self.tickets.load(Ordering::Acquire)
    }

    /// Block until `Invalidated` or until `timeout` passes. Returns whether
    /// the state was reached.
    pub fn wait_invalidated(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.latch.lock();
        while self.state() != InvalidationState::Invalidated {
            if self.done.wait_until(&mut guard, deadline).timed_out() {
                return self.state() == InvalidationState::Invalidated;
            }
        }
        true
    }

    fn release(&self) {
        if self.tickets.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        // A late `begin` can also drop to zero; only the hook's taker finishes.
        let Some(hook) = self.on_done.lock().take() else {
            return;
        };
        hook();

        let _guard = self.latch.lock();
        self.state
            .store(InvalidationState::Invalidated.as_u8(), Ordering::Release);
        self.done.notify_all();
    }
}

impl Default for InvalidationController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InvalidationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationController")
            .field("state", &self.state())
            .field("tickets", &self.outstanding())
            .finish()
    }
}

/// One outstanding teardown step. Dropping it marks the step done.
pub struct TeardownTicket {
    controller: Arc<InvalidationController>,
}

impl TeardownTicket {
    /// Take another ticket for a further step
    pub fn fork(&self) -> TeardownTicket {
        self.controller.tickets.fetch_add(1, Ordering::AcqRel);
        TeardownTicket {
            controller: self.controller.clone(),
        }
    }
}

impl Drop for TeardownTicket {
    fn drop(&mut self) {
        self.controller.release();
    }
}

impl fmt::Debug for TeardownTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeardownTicket").finish_non_exhaustive()
    }
}
