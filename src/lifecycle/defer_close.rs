//! Close a shared resource only after its last in-flight use.
//!
//! ```text
//! acquire() ──▶ InFlight guard ──drop──▶ in_flight -= 1
//!                                          │
//! close() ──▶ close_requested = true       ▼
//!             in_flight == 0 ? ──────▶ inner.close()  (exactly once)
//! ```

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;

/// A resource with an explicit shutdown step.
pub trait Close {
    fn close(&self);
}

/// Wraps `T` so that closing waits for every outstanding use to finish.
#[derive(Debug)]
pub struct DeferClose<T: Close> {
    inner: T,
    in_flight: AtomicUsize,
    close_requested: AtomicBool,
    closed: AtomicBool,
    done: Notify,
}

impl<T: Close> DeferClose<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            close_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            done: Notify::new(),
        }
    }

    /// Start a use of the resource. Returns `None` once close was requested.
    pub fn acquire(&self) -> Option<InFlight<'_, T>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.close_requested.load(Ordering::SeqCst) {
            self.finish_use();
            return None;
        }
        Some(InFlight { owner: self })
    }

    /// Request close. The inner resource closes now if idle, otherwise when
    /// the last [`InFlight`] guard drops.
    pub fn close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            self.close_inner();
        }
    }

    /// Wait until the inner resource has been closed.
    pub async fn closed(&self) {
        let notified = self.done.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn finish_use(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.close_requested.load(Ordering::SeqCst) {
            self.close_inner();
        }
    }

    fn close_inner(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.close();
            self.done.notify_waiters();
        }
    }
}

/// Guard for one use of a [`DeferClose`] resource.
#[derive(Debug)]
pub struct InFlight<'a, T: Close> {
    owner: &'a DeferClose<T>,
}

impl<T: Close> Deref for InFlight<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.owner.inner
    }
}

impl<T: Close> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.owner.finish_use();
    }
}
