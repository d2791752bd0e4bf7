//! Frame-driven timers
//!
//! Kiln runs on a single-threaded game loop. Deferred work is scheduled on a
//! [`Scheduler`] and fires on a later tick of the same loop, when the host
//! advances the clock. [`TimerQueue`] is the default scheduler: the host
//! calls [`TimerQueue::advance`] once per frame with the frame delta.

use slotmap::{new_key_type, SlotMap};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

new_key_type! {
    /// Handle to a scheduled timer
    pub struct TimerId;
}

/// Schedules one-shot callbacks on the host loop
pub trait Scheduler {
    /// Run `callback` once, `delay` after the current time
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;

    /// Cancel a pending timer. Returns false if it already fired or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}

/// Shared handle to a scheduler
pub type SharedScheduler = Rc<dyn Scheduler>;

struct PendingTimer {
    due: Duration,
    /// Scheduling order, breaks ties between timers due at the same time
    seq: u64,
    callback: Box<dyn FnOnce()>,
}

/// Timer queue advanced explicitly by the host loop
#[derive(Default)]
pub struct TimerQueue {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    timers: RefCell<SlotMap<TimerId, PendingTimer>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the queue was created
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of timers waiting to fire
    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Advance the clock by `delta` and fire every timer that became due
    ///
    /// Timers fire in due order. A timer scheduled by a callback fires in
    /// the same call if it is already due. Returns how many timers fired.
    pub fn advance(&self, delta: Duration) -> usize {
        self.now.set(self.now.get().saturating_add(delta));
        let mut fired = 0;

        while let Some(callback) = self.pop_due() {
            callback();
            fired += 1;
        }

        if fired > 0 {
            tracing::trace!(fired, now_ms = self.now.get().as_millis() as u64, "timers fired");
        }
        fired
    }

    fn pop_due(&self) -> Option<Box<dyn FnOnce()>> {
        let now = self.now.get();
        let mut timers = self.timers.borrow_mut();
        let id = timers
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .min_by_key(|(_, timer)| (timer.due, timer.seq))
            .map(|(id, _)| id)?;
        timers.remove(id).map(|timer| timer.callback)
    }
}

impl Scheduler for TimerQueue {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.timers.borrow_mut().insert(PendingTimer {
            due: self.now.get().saturating_add(delay),
            seq,
            callback,
        })
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.timers.borrow_mut().remove(id).is_some()
    }
}
