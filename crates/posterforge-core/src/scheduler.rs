//! Explicit timers driven by the host's clock.
//!
//! Nothing here sleeps or spawns. Callers pass `now` and poll.

use std::time::{Duration, Instant};

/// Fires at most once per `interval`.
///
/// A request made outside the window is due immediately. A request inside the
/// window is deferred to the end of it, and further requests merge into it.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_fired: Option<Instant>,
    due: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedule a firing.
    pub fn request(&mut self, now: Instant) {
        if self.due.is_some() {
            return;
        }
        let due = match self.last_fired {
            Some(last) if now < last + self.interval => last + self.interval,
            _ => now,
        };
        self.due = Some(due);
    }

    /// Whether a scheduled firing is due; consumes it if so.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                self.last_fired = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Fire now if the window allows it, without scheduling anything otherwise.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        let allowed = match self.last_fired {
            Some(last) => now >= last + self.interval,
            None => true,
        };
        if allowed {
            self.last_fired = Some(now);
            self.due = None;
        }
        allowed
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    /// When the pending firing becomes due.
    pub fn due_at(&self) -> Option<Instant> {
        self.due
    }
}

/// Work deferred to the next idle tick. Requests merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleTask {
    pending: bool,
}

impl IdleTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) {
        self.pending = true;
    }

    /// Consume the pending request, if any.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn cancel(&mut self) {
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
