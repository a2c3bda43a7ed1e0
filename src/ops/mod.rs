//! The operator library. Every operator is an inherent method on
//! [`Signal`](crate::signal::Signal) building a new signal whose subscribe
//! function wraps the upstream's with a decorating observer; per-subscription
//! state lives in that decorator, allocated at subscription time.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

mod buffer;
mod combine;
mod debounce;
mod delay;
mod distinct;
mod effect;
mod filter;
mod flatten;
mod map;
mod merge;
mod observe_on;
mod recover;
mod recurse;
mod retry;
mod scan;
mod share;
mod start_with;
mod throttle;
mod timeout;

/// Iterative driver for synchronous feedback loops (sequential subscription,
/// re-subscription, recursive expansion).
///
/// `bounce(step)` either runs pending steps right now, or — when a caller
/// higher on this thread's stack is already draining — just marks one more
/// step pending and returns, leaving the active drainer to run it. Feedback
/// that would otherwise recurse (a step synchronously triggering the next
/// step) becomes a flat loop.
///
/// All `bounce` calls on one trampoline must pass interchangeable steps: a
/// deferred step is executed by re-running the drainer's own closure.
pub(crate) struct Trampoline {
  running: AtomicBool,
  pending: AtomicUsize,
}

impl Trampoline {
  pub fn new() -> Self {
    Self { running: AtomicBool::new(false), pending: AtomicUsize::new(0) }
  }

  pub fn bounce(&self, step: impl Fn()) {
    self.pending.fetch_add(1, Ordering::SeqCst);
    loop {
      if self.running.swap(true, Ordering::SeqCst) {
        // Someone is draining; they will see our pending mark.
        return;
      }
      loop {
        let marks = self.pending.swap(0, Ordering::SeqCst);
        if marks == 0 {
          break;
        }
        for _ in 0..marks {
          step();
        }
      }
      self.running.store(false, Ordering::SeqCst);
      // A mark may have arrived between the last swap and the release; if
      // nobody else picked it up, drain again.
      if self.pending.load(Ordering::SeqCst) == 0 {
        return;
      }
    }
  }
}
