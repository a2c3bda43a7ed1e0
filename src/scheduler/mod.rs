//! Pluggable delayed execution for the timing operators.
//!
//! Every timing operator takes a scheduler as an optional trailing concern:
//! the `xxx(dur)` form uses the process-wide default, the `xxx_on(dur, s)`
//! form takes an injected one (typically a [`TestScheduler`] in tests).

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use once_cell::sync::Lazy;

use crate::disposable::Disposable;

mod test_scheduler;
mod thread_pool;

pub use test_scheduler::TestScheduler;
pub use thread_pool::ThreadPoolScheduler;

/// A provider of delayed execution.
///
/// `schedule` runs `task` after `delay` on a worker owned by the scheduler
/// and returns a handle; disposing the handle makes a not-yet-fired task a
/// no-op. Periodic behavior (`interval`, `buffer_time`) is built by
/// sequential re-scheduling on top of this single primitive.
pub trait Scheduler: Send + Sync + 'static {
  fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send + 'static>) -> Disposable;

  /// The scheduler's notion of the current instant. Virtual-time schedulers
  /// override this; operators measuring elapsed time (`throttle`, `delay`)
  /// must use it instead of `Instant::now()`.
  fn now(&self) -> Instant { Instant::now() }
}

pub type SharedScheduler = Arc<dyn Scheduler>;

static DEFAULT: Lazy<SharedScheduler> = Lazy::new(|| Arc::new(ThreadPoolScheduler::new()));

/// The process-wide default scheduler, used by every timing operator that is
/// not handed an explicit one.
pub fn default_scheduler() -> SharedScheduler { DEFAULT.clone() }
