//! Production scheduler backed by a futures thread pool.

use std::time::Duration;

use futures::executor::ThreadPool;

use super::Scheduler;
use crate::disposable::Disposable;

/// Runs scheduled tasks on a shared pool of worker threads, sleeping through
/// `futures-time` before each task fires.
pub struct ThreadPoolScheduler {
  pool: ThreadPool,
}

impl ThreadPoolScheduler {
  pub fn new() -> Self {
    Self { pool: ThreadPool::new().expect("failed to spawn scheduler thread pool") }
  }
}

impl Default for ThreadPoolScheduler {
  fn default() -> Self { Self::new() }
}

impl Scheduler for ThreadPoolScheduler {
  fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send + 'static>) -> Disposable {
    let handle = Disposable::empty();
    let guard = handle.clone();
    self.pool.spawn_ok(async move {
      if !delay.is_zero() {
        futures_time::task::sleep(delay.into()).await;
      }
      // A disposed handle turns a late firing into a no-op.
      if !guard.is_disposed() {
        task();
      }
    });
    handle
  }
}
