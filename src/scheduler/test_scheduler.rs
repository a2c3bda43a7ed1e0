//! Virtual-time scheduler for deterministic testing of timing operators.
//!
//! Time only advances when told to: [`TestScheduler::advance_by`] moves the
//! virtual clock and runs every task that falls due on the calling thread,
//! in due-time order (FIFO among equal due times). [`TestScheduler::flush`]
//! drains everything that is queued, however far in the virtual future,
//! which is the blocking "wait for all scheduled work" operation the timing
//! test suites use.

use std::{
  cmp::Ordering as CmpOrdering,
  collections::BinaryHeap,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use super::Scheduler;
use crate::disposable::Disposable;

struct Job {
  due: Duration,
  seq: u64,
  task: Option<Box<dyn FnOnce() + Send>>,
  handle: Disposable,
}

impl PartialEq for Job {
  fn eq(&self, other: &Self) -> bool { self.due == other.due && self.seq == other.seq }
}

impl Eq for Job {}

impl PartialOrd for Job {
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> { Some(self.cmp(other)) }
}

impl Ord for Job {
  // Min-heap: earlier due times first, then FIFO by sequence number.
  fn cmp(&self, other: &Self) -> CmpOrdering {
    other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
  }
}

struct State {
  origin: Instant,
  now: Duration,
  seq: u64,
  queue: BinaryHeap<Job>,
}

/// A scheduler whose clock is a number you control.
pub struct TestScheduler {
  state: Mutex<State>,
}

impl TestScheduler {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      state: Mutex::new(State {
        origin: Instant::now(),
        now: Duration::ZERO,
        seq: 0,
        queue: BinaryHeap::new(),
      }),
    })
  }

  /// Virtual time elapsed since creation.
  pub fn elapsed(&self) -> Duration { self.state.lock().unwrap().now }

  /// Number of tasks currently queued (cancelled ones included until they
  /// would have fired).
  pub fn pending(&self) -> usize { self.state.lock().unwrap().queue.len() }

  /// Advance the virtual clock by `delta`, firing every task that falls due.
  /// Tasks scheduled by a firing task run in the same pass if they fall
  /// within the window.
  pub fn advance_by(&self, delta: Duration) {
    let target = self.state.lock().unwrap().now + delta;
    self.run_due(Some(target));
    self.state.lock().unwrap().now = target;
  }

  /// Run every queued task in virtual order, however far in the future,
  /// until the queue is empty. Re-scheduled work (periodic tasks) keeps the
  /// clock moving, so callers combine this with disposal to stop infinite
  /// schedules.
  pub fn flush(&self) { self.run_due(None); }

  fn run_due(&self, target: Option<Duration>) {
    loop {
      let job = {
        let mut state = self.state.lock().unwrap();
        match state.queue.peek() {
          Some(job) if target.is_none_or(|t| job.due <= t) => {
            let mut job = state.queue.pop().unwrap();
            state.now = job.due;
            job.task.take().filter(|_| !job.handle.is_disposed())
          }
          _ => break,
        }
      };
      // Run outside the lock: the task may schedule more work.
      if let Some(task) = job {
        task();
      }
    }
  }
}

impl Scheduler for TestScheduler {
  fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send + 'static>) -> Disposable {
    let handle = Disposable::empty();
    let mut state = self.state.lock().unwrap();
    state.seq += 1;
    let job = Job { due: state.now + delay, seq: state.seq, task: Some(task), handle: handle.clone() };
    state.queue.push(job);
    handle
  }

  fn now(&self) -> Instant {
    let state = self.state.lock().unwrap();
    state.origin + state.now
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn advance_fires_due_tasks_in_order() {
    let scheduler = TestScheduler::new();
    let order = Arc::new(Mutex::new(vec![]));

    for (label, delay) in [("b", 20), ("a", 10), ("c", 30)] {
      let order = order.clone();
      scheduler.schedule(
        Duration::from_millis(delay),
        Box::new(move || order.lock().unwrap().push(label)),
      );
    }

    scheduler.advance_by(Duration::from_millis(20));
    assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);

    scheduler.advance_by(Duration::from_millis(10));
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
  }

  #[test]
  fn cancelled_task_never_fires() {
    let scheduler = TestScheduler::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    let handle = scheduler.schedule(
      Duration::from_millis(10),
      Box::new(move || {
        f.fetch_add(1, Ordering::SeqCst);
      }),
    );
    handle.dispose();
    scheduler.flush();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn task_scheduled_during_run_fires_in_same_window() {
    let scheduler = TestScheduler::new();
    let fired = Arc::new(AtomicUsize::new(0));

    let inner_fired = fired.clone();
    let chain = scheduler.clone();
    scheduler.schedule(
      Duration::from_millis(10),
      Box::new(move || {
        let inner_fired = inner_fired.clone();
        chain.schedule(
          Duration::from_millis(5),
          Box::new(move || {
            inner_fired.fetch_add(1, Ordering::SeqCst);
          }),
        );
      }),
    );

    scheduler.advance_by(Duration::from_millis(15));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn virtual_now_tracks_advances() {
    let scheduler = TestScheduler::new();
    let before = Scheduler::now(&*scheduler);
    scheduler.advance_by(Duration::from_secs(5));
    assert_eq!(Scheduler::now(&*scheduler) - before, Duration::from_secs(5));
  }
}
