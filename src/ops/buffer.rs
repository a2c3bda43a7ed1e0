//! Batching values by count and by time.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
  time::Duration,
};

use crate::{
  disposable::Disposable,
  fault::Fault,
  observer::{SharedObserver, Subscriber},
  scheduler::{default_scheduler, SharedScheduler},
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Collect values into batches of `size`; a partial batch is flushed on
  /// completion. `buffer(0)` wraps each value in a singleton batch.
  pub fn buffer(&self, size: usize) -> Signal<Vec<T>> {
    if size == 0 {
      return self.map(|value| vec![value]);
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let batch: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
      let downstream = observer.clone();
      let flushing = batch.clone();
      let upstream = Subscriber::relay(&observer, {
        let downstream = downstream.clone();
        move |value| {
          let full = {
            let mut b = batch.lock().unwrap();
            b.push(value);
            if b.len() == size {
              Some(std::mem::take(&mut *b))
            } else {
              None
            }
          };
          if let Some(full) = full {
            downstream.accept(full);
          }
        }
      })
      .on_complete(move || {
        let remainder = std::mem::take(&mut *flushing.lock().unwrap());
        if !remainder.is_empty() {
          downstream.accept(remainder);
        }
        downstream.complete();
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Emit a sliding window of the last `size` values every `interval`
  /// values. Zero arguments fall back to `1`, the original's lenient
  /// argument contract.
  pub fn buffer_interval(&self, size: usize, interval: usize) -> Signal<Vec<T>> {
    let size = size.max(1);
    let interval = interval.max(1);
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let state: Mutex<(VecDeque<T>, usize)> = Mutex::new((VecDeque::new(), 0));
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value| {
        let window = {
          let mut s = state.lock().unwrap();
          s.0.push_back(value);
          if s.0.len() > size {
            s.0.pop_front();
          }
          s.1 += 1;
          if s.1 % interval == 0 && s.0.len() == size {
            Some(s.0.iter().cloned().collect::<Vec<T>>())
          } else {
            None
          }
        };
        if let Some(window) = window {
          downstream.accept(window);
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Collect values and emit the accumulated batch every `window` of time
  /// (empty intervals emit nothing). A zero window wraps each value in a
  /// singleton batch.
  pub fn buffer_time(&self, window: Duration) -> Signal<Vec<T>> {
    self.buffer_time_on(window, default_scheduler())
  }

  /// `buffer_time` on an explicit scheduler.
  pub fn buffer_time_on(&self, window: Duration, scheduler: SharedScheduler) -> Signal<Vec<T>> {
    if window.is_zero() {
      return self.map(|value| vec![value]);
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let driver = Arc::new(TimedBatchDriver {
        state: Mutex::new(TimedBatchState { batch: Vec::new(), timer: None }),
        downstream: observer,
        disposer: disposer.clone(),
        scheduler: scheduler.clone(),
        window,
      });
      {
        let driver = driver.clone();
        disposer.add_action(move || driver.cancel());
      }
      driver.clone().arm();

      let values = driver.clone();
      let completions = driver.clone();
      let failures = driver.clone();
      let upstream = Subscriber::default()
        .on_next(move |value| values.state.lock().unwrap().batch.push(value))
        .on_complete(move || completions.clone().finish())
        .on_error(move |fault| failures.clone().fail(fault))
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

struct TimedBatchDriver<T> {
  state: Mutex<TimedBatchState<T>>,
  downstream: SharedObserver<Vec<T>>,
  disposer: Disposable,
  scheduler: SharedScheduler,
  window: Duration,
}

struct TimedBatchState<T> {
  batch: Vec<T>,
  timer: Option<Disposable>,
}

impl<T: Flow> TimedBatchDriver<T> {
  fn arm(self: Arc<Self>) {
    let driver = self.clone();
    let handle = self.scheduler.schedule(self.window, Box::new(move || driver.flush_and_rearm()));
    self.state.lock().unwrap().timer = Some(handle);
  }

  fn flush_and_rearm(self: Arc<Self>) {
    if self.disposer.is_disposed() {
      return;
    }
    let batch = std::mem::take(&mut self.state.lock().unwrap().batch);
    if !batch.is_empty() {
      self.downstream.accept(batch);
    }
    self.arm();
  }

  fn finish(self: Arc<Self>) {
    self.cancel();
    let batch = std::mem::take(&mut self.state.lock().unwrap().batch);
    if !batch.is_empty() {
      self.downstream.accept(batch);
    }
    self.downstream.complete();
  }

  fn fail(self: Arc<Self>, fault: Fault) {
    self.cancel();
    self.state.lock().unwrap().batch.clear();
    self.downstream.error(fault);
  }

  fn cancel(&self) {
    if let Some(timer) = self.state.lock().unwrap().timer.take() {
      timer.dispose();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{scheduler::TestScheduler, signaling::Signaling};

  #[test]
  fn buffer_batches_by_count_and_flushes_the_remainder() {
    assert_eq!(Signal::from_iter(1..=5).buffer(2).to_vec(), vec![vec![1, 2], vec![3, 4], vec![5]]);
  }

  #[test]
  fn buffer_interval_slides_a_window() {
    assert_eq!(Signal::from_iter(1..=5).buffer_interval(3, 1).to_vec(), vec![
      vec![1, 2, 3],
      vec![2, 3, 4],
      vec![3, 4, 5]
    ]);
  }

  #[test]
  fn buffer_time_batches_per_window() {
    let scheduler = TestScheduler::new();
    let subject = Signaling::new();
    let batches = Arc::new(Mutex::new(vec![]));
    let sink = batches.clone();
    subject
      .expose()
      .buffer_time_on(Duration::from_millis(10), scheduler.clone())
      .to(move |batch| sink.lock().unwrap().push(batch));

    subject.accept(1);
    subject.accept(2);
    scheduler.advance_by(Duration::from_millis(10));
    subject.accept(3);
    scheduler.advance_by(Duration::from_millis(10));
    // An empty window emits nothing.
    scheduler.advance_by(Duration::from_millis(10));

    assert_eq!(*batches.lock().unwrap(), vec![vec![1, 2], vec![3]]);
  }
}
