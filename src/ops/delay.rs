//! Time-shifted re-emission with preserved order.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use crate::{
  disposable::Disposable,
  fault::Fault,
  observer::{SharedObserver, Subscriber},
  scheduler::{default_scheduler, SharedScheduler},
  signal::{Flow, Signal},
};

enum Delayed<T> {
  Value(T),
  Done,
}

enum Next<T> {
  Emit(Delayed<T>),
  Rearm(Duration),
  Idle,
}

/// Pending events wait in one queue served by one timer, re-armed
/// sequentially: a later value can never overtake an earlier one even when
/// their delays overlap.
struct DelayDriver<T> {
  state: Mutex<DelayState<T>>,
  downstream: SharedObserver<T>,
  disposer: Disposable,
  scheduler: SharedScheduler,
  delay: Duration,
}

struct DelayState<T> {
  queue: VecDeque<(Delayed<T>, Instant)>,
  timer: Option<Disposable>,
}

impl<T: Flow> DelayDriver<T> {
  fn push(self: Arc<Self>, event: Delayed<T>) {
    let due = self.scheduler.now() + self.delay;
    let wait = self.delay;
    let arm = {
      let mut s = self.state.lock().unwrap();
      s.queue.push_back((event, due));
      s.timer.is_none()
    };
    if arm {
      self.arm(wait);
    }
  }

  fn arm(self: Arc<Self>, wait: Duration) {
    let driver = self.clone();
    let handle = self.scheduler.schedule(wait, Box::new(move || driver.fire()));
    self.state.lock().unwrap().timer = Some(handle);
  }

  fn fire(self: Arc<Self>) {
    loop {
      if self.disposer.is_disposed() {
        return;
      }
      let next = {
        let mut s = self.state.lock().unwrap();
        let now = self.scheduler.now();
        match s.queue.front() {
          Some((_, due)) if *due <= now => Next::Emit(s.queue.pop_front().unwrap().0),
          Some((_, due)) => Next::Rearm(*due - now),
          None => {
            s.timer = None;
            Next::Idle
          }
        }
      };
      match next {
        Next::Emit(Delayed::Value(value)) => self.downstream.accept(value),
        Next::Emit(Delayed::Done) => self.downstream.complete(),
        Next::Rearm(wait) => return self.arm(wait),
        Next::Idle => return,
      }
    }
  }

  // Errors cut the line: pending values are dropped.
  fn fail(self: Arc<Self>, fault: Fault) {
    self.cancel();
    self.downstream.error(fault);
  }

  fn cancel(&self) {
    let timer = {
      let mut s = self.state.lock().unwrap();
      s.queue.clear();
      s.timer.take()
    };
    if let Some(timer) = timer {
      timer.dispose();
    }
  }
}

impl<T: Flow> Signal<T> {
  /// Re-emit each value (and the completion) after `delay`, preserving
  /// arrival order. A zero delay makes this operator a pass-through.
  pub fn delay(&self, delay: Duration) -> Signal<T> { self.delay_on(delay, default_scheduler()) }

  /// `delay` on an explicit scheduler.
  pub fn delay_on(&self, delay: Duration, scheduler: SharedScheduler) -> Signal<T> {
    if delay.is_zero() {
      return self.clone();
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let driver = Arc::new(DelayDriver {
        state: Mutex::new(DelayState { queue: VecDeque::new(), timer: None }),
        downstream: observer,
        disposer: disposer.clone(),
        scheduler: scheduler.clone(),
        delay,
      });
      {
        let driver = driver.clone();
        disposer.add_action(move || driver.cancel());
      }

      let values = driver.clone();
      let completions = driver.clone();
      let failures = driver.clone();
      let upstream = Subscriber::default()
        .on_next(move |value| values.clone().push(Delayed::Value(value)))
        .on_complete(move || completions.clone().push(Delayed::Done))
        .on_error(move |fault| failures.clone().fail(fault))
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}
