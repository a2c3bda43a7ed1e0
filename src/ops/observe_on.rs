//! Hopping delivery onto a scheduler thread.

use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
  time::Duration,
};

use crate::{
  disposable::Disposable,
  fault::Fault,
  observer::{SharedObserver, Subscriber},
  scheduler::SharedScheduler,
  signal::{Flow, Signal},
};

enum Hop<T> {
  Value(T),
  Fail(Fault),
  Done,
}

/// Events pass through one queue drained by at most one scheduled worker at
/// a time, so delivery order matches arrival order even though delivery
/// happens on scheduler threads.
struct HopDriver<T> {
  queue: Mutex<VecDeque<Hop<T>>>,
  draining: AtomicBool,
  downstream: SharedObserver<T>,
  disposer: Disposable,
  scheduler: SharedScheduler,
}

impl<T: Flow> HopDriver<T> {
  fn push(self: Arc<Self>, event: Hop<T>) {
    self.queue.lock().unwrap().push_back(event);
    if self.draining.swap(true, Ordering::SeqCst) {
      return;
    }
    let driver = self.clone();
    self.scheduler.schedule(Duration::ZERO, Box::new(move || driver.drain()));
  }

  fn drain(self: Arc<Self>) {
    loop {
      let event = self.queue.lock().unwrap().pop_front();
      match event {
        Some(Hop::Value(value)) => {
          if !self.disposer.is_disposed() {
            self.downstream.accept(value);
          }
        }
        Some(Hop::Fail(fault)) => self.downstream.error(fault),
        Some(Hop::Done) => self.downstream.complete(),
        None => {
          self.draining.store(false, Ordering::SeqCst);
          // An event may have slipped in between the empty check and the
          // flag release; reclaim the drain if so.
          if self.queue.lock().unwrap().is_empty() || self.draining.swap(true, Ordering::SeqCst) {
            return;
          }
        }
      }
    }
  }
}

impl<T: Flow> Signal<T> {
  /// Deliver every event of this signal on `scheduler`'s workers instead of
  /// the producing thread, preserving event order.
  pub fn on(&self, scheduler: SharedScheduler) -> Signal<T> {
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let driver = Arc::new(HopDriver {
        queue: Mutex::new(VecDeque::new()),
        draining: AtomicBool::new(false),
        downstream: observer,
        disposer: disposer.clone(),
        scheduler: scheduler.clone(),
      });

      let values = driver.clone();
      let completions = driver.clone();
      let failures = driver.clone();
      let upstream = Subscriber::default()
        .on_next(move |value| values.clone().push(Hop::Value(value)))
        .on_complete(move || completions.clone().push(Hop::Done))
        .on_error(move |fault| failures.clone().push(Hop::Fail(fault)))
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scheduler::TestScheduler;

  #[test]
  fn events_hop_to_the_scheduler() {
    let scheduler = TestScheduler::new();
    let log = Arc::new(Mutex::new(vec![]));
    let (values, completions) = (log.clone(), log.clone());
    Signal::from_iter(1..=3).on(scheduler.clone()).to_all(
      move |v| values.lock().unwrap().push(format!("v{v}")),
      |_| {},
      move || completions.lock().unwrap().push("done".into()),
    );

    // Nothing is delivered on the producing thread.
    assert!(log.lock().unwrap().is_empty());
    scheduler.flush();
    assert_eq!(*log.lock().unwrap(), vec!["v1", "v2", "v3", "done"]);
  }

  #[test]
  fn disposal_stops_queued_values() {
    let scheduler = TestScheduler::new();
    let values = Arc::new(Mutex::new(vec![]));
    let sink = values.clone();
    let subscription =
      Signal::from_iter(1..=3).on(scheduler.clone()).to(move |v| sink.lock().unwrap().push(v));

    subscription.dispose();
    scheduler.flush();
    assert!(values.lock().unwrap().is_empty());
  }
}
