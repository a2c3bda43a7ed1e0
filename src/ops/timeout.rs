//! Failing a silent subscription.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use crate::{
  disposable::Disposable,
  fault::{EngineError, Fault},
  observer::{SharedObserver, Subscriber},
  scheduler::{default_scheduler, SharedScheduler},
  signal::{Flow, Signal},
};

struct TimeoutDriver<T> {
  slot: Mutex<Option<Disposable>>,
  downstream: SharedObserver<T>,
  root: Disposable,
  scheduler: SharedScheduler,
  window: Duration,
}

impl<T: Flow> TimeoutDriver<T> {
  fn arm(self: Arc<Self>) {
    let driver = self.clone();
    let handle = self.scheduler.schedule(
      self.window,
      Box::new(move || {
        driver.downstream.error(Fault::new(EngineError::Timeout(driver.window)));
        driver.root.dispose();
      }),
    );
    if let Some(previous) = self.slot.lock().unwrap().replace(handle) {
      previous.dispose();
    }
  }

  fn disarm(&self) {
    if let Some(handle) = self.slot.lock().unwrap().take() {
      handle.dispose();
    }
  }
}

impl<T: Flow> Signal<T> {
  /// Error with [`EngineError::Timeout`] if no value arrives within
  /// `window`; every value resets the window. Zero window: pass-through.
  pub fn timeout(&self, window: Duration) -> Signal<T> {
    self.timeout_on(window, default_scheduler())
  }

  /// `timeout` on an explicit scheduler.
  pub fn timeout_on(&self, window: Duration, scheduler: SharedScheduler) -> Signal<T> {
    if window.is_zero() {
      return self.clone();
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let driver = Arc::new(TimeoutDriver {
        slot: Mutex::new(None),
        downstream: observer.clone(),
        root: disposer.clone(),
        scheduler: scheduler.clone(),
        window,
      });
      {
        let driver = driver.clone();
        disposer.add_action(move || driver.disarm());
      }
      driver.clone().arm();

      let values = driver.clone();
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value| {
        values.clone().arm();
        downstream.accept(value);
      })
      .on_error({
        let driver = driver.clone();
        let downstream = observer.clone();
        move |fault| {
          driver.disarm();
          downstream.error(fault);
        }
      })
      .on_complete({
        let downstream = observer.clone();
        move || {
          driver.disarm();
          downstream.complete();
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}
