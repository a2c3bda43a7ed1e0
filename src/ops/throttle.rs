//! Rate limiting: first value in a window wins.

use std::{
  sync::{Arc, Mutex},
  time::{Duration, Instant},
};

use crate::{
  observer::Subscriber,
  scheduler::{default_scheduler, SharedScheduler},
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Emit the first value of each window immediately and drop the rest of
  /// the window. Zero window: pass-through.
  pub fn throttle(&self, window: Duration) -> Signal<T> {
    self.throttle_on(window, default_scheduler())
  }

  /// `throttle` on an explicit scheduler (whose clock defines the windows).
  pub fn throttle_on(&self, window: Duration, scheduler: SharedScheduler) -> Signal<T> {
    if window.is_zero() {
      return self.clone();
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let last: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
      let scheduler = scheduler.clone();
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value| {
        let now = scheduler.now();
        let open = {
          let mut slot = last.lock().unwrap();
          match *slot {
            Some(at) if now.duration_since(at) < window => false,
            _ => {
              *slot = Some(now);
              true
            }
          }
        };
        if open {
          downstream.accept(value);
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}
