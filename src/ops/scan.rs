//! Running accumulation.

use std::sync::{Arc, Mutex};

use crate::{
  fault::guarded,
  observer::Subscriber,
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Fold values into a running accumulator, emitting every intermediate
  /// state. The accumulator starts at `init` per subscription.
  pub fn scan<R: Flow>(
    &self, init: R, fold: impl Fn(R, T) -> R + Send + Sync + 'static,
  ) -> Signal<R> {
    let source = self.clone();
    let fold = Arc::new(fold);
    Signal::new(move |observer, disposer| {
      let acc = Mutex::new(init.clone());
      let fold = fold.clone();
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value| {
        let current = acc.lock().unwrap().clone();
        match guarded(|| fold(current, value)) {
          Ok(next) => {
            *acc.lock().unwrap() = next.clone();
            downstream.accept(next);
          }
          Err(fault) => downstream.error(fault),
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Alternate `true`/`false` per value, starting with `true`.
  pub fn toggle(&self) -> Signal<bool> { self.scan(false, |state, _| !state) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scan_emits_every_intermediate_state() {
    assert_eq!(Signal::from_iter(1..=4).scan(0, |acc, v| acc + v).to_vec(), vec![1, 3, 6, 10]);
  }

  #[test]
  fn scan_restarts_per_subscription() {
    let summed = Signal::from_iter(1..=3).scan(0, |acc, v| acc + v);
    assert_eq!(summed.to_vec(), vec![1, 3, 6]);
    assert_eq!(summed.to_vec(), vec![1, 3, 6]);
  }

  #[test]
  fn toggle_alternates_from_true() {
    assert_eq!(Signal::from_iter(0..4).toggle().to_vec(), vec![true, false, true, false]);
  }
}
