//! Side-effect taps on the four channels of a subscription.

use std::sync::Arc;

use crate::{
  fault::{guarded, Fault},
  observer::Subscriber,
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Observe each value as it passes. A panicking effect terminates the
  /// subscription through the error channel, like any operator function.
  pub fn effect(&self, effect: impl Fn(&T) + Send + Sync + 'static) -> Signal<T> {
    let source = self.clone();
    let effect = Arc::new(effect);
    Signal::new(move |observer, disposer| {
      let effect = effect.clone();
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value: T| match guarded(|| effect(&value)) {
        Ok(()) => downstream.accept(value),
        Err(fault) => downstream.error(fault),
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Observe a terminal error as it passes.
  pub fn effect_on_error(&self, effect: impl Fn(&Fault) + Send + Sync + 'static) -> Signal<T> {
    let source = self.clone();
    let effect = Arc::new(effect);
    Signal::new(move |observer, disposer| {
      let effect = effect.clone();
      let downstream = observer.clone();
      let upstream = Subscriber::forward(observer)
        .on_error(move |fault| {
          effect(&fault);
          downstream.error(fault);
        })
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Observe completion as it passes.
  pub fn effect_on_complete(&self, effect: impl Fn() + Send + Sync + 'static) -> Signal<T> {
    let source = self.clone();
    let effect = Arc::new(effect);
    Signal::new(move |observer, disposer| {
      let effect = effect.clone();
      let downstream = observer.clone();
      let upstream = Subscriber::forward(observer)
        .on_complete(move || {
          effect();
          downstream.complete();
        })
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Run `effect` when this subscription is disposed, terminal events
  /// included (a terminal subscription disposes itself).
  pub fn effect_on_dispose(&self, effect: impl Fn() + Send + Sync + 'static) -> Signal<T> {
    let source = self.clone();
    let effect = Arc::new(effect);
    Signal::new(move |observer, disposer| {
      let effect = effect.clone();
      disposer.add_action(move || effect());
      source.subscribe_raw(Subscriber::forward(observer).into_shared(), disposer)
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
  };

  use super::*;

  #[test]
  fn effect_observes_without_consuming() {
    let seen = Arc::new(Mutex::new(vec![]));
    let tap = seen.clone();
    let values = Signal::from_iter(1..=3).effect(move |v| tap.lock().unwrap().push(*v)).to_vec();
    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
  }

  #[test]
  fn effect_on_error_taps_the_failure() {
    let seen = Arc::new(Mutex::new(vec![]));
    let tap = seen.clone();
    Signal::<i32>::fail(Fault::msg("boom"))
      .effect_on_error(move |fault| tap.lock().unwrap().push(fault.to_string()))
      .to_all(|_| {}, |_| {}, || {});
    assert_eq!(*seen.lock().unwrap(), vec!["boom"]);
  }

  #[test]
  fn effect_on_complete_and_dispose_fire_once() {
    let completes = Arc::new(AtomicUsize::new(0));
    let disposals = Arc::new(AtomicUsize::new(0));
    let (c, d) = (completes.clone(), disposals.clone());
    let subscription = Signal::from_iter(1..=2)
      .effect_on_complete(move || {
        c.fetch_add(1, Ordering::SeqCst);
      })
      .effect_on_dispose(move || {
        d.fetch_add(1, Ordering::SeqCst);
      })
      .to(|_| {});
    subscription.dispose();

    assert_eq!(completes.load(Ordering::SeqCst), 1);
    assert_eq!(disposals.load(Ordering::SeqCst), 1);
  }
}
