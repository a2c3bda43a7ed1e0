//! Synchronous transformation operators.

use std::sync::Arc;

use crate::{
  fault::guarded,
  observer::Subscriber,
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Transform each value with `f`. A panicking `f` terminates the
  /// subscription through the error channel; no partial result is emitted.
  pub fn map<R: Flow>(&self, f: impl Fn(T) -> R + Send + Sync + 'static) -> Signal<R> {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let f = f.clone();
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value| match guarded(|| f(value)) {
        Ok(mapped) => downstream.accept(mapped),
        Err(fault) => downstream.error(fault),
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Replace every value with a constant.
  pub fn map_to<R: Flow>(&self, constant: R) -> Signal<R> {
    self.map(move |_| constant.clone())
  }

  /// Project each value through a predicate.
  pub fn is(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Signal<bool> {
    self.map(move |value| predicate(&value))
  }

  /// Expand each value into zero or more values emitted synchronously, in
  /// iteration order. This is the synchronous 1:N cousin of `flat_map`.
  pub fn flat_iter<R: Flow, I>(&self, f: impl Fn(T) -> I + Send + Sync + 'static) -> Signal<R>
  where
    I: IntoIterator<Item = R>,
  {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let f = f.clone();
      let downstream = observer.clone();
      let gate = disposer.clone();
      let upstream = Subscriber::relay(&observer, move |value| match guarded(|| f(value)) {
        Ok(expansion) => {
          for item in expansion {
            if gate.is_disposed() {
              return;
            }
            downstream.accept(item);
          }
        }
        Err(fault) => downstream.error(fault),
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::fault::Fault;

  #[test]
  fn map_transforms_each_value() {
    assert_eq!(Signal::from_iter(1..=3).map(|v| v * 10).to_vec(), vec![10, 20, 30]);
  }

  #[test]
  fn map_is_reusable_across_subscriptions() {
    let doubled = Signal::from_iter(1..=3).map(|v| v * 2);
    assert_eq!(doubled.to_vec(), vec![2, 4, 6]);
    assert_eq!(doubled.to_vec(), vec![2, 4, 6]);
  }

  #[test]
  fn throwing_mapper_becomes_a_terminal_error() {
    let outcome = Arc::new(Mutex::new(vec![]));
    let (values, errors) = (outcome.clone(), outcome.clone());
    Signal::from_iter(1..=3)
      .map(|v| if v == 2 { panic!("bad value") } else { v })
      .to_all(
        move |v| values.lock().unwrap().push(format!("v{v}")),
        move |fault: Fault| errors.lock().unwrap().push(format!("e:{fault}")),
        || {},
      );
    assert_eq!(*outcome.lock().unwrap(), vec!["v1", "e:bad value"]);
  }

  #[test]
  fn map_to_replaces_values() {
    assert_eq!(Signal::from_iter(1..=3).map_to("x").to_vec(), vec!["x", "x", "x"]);
  }

  #[test]
  fn is_projects_through_predicate() {
    assert_eq!(
      Signal::from_iter(1..=4).is(|v| v % 2 == 0).to_vec(),
      vec![false, true, false, true]
    );
  }

  #[test]
  fn flat_iter_expands_in_order() {
    assert_eq!(
      Signal::from_iter(vec![1, 3]).flat_iter(|v| vec![v, v + 1]).to_vec(),
      vec![1, 2, 3, 4]
    );
  }

  #[test]
  fn flat_iter_respects_disposal_mid_expansion() {
    assert_eq!(Signal::of(0).flat_iter(|_| 0..100).take(3).to_vec(), vec![0, 1, 2]);
  }
}
