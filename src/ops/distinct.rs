//! De-duplication operators. State is allocated per subscription, never at
//! construction, so the same chain is reusable.

use std::{
  collections::HashSet,
  hash::Hash,
  sync::{Arc, Mutex},
};

use crate::{
  observer::Subscriber,
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Forward each value only the first time it is seen.
  pub fn distinct(&self) -> Signal<T>
  where
    T: Eq + Hash,
  {
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let seen = Mutex::new(HashSet::new());
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value: T| {
        if seen.lock().unwrap().insert(value.clone()) {
          downstream.accept(value);
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Forward a value only when it differs from its immediate predecessor.
  pub fn diff(&self) -> Signal<T>
  where
    T: PartialEq,
  {
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let previous: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value: T| {
        let mut slot = previous.lock().unwrap();
        if slot.as_ref() != Some(&value) {
          *slot = Some(value.clone());
          drop(slot);
          downstream.accept(value);
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// The first value only.
  pub fn first(&self) -> Signal<T> { self.take(1) }
}
