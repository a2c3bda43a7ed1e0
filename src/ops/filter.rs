//! Filtering and windowing: skip/take by predicate, count, value set and
//! companion signal.

use std::{
  collections::HashSet,
  hash::Hash,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
};

use crate::{
  fault::guarded,
  observer::Subscriber,
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Keep only the values matching `predicate`.
  pub fn filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Signal<T> {
    let source = self.clone();
    let predicate = Arc::new(predicate);
    Signal::new(move |observer, disposer| {
      let predicate = predicate.clone();
      let downstream = observer.clone();
      let upstream =
        Subscriber::relay(&observer, move |value: T| match guarded(|| predicate(&value)) {
          Ok(true) => downstream.accept(value),
          Ok(false) => {}
          Err(fault) => downstream.error(fault),
        })
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Drop the values matching `predicate`.
  pub fn skip_by(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Signal<T> {
    self.filter(move |value| !predicate(value))
  }

  /// Drop any value contained in `excludes`.
  pub fn skip_values(&self, excludes: impl IntoIterator<Item = T>) -> Signal<T>
  where
    T: Eq + Hash,
  {
    let excludes: Arc<HashSet<T>> = Arc::new(excludes.into_iter().collect());
    self.skip_by(move |value| excludes.contains(value))
  }

  /// Forward exactly the first `count` values, then complete and dispose the
  /// subscription; later upstream emissions are ignored without fuss.
  /// `take(0)` completes immediately without touching the upstream.
  pub fn take(&self, count: usize) -> Signal<T> {
    if count == 0 {
      return Signal::new(|observer, disposer| {
        observer.complete();
        disposer
      });
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let remaining = Arc::new(AtomicUsize::new(count));
      let downstream = observer.clone();
      let root = disposer.clone();
      let upstream = Subscriber::relay(&observer, move |value| {
        let taken =
          remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if let Ok(previous) = taken {
          downstream.accept(value);
          if previous == 1 {
            downstream.complete();
            root.dispose();
          }
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Drop the first `count` values.
  pub fn skip(&self, count: usize) -> Signal<T> {
    if count == 0 {
      return self.clone();
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let seen = AtomicUsize::new(0);
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value| {
        if seen.fetch_add(1, Ordering::SeqCst) >= count {
          downstream.accept(value);
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Forward values while `predicate` holds; the first failing value
  /// completes the stream without being emitted.
  pub fn take_while(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Signal<T> {
    let source = self.clone();
    let predicate = Arc::new(predicate);
    Signal::new(move |observer, disposer| {
      let predicate = predicate.clone();
      let downstream = observer.clone();
      let root = disposer.clone();
      let upstream =
        Subscriber::relay(&observer, move |value: T| match guarded(|| predicate(&value)) {
          Ok(true) => downstream.accept(value),
          Ok(false) => {
            downstream.complete();
            root.dispose();
          }
          Err(fault) => downstream.error(fault),
        })
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Forward values up to and including the first one equal to `stop`, then
  /// complete.
  pub fn take_until_value(&self, stop: T) -> Signal<T>
  where
    T: PartialEq,
  {
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let stop = stop.clone();
      let downstream = observer.clone();
      let root = disposer.clone();
      let upstream = Subscriber::relay(&observer, move |value: T| {
        let last = value == stop;
        downstream.accept(value);
        if last {
          downstream.complete();
          root.dispose();
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Drop values while `predicate` holds; from the first failing value on,
  /// everything passes.
  pub fn skip_while(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Signal<T> {
    let source = self.clone();
    let predicate = Arc::new(predicate);
    Signal::new(move |observer, disposer| {
      let open = AtomicBool::new(false);
      let predicate = predicate.clone();
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value: T| {
        if open.load(Ordering::SeqCst) {
          return downstream.accept(value);
        }
        match guarded(|| predicate(&value)) {
          Ok(true) => {}
          Ok(false) => {
            open.store(true, Ordering::SeqCst);
            downstream.accept(value);
          }
          Err(fault) => downstream.error(fault),
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Forward values until `stopper` emits, then complete and dispose.
  /// An error on `stopper` is a terminal error here too.
  pub fn take_until<U: Flow>(&self, stopper: &Signal<U>) -> Signal<T> {
    let source = self.clone();
    let stopper = stopper.clone();
    Signal::new(move |observer, disposer| {
      let stop_disposer = disposer.sub();
      let downstream = observer.clone();
      let root = disposer.clone();
      let stop = Subscriber::default()
        .on_next(move |_: U| {
          downstream.complete();
          root.dispose();
        })
        .on_error({
          let downstream = observer.clone();
          let root = disposer.clone();
          move |fault| {
            downstream.error(fault);
            root.dispose();
          }
        })
        .into_shared();
      stopper.subscribe_raw(stop, stop_disposer);

      source.subscribe_raw(Subscriber::forward(observer).into_shared(), disposer)
    })
  }

  /// Ignore values until `opener` emits once; from then on, everything
  /// passes.
  pub fn skip_until<U: Flow>(&self, opener: &Signal<U>) -> Signal<T> {
    let source = self.clone();
    let opener = opener.clone();
    Signal::new(move |observer, disposer| {
      let open = Arc::new(AtomicBool::new(false));
      let open_disposer = disposer.sub();
      {
        let open = open.clone();
        let release = open_disposer.clone();
        let downstream = observer.clone();
        let unlock = Subscriber::default()
          .on_next(move |_: U| {
            open.store(true, Ordering::SeqCst);
            release.dispose();
          })
          .on_error(move |fault| downstream.error(fault))
          .into_shared();
        opener.subscribe_raw(unlock, open_disposer);
      }

      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value| {
        if open.load(Ordering::SeqCst) {
          downstream.accept(value);
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Gate values by the latest emission of a boolean companion signal.
  pub fn gate(&self, condition: &Signal<bool>, initially_open: bool) -> Signal<T> {
    let source = self.clone();
    let condition = condition.clone();
    Signal::new(move |observer, disposer| {
      let open = Arc::new(AtomicBool::new(initially_open));
      {
        let open = open.clone();
        let downstream = observer.clone();
        let toggle = Subscriber::default()
          .on_next(move |state| open.store(state, Ordering::SeqCst))
          .on_error(move |fault| downstream.error(fault))
          .into_shared();
        condition.subscribe_raw(toggle, disposer.sub());
      }

      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value| {
        if open.load(Ordering::SeqCst) {
          downstream.accept(value);
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}
