//! The declarative pipeline node.
//!
//! A [`Signal<T>`] wraps a subscribe function and nothing else: building a
//! pipeline allocates closures, never subscriptions. All work happens when a
//! terminal `to*` call walks the chain, wiring one decorating observer per
//! operator from source to sink and returning a single composed
//! [`Disposable`] for the whole running pipeline. Signals are cold — every
//! terminal call re-runs the subscribe function — unless a sharing operator
//! multiplexes them.

use std::{
  collections::{HashMap, HashSet},
  hash::Hash,
  panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
  sync::{Arc, Mutex},
  time::Duration,
};

use crate::{
  disposable::Disposable,
  fault::{fault_from_panic, guarded, report_uncaught, Fault},
  observer::{Gate, Observer, SharedObserver},
  scheduler::{default_scheduler, SharedScheduler},
  variable::Variable,
};

/// Blanket bound for values flowing through a pipeline: multicast fan-out and
/// latest-value slots need `Clone`, scheduler hops need `Send + Sync`.
pub trait Flow: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Flow for T {}

type SubscribeFn<T> = dyn Fn(SharedObserver<T>, Disposable) -> Disposable + Send + Sync;

/// A representation of any set of values over any amount of time.
pub struct Signal<T> {
  subscriber: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Signal<T> {
  fn clone(&self) -> Self { Self { subscriber: self.subscriber.clone() } }
}

// ============================================================================
// Construction
// ============================================================================

impl<T: Flow> Signal<T> {
  /// Create a `Signal` from its subscribe function. The function is invoked
  /// once per terminal call; it must register the observer with whatever
  /// producer it wraps and return a disposable releasing that registration.
  ///
  /// The observer handed to the function is already guarded: duplicate
  /// terminal events and post-disposal events are swallowed here, so even a
  /// deliberately misbehaving producer cannot break the downstream contract.
  pub fn new(
    subscribe: impl Fn(SharedObserver<T>, Disposable) -> Disposable + Send + Sync + 'static,
  ) -> Self {
    Self { subscriber: Arc::new(subscribe) }
  }

  /// A signal that completes immediately.
  pub fn empty() -> Self {
    Signal::new(|observer, disposer| {
      observer.complete();
      disposer
    })
  }

  /// A signal that never emits and never terminates.
  pub fn never() -> Self { Signal::new(|_, disposer| disposer) }

  /// A signal that fails immediately.
  pub fn fail(fault: Fault) -> Self {
    Signal::new(move |observer, disposer| {
      observer.error(fault.clone());
      disposer
    })
  }

  /// A single value, then completion.
  pub fn of(value: T) -> Self {
    Signal::new(move |observer, disposer| {
      observer.accept(value.clone());
      observer.complete();
      disposer
    })
  }

  /// Emit every item of `values`, then complete. Emission stops early when
  /// the subscription is disposed mid-iteration (`take` and friends rely on
  /// this).
  pub fn from_iter<I>(values: I) -> Self
  where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
  {
    Signal::new(move |observer, disposer| {
      for value in values.clone() {
        if disposer.is_disposed() {
          return disposer;
        }
        observer.accept(value);
      }
      observer.complete();
      disposer
    })
  }

  /// Defer source creation until subscription time.
  pub fn defer(factory: impl Fn() -> Signal<T> + Send + Sync + 'static) -> Self {
    Signal::new(move |observer, disposer| {
      let source = match guarded(&factory) {
        Ok(source) => source,
        Err(fault) => {
          observer.error(fault);
          return disposer;
        }
      };
      source.subscribe_raw(observer, disposer)
    })
  }
}

impl Signal<u64> {
  /// Emit `0, 1, 2, …` on the default scheduler: the first value after
  /// `initial`, each subsequent one `period` later.
  pub fn interval(initial: Duration, period: Duration) -> Self {
    Self::interval_on(initial, period, default_scheduler())
  }

  /// `interval` on an explicit scheduler. Ticks are re-scheduled one at a
  /// time, never stacked, so disposal between ticks cancels cleanly.
  pub fn interval_on(initial: Duration, period: Duration, scheduler: SharedScheduler) -> Self {
    Signal::new(move |observer, disposer| {
      let slot: Arc<Mutex<Option<Disposable>>> = Arc::new(Mutex::new(None));
      {
        let slot = slot.clone();
        disposer.add_action(move || {
          if let Some(handle) = slot.lock().unwrap().take() {
            handle.dispose();
          }
        });
      }
      tick(0, initial, period, scheduler.clone(), observer, disposer.clone(), slot);
      disposer
    })
  }
}

fn tick(
  n: u64, delay: Duration, period: Duration, scheduler: SharedScheduler,
  observer: SharedObserver<u64>, disposer: Disposable, slot: Arc<Mutex<Option<Disposable>>>,
) {
  let chain = scheduler.clone();
  let next_slot = slot.clone();
  let handle = scheduler.schedule(
    delay,
    Box::new(move || {
      if disposer.is_disposed() {
        return;
      }
      observer.accept(n);
      tick(n + 1, period, period, chain, observer, disposer, next_slot);
    }),
  );
  *slot.lock().unwrap() = Some(handle);
}

// ============================================================================
// Subscription protocol
// ============================================================================

impl<T: Flow> Signal<T> {
  /// Wire `observer` into this signal under `disposer`. Every boundary wraps
  /// the observer in a fresh gate; a panicking subscribe function is
  /// converted into an error on the observer rather than unwinding.
  pub(crate) fn subscribe_raw(
    &self, observer: SharedObserver<T>, disposer: Disposable,
  ) -> Disposable {
    let gate: SharedObserver<T> = Arc::new(Gate::guard(observer, disposer.clone()));
    match guarded(|| (self.subscriber)(gate.clone(), disposer.clone())) {
      Ok(result) => result,
      Err(fault) => {
        gate.error(fault);
        disposer
      }
    }
  }

  /// Subscribe with a value callback. Errors reaching this subscription go
  /// to the process-wide uncaught sink.
  pub fn to(&self, next: impl Fn(T) + Send + Sync + 'static) -> Disposable {
    self.terminal(Terminal {
      next: Some(Box::new(next)),
      fault: None,
      done: None,
      delegate: None,
      disposer: Disposable::empty(),
    })
  }

  /// Subscribe with callbacks for all three channels.
  pub fn to_all(
    &self, next: impl Fn(T) + Send + Sync + 'static, error: impl Fn(Fault) + Send + Sync + 'static,
    complete: impl Fn() + Send + Sync + 'static,
  ) -> Disposable {
    self.terminal(Terminal {
      next: Some(Box::new(next)),
      fault: Some(Box::new(error)),
      done: Some(Box::new(complete)),
      delegate: None,
      disposer: Disposable::empty(),
    })
  }

  /// Subscribe an explicit observer.
  pub fn to_observer(&self, observer: SharedObserver<T>) -> Disposable {
    self.terminal(Terminal {
      next: None,
      fault: None,
      done: None,
      delegate: Some(observer),
      disposer: Disposable::empty(),
    })
  }

  fn terminal(&self, mut terminal: Terminal<T>) -> Disposable {
    let disposer = Disposable::empty();
    terminal.disposer = disposer.clone();
    let result = self.subscribe_raw(Arc::new(terminal), disposer.clone());
    disposer.add(result);
    disposer
  }
}

/// The sink at the end of a pipeline: invokes the consumer callbacks, owns
/// the terminal-implies-disposed rule, and feeds the uncaught sink.
struct Terminal<T> {
  next: Option<Box<dyn Fn(T) + Send + Sync>>,
  fault: Option<Box<dyn Fn(Fault) + Send + Sync>>,
  done: Option<Box<dyn Fn() + Send + Sync>>,
  delegate: Option<SharedObserver<T>>,
  disposer: Disposable,
}

impl<T: Flow> Observer<T> for Terminal<T> {
  fn accept(&self, value: T) {
    // A throwing consumer is not interceptable by the pipeline: report it,
    // then rethrow on the delivering thread.
    let outcome = catch_unwind(AssertUnwindSafe(|| match (&self.next, &self.delegate) {
      (Some(next), _) => next(value),
      (None, Some(observer)) => observer.accept(value),
      (None, None) => {}
    }));
    if let Err(payload) = outcome {
      report_uncaught(&fault_from_panic(payload.as_ref()));
      resume_unwind(payload);
    }
  }

  fn error(&self, fault: Fault) {
    match (&self.fault, &self.delegate) {
      (Some(handler), _) => handler(fault),
      (None, Some(observer)) => observer.error(fault),
      (None, None) => report_uncaught(&fault),
    }
    self.disposer.dispose();
  }

  fn complete(&self) {
    match (&self.done, &self.delegate) {
      (Some(done), _) => done(),
      (None, Some(observer)) => observer.complete(),
      (None, None) => {}
    }
    self.disposer.dispose();
  }
}

// ============================================================================
// Collectors
// ============================================================================

impl<T: Flow> Signal<T> {
  /// Collect everything the pipeline delivers synchronously during
  /// subscription into a `Vec`, then release the subscription.
  pub fn to_vec(&self) -> Vec<T> {
    let list = Arc::new(Mutex::new(Vec::new()));
    let sink = list.clone();
    let subscription = self.to(move |value| sink.lock().unwrap().push(value));
    subscription.dispose();
    let snapshot = list.lock().unwrap().clone();
    snapshot
  }

  /// Collect into a set.
  pub fn to_set(&self) -> HashSet<T>
  where
    T: Eq + Hash,
  {
    self.to_vec().into_iter().collect()
  }

  /// Collect into a map keyed by `key`; a later value with the same key wins.
  pub fn to_map<K>(&self, key: impl Fn(&T) -> K + Send + Sync + 'static) -> HashMap<K, T>
  where
    K: Eq + Hash + Send + 'static,
  {
    self.to_vec().into_iter().map(|v| (key(&v), v)).collect()
  }

  /// Collect into a map with derived keys and values.
  pub fn to_map_pairs<K, V>(
    &self, key: impl Fn(&T) -> K + Send + Sync + 'static,
    value: impl Fn(&T) -> V + Send + Sync + 'static,
  ) -> HashMap<K, V>
  where
    K: Eq + Hash + Send + 'static,
  {
    self.to_vec().into_iter().map(|v| (key(&v), value(&v))).collect()
  }

  /// Group values by key, preserving per-group arrival order.
  pub fn to_group<K>(&self, key: impl Fn(&T) -> K + Send + Sync + 'static) -> HashMap<K, Vec<T>>
  where
    K: Eq + Hash + Send + 'static,
  {
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    for value in self.to_vec() {
      groups.entry(key(&value)).or_default().push(value);
    }
    groups
  }

  /// Fold the synchronously delivered values into an accumulator.
  pub fn to_fold<A>(&self, init: A, fold: impl Fn(A, T) -> A + Send + Sync + 'static) -> A
  where
    A: Send + 'static,
  {
    let acc = Arc::new(Mutex::new(Some(init)));
    let sink = acc.clone();
    let subscription = self.to(move |value| {
      let mut slot = sink.lock().unwrap();
      if let Some(current) = slot.take() {
        *slot = Some(fold(current, value));
      }
    });
    subscription.dispose();
    let result = acc.lock().unwrap().take();
    result.expect("fold accumulator vanished")
  }

  /// Receive values into a [`Variable`] cell that keeps tracking the stream.
  pub fn to_variable(&self) -> Variable<T> {
    let variable = Variable::empty();
    let cell = variable.clone();
    self.to(move |value| cell.set(value));
    variable
  }
}

// ============================================================================
// Tests
// ============================================================================
