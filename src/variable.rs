//! An observable cell bridging the object-model world into pipelines.

use std::sync::{Arc, Mutex};

use crate::{
  signal::{Flow, Signal},
  signaling::Signaling,
};

struct VarInner<T> {
  value: Mutex<Option<T>>,
  changes: Signaling<T>,
}

/// A mutable cell whose assignments are observable as a `Signal`.
///
/// `observe()` delivers future assignments only; `observing()` additionally
/// starts with the current value, which is what the property-change bridge
/// operators want.
pub struct Variable<T> {
  inner: Arc<VarInner<T>>,
}

impl<T> Clone for Variable<T> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T: Flow> Default for Variable<T> {
  fn default() -> Self { Self::empty() }
}

impl<T: Flow> Variable<T> {
  pub fn empty() -> Self {
    Self { inner: Arc::new(VarInner { value: Mutex::new(None), changes: Signaling::new() }) }
  }

  pub fn of(value: T) -> Self {
    let variable = Self::empty();
    variable.set(value);
    variable
  }

  pub fn get(&self) -> Option<T> { self.inner.value.lock().unwrap().clone() }

  pub fn is_present(&self) -> bool { self.inner.value.lock().unwrap().is_some() }

  /// Assign a new value and notify observers.
  pub fn set(&self, value: T) {
    *self.inner.value.lock().unwrap() = Some(value.clone());
    self.inner.changes.accept(value);
  }

  /// Future assignments only.
  pub fn observe(&self) -> Signal<T> { self.inner.changes.expose() }

  /// Current value (if any) followed by future assignments.
  pub fn observing(&self) -> Signal<T> {
    let cell = self.clone();
    Signal::defer(move || match cell.get() {
      Some(current) => cell.observe().start_with(current),
      None => cell.observe(),
    })
  }
}

// ============================================================================
// Property-change bridge operators
// ============================================================================

impl<T: Flow> Signal<T> {
  /// Map each value to a variable and merge every variable's value stream.
  pub fn flat_variable<R: Flow>(
    &self, f: impl Fn(T) -> Variable<R> + Send + Sync + 'static,
  ) -> Signal<R> {
    self.flat_map(move |value| f(value).observing())
  }

  /// Map each value to a variable, tracking only the most recent one: when a
  /// new outer value arrives, the previous variable's subscription is
  /// dropped before the new one is observed.
  pub fn switch_variable<R: Flow>(
    &self, f: impl Fn(T) -> Variable<R> + Send + Sync + 'static,
  ) -> Signal<R> {
    self.switch_map(move |value| f(value).observing())
  }
}
