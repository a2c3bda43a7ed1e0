//! The observer protocol: the three-method sink every pipeline stage speaks.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use crate::{
  disposable::Disposable,
  fault::{report_uncaught, Fault},
};

// ============================================================================
// Observer
// ============================================================================

/// The consumer side of a subscription.
///
/// Methods take `&self`: one observer may be shared between an upstream
/// producer and a scheduler worker, so implementations keep their mutable
/// state behind their own locks or atomics.
pub trait Observer<T>: Send + Sync {
  /// Receive the next value.
  fn accept(&self, value: T);

  /// Receive a terminal failure. No further events follow.
  fn error(&self, fault: Fault);

  /// Receive successful completion. No further events follow.
  fn complete(&self);
}

/// How observers travel through the engine: shared, type-erased.
pub type SharedObserver<T> = Arc<dyn Observer<T>>;

// ============================================================================
// Subscriber — closure-assembled observer
// ============================================================================

/// An observer assembled from optional closures, with an optional downstream
/// observer as fallback for the channels a decorator leaves untouched.
///
/// This is the workhorse behind both the operator library and the `to`
/// family: most decorators override one or two channels and forward the rest.
pub(crate) struct Subscriber<T> {
  pub next: Option<Box<dyn Fn(T) + Send + Sync>>,
  pub fault: Option<Box<dyn Fn(Fault) + Send + Sync>>,
  pub done: Option<Box<dyn Fn() + Send + Sync>>,
  pub fallback: Option<SharedObserver<T>>,
}

impl<T> Default for Subscriber<T> {
  fn default() -> Self { Self { next: None, fault: None, done: None, fallback: None } }
}

impl<T> Subscriber<T> {
  /// A subscriber that forwards every channel to `downstream`.
  pub fn forward(downstream: SharedObserver<T>) -> Self {
    Self { fallback: Some(downstream), ..Self::default() }
  }

  /// A subscriber with a custom value channel that forwards terminal events
  /// to a downstream observer of a possibly different item type — the shape
  /// of most transforming decorators.
  pub fn relay<R: 'static>(
    downstream: &SharedObserver<R>, next: impl Fn(T) + Send + Sync + 'static,
  ) -> Self {
    let errors = downstream.clone();
    let completions = downstream.clone();
    Self::default()
      .on_next(next)
      .on_error(move |fault| errors.error(fault))
      .on_complete(move || completions.complete())
  }

  pub fn on_next(mut self, f: impl Fn(T) + Send + Sync + 'static) -> Self {
    self.next = Some(Box::new(f));
    self
  }

  pub fn on_error(mut self, f: impl Fn(Fault) + Send + Sync + 'static) -> Self {
    self.fault = Some(Box::new(f));
    self
  }

  pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
    self.done = Some(Box::new(f));
    self
  }

  pub fn into_shared(self) -> SharedObserver<T>
  where
    T: Send + Sync + 'static,
  {
    Arc::new(self)
  }
}

impl<T: Send + Sync> Observer<T> for Subscriber<T> {
  fn accept(&self, value: T) {
    match (&self.next, &self.fallback) {
      (Some(next), _) => next(value),
      (None, Some(observer)) => observer.accept(value),
      (None, None) => {}
    }
  }

  fn error(&self, fault: Fault) {
    match (&self.fault, &self.fallback) {
      (Some(handler), _) => handler(fault),
      (None, Some(observer)) => observer.error(fault),
      (None, None) => report_uncaught(&fault),
    }
  }

  fn complete(&self) {
    match (&self.done, &self.fallback) {
      (Some(done), _) => done(),
      (None, Some(observer)) => observer.complete(),
      (None, None) => {}
    }
  }
}

// ============================================================================
// Gate — terminal-event enforcement at every decorator boundary
// ============================================================================

/// Wraps a downstream observer with the subscription state machine: after the
/// first terminal event, or after external disposal, nothing further passes.
///
/// Every `Signal` boundary installs one of these, so the guarantee holds even
/// against upstream producers that misbehave (duplicate `complete()` calls, a
/// value emitted after an error), not just against well-behaved operators.
pub(crate) struct Gate<T> {
  inner: SharedObserver<T>,
  disposer: Disposable,
  terminated: AtomicBool,
}

impl<T> Gate<T> {
  pub fn guard(inner: SharedObserver<T>, disposer: Disposable) -> Self {
    Self { inner, disposer, terminated: AtomicBool::new(false) }
  }
}

impl<T: Send + Sync> Observer<T> for Gate<T> {
  fn accept(&self, value: T) {
    if !self.terminated.load(Ordering::SeqCst) && !self.disposer.is_disposed() {
      self.inner.accept(value);
    }
  }

  fn error(&self, fault: Fault) {
    if !self.terminated.swap(true, Ordering::SeqCst) && !self.disposer.is_disposed() {
      self.inner.error(fault);
    }
  }

  fn complete(&self) {
    if !self.terminated.swap(true, Ordering::SeqCst) && !self.disposer.is_disposed() {
      self.inner.complete();
    }
  }
}
