//! Re-subscription machinery: converting a terminal channel back into a
//! running subscription, under the control of a notifier signal.
//!
//! `retry*` listens on the error channel, `repeat*` on the completion
//! channel; `recover*` (see `recover.rs`) rides the same driver. Each
//! re-subscription re-runs the entire upstream chain from scratch — side
//! effects included — and synchronous re-subscription loops are trampolined,
//! never recursive.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};

use super::Trampoline;
use crate::{
  disposable::Disposable,
  fault::Fault,
  observer::{SharedObserver, Subscriber},
  signal::{Flow, Signal},
  signaling::Signaling,
};

pub(super) enum RedoChannel {
  /// Errors feed the notifier; completion passes through.
  Error,
  /// Completions feed the notifier; errors pass through.
  Complete,
}

#[derive(Clone)]
pub(super) enum Cause {
  Failed(Fault),
  Completed,
}

pub(super) struct RedoDriver<T> {
  pub source: Signal<T>,
  pub downstream: SharedObserver<T>,
  pub disposer: Disposable,
  pub channel: RedoChannel,
  /// The terminal event currently awaiting the notifier's verdict.
  pub pending: Mutex<Option<Cause>>,
  /// Set once the notifier terminates; afterwards triggers pass through.
  pub exhausted: AtomicBool,
  pub child: Mutex<Option<Disposable>>,
  pub trampoline: Trampoline,
  /// Pushes a trigger into the notifier's input subject.
  pub feed: Box<dyn Fn(Cause) + Send + Sync>,
}

impl<T: Flow> RedoDriver<T> {
  pub fn upstream_observer(self: Arc<Self>) -> SharedObserver<T> {
    let values = self.clone();
    let failures = self.clone();
    let completions = self.clone();
    Subscriber::default()
      .on_next(move |value| values.downstream.accept(value))
      .on_error(move |fault| match failures.channel {
        RedoChannel::Error => failures.clone().trigger(Cause::Failed(fault)),
        RedoChannel::Complete => failures.downstream.error(fault),
      })
      .on_complete(move || match completions.channel {
        RedoChannel::Error => completions.downstream.complete(),
        RedoChannel::Complete => completions.clone().trigger(Cause::Completed),
      })
      .into_shared()
  }

  fn trigger(self: Arc<Self>, cause: Cause) {
    if self.exhausted.load(Ordering::SeqCst) {
      return self.emit_terminal(cause);
    }
    *self.pending.lock().unwrap() = Some(cause.clone());
    (self.feed)(cause);
  }

  fn emit_terminal(&self, cause: Cause) {
    match cause {
      Cause::Failed(fault) => self.downstream.error(fault),
      Cause::Completed => self.downstream.complete(),
    }
  }

  /// The notifier emitted: the pending terminal is forgiven, the source is
  /// re-subscribed from scratch.
  pub fn notifier_fired(self: Arc<Self>) {
    self.pending.lock().unwrap().take();
    self.resubscribe();
  }

  /// The notifier completed: no further redos. A terminal still awaiting a
  /// verdict — or the next one to arrive — propagates.
  pub fn notifier_completed(self: Arc<Self>) {
    self.exhausted.store(true, Ordering::SeqCst);
    if let Some(cause) = self.pending.lock().unwrap().take() {
      self.emit_terminal(cause);
    }
  }

  /// The notifier failed: terminal immediately.
  pub fn notifier_failed(self: Arc<Self>, fault: Fault) {
    self.exhausted.store(true, Ordering::SeqCst);
    self.pending.lock().unwrap().take();
    self.downstream.error(fault);
  }

  pub fn resubscribe(self: Arc<Self>) {
    let driver = self.clone();
    self.trampoline.bounce(move || {
      if driver.disposer.is_disposed() {
        return;
      }
      let child = driver.disposer.sub();
      if let Some(old) = driver.child.lock().unwrap().replace(child.clone()) {
        old.dispose();
      }
      driver.source.subscribe_raw(driver.clone().upstream_observer(), child);
    });
  }
}

impl<T: Flow> Signal<T> {
  /// Re-subscribe on every error, indefinitely.
  pub fn retry(&self) -> Signal<T> { self.retry_when(|faults| faults) }

  /// Re-subscribe on error at most `count` times; the next error propagates
  /// terminally. `retry_times(0)` never retries.
  pub fn retry_times(&self, count: usize) -> Signal<T> {
    self.retry_when(move |faults| faults.take(count))
  }

  /// Feed the error channel into `notifier` as a `Signal<Fault>`; each
  /// emission of the resulting signal re-subscribes the source. The
  /// notifier's `take`/filter/`delay` operators therefore control how many
  /// times, for which error kinds and with what timing retries happen.
  pub fn retry_when<R: Flow>(
    &self, notifier: impl Fn(Signal<Fault>) -> Signal<R> + Send + Sync + 'static,
  ) -> Signal<T> {
    let source = self.clone();
    let notifier = Arc::new(notifier);
    Signal::new(move |observer, disposer| {
      let faults = Signaling::<Fault>::new();
      let feed = {
        let faults = faults.clone();
        Box::new(move |cause: Cause| {
          if let Cause::Failed(fault) = cause {
            faults.accept(fault);
          }
        }) as Box<dyn Fn(Cause) + Send + Sync>
      };
      let driver = Arc::new(RedoDriver {
        source: source.clone(),
        downstream: observer.clone(),
        disposer: disposer.clone(),
        channel: RedoChannel::Error,
        pending: Mutex::new(None),
        exhausted: AtomicBool::new(false),
        child: Mutex::new(None),
        trampoline: Trampoline::new(),
        feed,
      });
      attach_notifier(&driver, notifier(faults.expose()), &disposer);
      driver.resubscribe();
      disposer
    })
  }

  /// Re-subscribe on completion, indefinitely.
  pub fn repeat(&self) -> Signal<T> { self.repeat_when(|completions| completions) }

  /// Re-subscribe on completion at most `count` times.
  pub fn repeat_times(&self, count: usize) -> Signal<T> {
    self.repeat_when(move |completions| completions.take(count))
  }

  /// Completion-channel mirror of `retry_when`.
  pub fn repeat_when<R: Flow>(
    &self, notifier: impl Fn(Signal<()>) -> Signal<R> + Send + Sync + 'static,
  ) -> Signal<T> {
    let source = self.clone();
    let notifier = Arc::new(notifier);
    Signal::new(move |observer, disposer| {
      let completions = Signaling::<()>::new();
      let feed = {
        let completions = completions.clone();
        Box::new(move |cause: Cause| {
          if let Cause::Completed = cause {
            completions.accept(());
          }
        }) as Box<dyn Fn(Cause) + Send + Sync>
      };
      let driver = Arc::new(RedoDriver {
        source: source.clone(),
        downstream: observer.clone(),
        disposer: disposer.clone(),
        channel: RedoChannel::Complete,
        pending: Mutex::new(None),
        exhausted: AtomicBool::new(false),
        child: Mutex::new(None),
        trampoline: Trampoline::new(),
        feed,
      });
      attach_notifier(&driver, notifier(completions.expose()), &disposer);
      driver.resubscribe();
      disposer
    })
  }
}

/// Wire a notifier's output signal into a driver. The notifier is subscribed
/// before the source's first subscription so synchronous terminals are
/// already under its control.
pub(super) fn attach_notifier<T: Flow, R: Flow>(
  driver: &Arc<RedoDriver<T>>, control: Signal<R>, disposer: &Disposable,
) {
  let fired = driver.clone();
  let completed = driver.clone();
  let failed = driver.clone();
  let control_observer = Subscriber::default()
    .on_next(move |_: R| fired.clone().notifier_fired())
    .on_complete(move || completed.clone().notifier_completed())
    .on_error(move |fault| failed.clone().notifier_failed(fault))
    .into_shared();
  control.subscribe_raw(control_observer, disposer.sub());
}

/// A cold source failing the first `failures` subscriptions, then emitting
/// `value` and completing; counts every subscription it receives.
#[cfg(test)]
pub(super) fn flaky_source<T: Flow>(
  failures: usize, value: T, attempts: Arc<std::sync::atomic::AtomicUsize>,
) -> Signal<T> {
  Signal::defer(move || {
    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
    if attempt < failures {
      Signal::fail(Fault::msg(format!("attempt {attempt} failed")))
    } else {
      Signal::of(value.clone())
    }
  })
}
