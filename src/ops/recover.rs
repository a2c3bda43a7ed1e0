//! Error recovery: replace a failure with substitute values and keep going.
//!
//! Recovery rides the retry driver: an error feeds the notifier, the
//! notifier's emissions are forwarded downstream *as values*, and the source
//! is re-subscribed from scratch so the stream continues running.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};

use super::{
  retry::{Cause, RedoChannel, RedoDriver},
  Trampoline,
};
use crate::{
  fault::Fault,
  observer::Subscriber,
  signal::{Flow, Signal},
  signaling::Signaling,
};

impl<T: Flow> RedoDriver<T> {
  /// The notifier produced a substitute value: deliver it downstream, then
  /// re-run the source.
  fn recovered(self: Arc<Self>, value: T) {
    self.pending.lock().unwrap().take();
    self.downstream.accept(value);
    self.resubscribe();
  }
}

impl<T: Flow> Signal<T> {
  /// Replace every error with `value` and keep the stream running,
  /// indefinitely.
  pub fn recover(&self, value: T) -> Signal<T> {
    self.recover_when(move |faults| faults.map_to(value.clone()))
  }

  /// Feed the error channel into `notifier`; whatever the resulting signal
  /// emits is delivered downstream in place of the error, and the source is
  /// re-subscribed. When the notifier terminates, recovery is over: an
  /// unresolved or later error propagates terminally.
  pub fn recover_when(
    &self, notifier: impl Fn(Signal<Fault>) -> Signal<T> + Send + Sync + 'static,
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

      let recovered = driver.clone();
      let completed = driver.clone();
      let failed = driver.clone();
      let control_observer = Subscriber::default()
        .on_next(move |value: T| recovered.clone().recovered(value))
        .on_complete(move || completed.clone().notifier_completed())
        .on_error(move |fault| failed.clone().notifier_failed(fault))
        .into_shared();
      notifier(faults.expose()).subscribe_raw(control_observer, disposer.sub());

      driver.resubscribe();
      disposer
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::super::retry::flaky_source;
  use super::*;

  fn outcome<T: Flow + std::fmt::Debug>(signal: &Signal<T>) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(vec![]));
    let (values, errors, completions) = (log.clone(), log.clone(), log.clone());
    signal.to_all(
      move |v| values.lock().unwrap().push(format!("v:{v:?}")),
      move |fault| errors.lock().unwrap().push(format!("e:{fault}")),
      move || completions.lock().unwrap().push("done".into()),
    );
    log
  }

  #[test]
  fn recover_substitutes_the_error_and_continues() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let source = flaky_source(2, "real", attempts.clone());
    let log = outcome(&source.recover("fallback"));

    // Two failures each produced a substitute value, then the real value.
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(*log.lock().unwrap(), vec!["v:\"fallback\"", "v:\"fallback\"", "v:\"real\"", "done"]);
  }

  #[test]
  fn bounded_recovery_propagates_the_next_error() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let source = flaky_source(usize::MAX, 0, attempts.clone());
    let log = outcome(&source.recover_when(|faults| faults.take(2).map_to(-1)));

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(*log.lock().unwrap(), vec!["v:-1", "v:-1", "e:attempt 2 failed"]);
  }

  #[test]
  fn recovery_does_not_dispose_the_subscription() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let source = flaky_source(1, 5, attempts.clone());
    let values = Arc::new(Mutex::new(vec![]));
    let sink = values.clone();
    let subscription = source.recover(0).to(move |v| sink.lock().unwrap().push(v));

    assert_eq!(*values.lock().unwrap(), vec![0, 5]);
    // The final run completed normally, which does dispose; the recovery
    // itself kept the subscription alive through the failure.
    assert!(subscription.is_disposed());
  }

  #[test]
  fn delayed_recovery_arrives_via_the_scheduler() {
    let scheduler = crate::scheduler::TestScheduler::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let source = flaky_source(1, 9, attempts.clone());
    let sched = scheduler.clone();
    let log = outcome(&source.recover_when(move |faults| {
      faults.delay_on(std::time::Duration::from_millis(10), sched.clone()).map_to(-9)
    }));

    assert_eq!(*log.lock().unwrap(), Vec::<String>::new());
    scheduler.advance_by(std::time::Duration::from_millis(10));
    assert_eq!(*log.lock().unwrap(), vec!["v:-9", "v:9", "done"]);
  }
}
