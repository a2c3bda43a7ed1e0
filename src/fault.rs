//! Stream errors and the process-wide uncaught-error sink.
//!
//! Errors travel through a pipeline as [`Fault`] values: cheap to clone, so
//! one failure can fan out to any number of observers, and downcastable back
//! to the concrete error that produced them.

use std::{
  error::Error,
  fmt,
  panic::{catch_unwind, AssertUnwindSafe},
  sync::{Arc, Mutex},
  time::Duration,
};

use once_cell::sync::Lazy;
use thiserror::Error;

// ============================================================================
// Fault
// ============================================================================

/// A shareable error value flowing through the `error` channel of a pipeline.
///
/// `Fault` wraps any `Error + Send + Sync` behind an `Arc`, which is what lets
/// multicast operators deliver the same failure to every subscriber without
/// requiring user error types to be `Clone`.
#[derive(Clone)]
pub struct Fault(Arc<dyn Error + Send + Sync + 'static>);

impl Fault {
  /// Wrap a concrete error.
  pub fn new(err: impl Error + Send + Sync + 'static) -> Self { Self(Arc::new(err)) }

  /// Create a fault carrying only a message.
  pub fn msg(message: impl Into<String>) -> Self { Self::new(EngineError::Message(message.into())) }

  /// Check whether the underlying error is of type `E`.
  pub fn is<E: Error + 'static>(&self) -> bool { self.0.downcast_ref::<E>().is_some() }

  /// Borrow the underlying error as `E`, if it is one.
  pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> { self.0.downcast_ref::<E>() }

  /// Whether two faults share the same underlying error allocation.
  pub fn same_root(&self, other: &Fault) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl fmt::Display for Fault {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl fmt::Debug for Fault {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Fault").field(&self.0).finish()
  }
}

impl<E: Error + Send + Sync + 'static> From<E> for Fault {
  fn from(err: E) -> Self { Self::new(err) }
}

// ============================================================================
// Engine error kinds
// ============================================================================

/// Failures raised by the engine itself rather than by user code.
#[derive(Debug, Error)]
pub enum EngineError {
  /// Raised by `timeout` when no value arrives within the window.
  #[error("no value arrived within {0:?}")]
  Timeout(Duration),

  /// A plain-message fault, also used for panics converted into faults.
  #[error("{0}")]
  Message(String),
}

/// Run `f`, converting a panic into a `Fault` instead of unwinding through
/// the pipeline. Operator decorators use this around user-supplied closures
/// so a throwing mapper terminates the subscription via the error channel.
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, Fault> {
  catch_unwind(AssertUnwindSafe(f)).map_err(|payload| fault_from_panic(payload.as_ref()))
}

/// Describe a caught panic payload as a `Fault`.
pub(crate) fn fault_from_panic(payload: &(dyn std::any::Any + Send)) -> Fault {
  let message = payload
    .downcast_ref::<&str>()
    .map(|s| s.to_string())
    .or_else(|| payload.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "opaque panic".into());
  Fault::new(EngineError::Message(message))
}

// ============================================================================
// Uncaught-error sink
// ============================================================================

type UncaughtHandler = Box<dyn Fn(&Fault) + Send + Sync>;

struct UncaughtSink {
  handler: UncaughtHandler,
  last: Option<String>,
  suppressed: u64,
}

static UNCAUGHT: Lazy<Mutex<UncaughtSink>> = Lazy::new(|| {
  Mutex::new(UncaughtSink {
    handler: Box::new(|fault| log::error!("uncaught stream error: {fault}")),
    last: None,
    suppressed: 0,
  })
});

/// Replace the process-wide handler invoked for errors that reach a terminal
/// subscriber with no error callback, or for panics thrown by a terminal
/// consumer. The default handler reports through `log::error!`.
pub fn set_uncaught_handler(handler: impl Fn(&Fault) + Send + Sync + 'static) {
  let mut sink = UNCAUGHT.lock().unwrap();
  sink.handler = Box::new(handler);
  sink.last = None;
  sink.suppressed = 0;
}

/// How many consecutive duplicates of the last reported error have been
/// coalesced instead of re-notified.
pub fn uncaught_suppressed() -> u64 { UNCAUGHT.lock().unwrap().suppressed }

/// Route a fault to the uncaught sink. Consecutive reports with an identical
/// root display are coalesced into a single notification.
pub(crate) fn report_uncaught(fault: &Fault) {
  let mut sink = UNCAUGHT.lock().unwrap();
  let display = fault.to_string();
  if sink.last.as_deref() == Some(display.as_str()) {
    sink.suppressed += 1;
    return;
  }
  sink.last = Some(display);
  sink.suppressed = 0;
  (sink.handler)(fault);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn fault_clone_shares_root() {
    let fault = Fault::msg("boom");
    let copy = fault.clone();
    assert!(fault.same_root(&copy));
    assert_eq!(fault.to_string(), "boom");
  }

  #[test]
  fn fault_downcast() {
    let fault = Fault::new(EngineError::Timeout(Duration::from_millis(5)));
    assert!(fault.is::<EngineError>());
    assert!(matches!(fault.downcast_ref::<EngineError>(), Some(EngineError::Timeout(_))));
  }

  #[test]
  fn guarded_converts_panic() {
    let result = guarded(|| panic!("mapper exploded"));
    assert_eq!(result.unwrap_err().to_string(), "mapper exploded");
  }

  #[test]
  fn uncaught_sink_coalesces_consecutive_duplicates() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    set_uncaught_handler(|_| {
      CALLS.fetch_add(1, Ordering::SeqCst);
    });

    let repeated = Fault::msg("same failure");
    report_uncaught(&repeated);
    report_uncaught(&repeated);
    report_uncaught(&repeated);
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(uncaught_suppressed(), 2);

    report_uncaught(&Fault::msg("different failure"));
    assert_eq!(CALLS.load(Ordering::SeqCst), 2);

    // A repetition after something else in between is a new notification.
    report_uncaught(&Fault::msg("same failure"));
    assert_eq!(CALLS.load(Ordering::SeqCst), 3);

    set_uncaught_handler(|fault| log::error!("uncaught stream error: {fault}"));
  }
}
