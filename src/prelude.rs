//! Everything a pipeline author needs, in one import.

pub use crate::{
  disposable::Disposable,
  fault::{set_uncaught_handler, uncaught_suppressed, EngineError, Fault},
  observer::{Observer, SharedObserver},
  scheduler::{
    default_scheduler, Scheduler, SharedScheduler, TestScheduler, ThreadPoolScheduler,
  },
  signal::{Flow, Signal},
  signaling::Signaling,
  tuple::{Pair, Triple},
  variable::Variable,
};
