//! Combining independent signals without value pairing.

use std::{
  collections::VecDeque,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
};

use super::Trampoline;
use crate::{
  observer::{SharedObserver, Subscriber},
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Interleave this signal with `other` as values occur. Completion requires
  /// every source to complete; an error from any source is terminal.
  pub fn merge(&self, other: &Signal<T>) -> Signal<T> { self.merge_iter([other.clone()]) }

  /// Interleave this signal with every signal in `others`.
  pub fn merge_iter(&self, others: impl IntoIterator<Item = Signal<T>>) -> Signal<T> {
    let sources: Vec<Signal<T>> =
      std::iter::once(self.clone()).chain(others).collect();
    Signal::new(move |observer, disposer| {
      let remaining = Arc::new(AtomicUsize::new(sources.len()));
      for source in &sources {
        let downstream = observer.clone();
        let remaining = remaining.clone();
        let upstream = Subscriber::forward(observer.clone())
          .on_complete(move || {
            if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
              downstream.complete();
            }
          })
          .into_shared();
        source.subscribe_raw(upstream, disposer.sub());
      }
      disposer
    })
  }

  /// Emit everything from this signal, then everything from `other`. The
  /// next source is not even subscribed until the previous one completes.
  pub fn concat(&self, other: &Signal<T>) -> Signal<T> { self.concat_iter([other.clone()]) }

  /// Sequential concatenation of this signal and every signal in `others`.
  pub fn concat_iter(&self, others: impl IntoIterator<Item = Signal<T>>) -> Signal<T> {
    let sources: Vec<Signal<T>> =
      std::iter::once(self.clone()).chain(others).collect();
    Signal::new(move |observer, disposer| {
      let driver = Arc::new(ConcatDriver {
        queue: Mutex::new(sources.iter().cloned().collect()),
        downstream: observer,
        disposer: disposer.clone(),
        trampoline: Trampoline::new(),
      });
      driver.advance();
      disposer
    })
  }
}

/// Subscribes queued sources one at a time; each completion bounces the next
/// subscription through a trampoline so long synchronous chains stay off the
/// call stack.
struct ConcatDriver<T> {
  queue: Mutex<VecDeque<Signal<T>>>,
  downstream: SharedObserver<T>,
  disposer: crate::disposable::Disposable,
  trampoline: Trampoline,
}

impl<T: Flow> ConcatDriver<T> {
  fn advance(self: Arc<Self>) {
    let driver = self.clone();
    self.trampoline.bounce(move || {
      if driver.disposer.is_disposed() {
        return;
      }
      let next = driver.queue.lock().unwrap().pop_front();
      match next {
        None => driver.downstream.complete(),
        Some(source) => {
          let chain = driver.clone();
          let upstream = Subscriber::forward(driver.downstream.clone())
            .on_complete(move || chain.clone().advance())
            .into_shared();
          source.subscribe_raw(upstream, driver.disposer.sub());
        }
      }
    });
  }
}
