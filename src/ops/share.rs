//! Ref-counted warm multicast over a cold upstream.

use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::{
  disposable::Disposable,
  observer::{SharedObserver, Subscriber},
  signal::{Flow, Signal},
};

struct ShareState<T> {
  observers: Vec<(u64, SharedObserver<T>)>,
  upstream: Option<Disposable>,
  next_id: u64,
}

impl<T: Flow> Signal<T> {
  /// Multiplex any number of subscribers onto a single upstream
  /// subscription. The first subscriber starts the upstream; later ones
  /// attach to the same fan-out set; the upstream is disposed when the last
  /// subscriber leaves. An upstream terminal event is broadcast to everyone
  /// and resets the state, so a later subscriber restarts the upstream from
  /// scratch.
  pub fn share(&self) -> Signal<T> {
    let source = self.clone();
    // One shared state per share() call site, across all its subscriptions.
    let state: Arc<Mutex<ShareState<T>>> =
      Arc::new(Mutex::new(ShareState { observers: Vec::new(), upstream: None, next_id: 0 }));

    Signal::new(move |observer, disposer| {
      let (id, first, upstream_handle) = {
        let mut s = state.lock().unwrap();
        s.next_id += 1;
        let id = s.next_id;
        s.observers.push((id, observer));
        let first = s.observers.len() == 1;
        let handle = if first {
          let handle = Disposable::empty();
          s.upstream = Some(handle.clone());
          Some(handle)
        } else {
          None
        };
        (id, first, handle)
      };

      {
        let state = state.clone();
        disposer.add_action(move || {
          let upstream = {
            let mut s = state.lock().unwrap();
            s.observers.retain(|(i, _)| *i != id);
            if s.observers.is_empty() {
              s.upstream.take()
            } else {
              None
            }
          };
          if let Some(upstream) = upstream {
            upstream.dispose();
          }
        });
      }

      if first {
        let snapshot = |state: &Arc<Mutex<ShareState<T>>>| -> SmallVec<[SharedObserver<T>; 1]> {
          state.lock().unwrap().observers.iter().map(|(_, o)| o.clone()).collect()
        };
        let drain = |state: &Arc<Mutex<ShareState<T>>>| -> SmallVec<[SharedObserver<T>; 1]> {
          let mut s = state.lock().unwrap();
          s.upstream = None;
          std::mem::take(&mut s.observers).into_iter().map(|(_, o)| o).collect()
        };

        let values_state = state.clone();
        let failure_state = state.clone();
        let completion_state = state.clone();
        let fan_out = Subscriber::default()
          .on_next(move |value: T| {
            let targets = snapshot(&values_state);
            let mut iter = targets.into_iter().peekable();
            while let Some(target) = iter.next() {
              if iter.peek().is_some() {
                target.accept(value.clone());
              } else {
                target.accept(value);
                break;
              }
            }
          })
          .on_error(move |fault| {
            for target in drain(&failure_state) {
              target.error(fault.clone());
            }
          })
          .on_complete(move || {
            for target in drain(&completion_state) {
              target.complete();
            }
          })
          .into_shared();

        source.subscribe_raw(fan_out, upstream_handle.unwrap_or_default());
      }
      disposer
    })
  }

  /// Alias of [`share`](Signal::share).
  pub fn fork(&self) -> Signal<T> { self.share() }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::signaling::Signaling;

  #[test]
  fn many_subscribers_one_upstream_subscription() {
    let subject = Signaling::new();
    // The subject's observer set counts upstream subscriptions for us.
    let upstream = subject.expose().share();
    let first_values = Arc::new(Mutex::new(vec![]));
    let second_values = Arc::new(Mutex::new(vec![]));

    let sink = first_values.clone();
    let first = upstream.to(move |v| sink.lock().unwrap().push(v));
    let sink = second_values.clone();
    let second = upstream.to(move |v| sink.lock().unwrap().push(v));

    assert_eq!(subject.observer_count(), 1);
    subject.accept(1);
    assert_eq!(*first_values.lock().unwrap(), vec![1]);
    assert_eq!(*second_values.lock().unwrap(), vec![1]);

    first.dispose();
    assert_eq!(subject.observer_count(), 1);
    second.dispose();
    // The last unsubscribe tears down the one upstream subscription.
    assert_eq!(subject.observer_count(), 0);
  }

  #[test]
  fn late_subscriber_after_reset_restarts_the_upstream() {
    let starts = Arc::new(AtomicUsize::new(0));
    let counter = starts.clone();
    let shared = Signal::defer(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Signal::from_iter(1..=2)
    })
    .share();

    assert_eq!(shared.to_vec(), vec![1, 2]);
    assert_eq!(shared.to_vec(), vec![1, 2]);
    // The synchronous source completed each time, resetting the share.
    assert_eq!(starts.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn upstream_terminal_reaches_every_subscriber() {
    let subject = Signaling::<i32>::new();
    let completions = Arc::new(AtomicUsize::new(0));
    let shared = subject.expose().share();

    let first_done = completions.clone();
    shared.to_all(|_| {}, |_| {}, move || {
      first_done.fetch_add(1, Ordering::SeqCst);
    });
    let second_done = completions.clone();
    shared.to_all(|_| {}, |_| {}, move || {
      second_done.fetch_add(1, Ordering::SeqCst);
    });

    subject.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn fork_is_share() {
    let subject = Signaling::new();
    let forked = subject.expose().fork();
    let values = Arc::new(Mutex::new(vec![]));
    let (a, b) = (values.clone(), values.clone());
    forked.to(move |v: i32| a.lock().unwrap().push(v));
    forked.to(move |v: i32| b.lock().unwrap().push(v));

    assert_eq!(subject.observer_count(), 1);
    subject.accept(3);
    assert_eq!(*values.lock().unwrap(), vec![3, 3]);
  }
}
