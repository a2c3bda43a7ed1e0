//! Hot, imperatively-driven multicast source.

use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::{
  disposable::Disposable,
  fault::Fault,
  observer::{Observer, SharedObserver},
  signal::{Flow, Signal},
};

#[derive(Clone)]
enum TerminalEvent {
  Completed,
  Failed(Fault),
}

struct Entry<T> {
  id: u64,
  observer: SharedObserver<T>,
}

struct State<T> {
  observers: SmallVec<[Entry<T>; 1]>,
  terminal: Option<TerminalEvent>,
  next_id: u64,
}

/// A hot multicast subject: external code pushes events in with
/// [`accept`](Signaling::accept) / [`error`](Signaling::error) /
/// [`complete`](Signaling::complete), and every signal obtained from
/// [`expose`](Signaling::expose) fans them out to its subscribers.
///
/// Once a terminal event fires the subject stays terminated: further `accept`
/// calls are silently ignored and late subscribers immediately receive the
/// stored terminal event (values are never replayed — this is not a replay
/// subject).
///
/// Publishing iterates a snapshot of the fan-out set taken under a short
/// lock, so an observer may dispose itself — removing itself from the set —
/// while a publish loop is running, from any thread.
pub struct Signaling<T> {
  state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Signaling<T> {
  fn clone(&self) -> Self { Self { state: self.state.clone() } }
}

impl<T: Flow> Default for Signaling<T> {
  fn default() -> Self { Self::new() }
}

impl<T: Flow> Signaling<T> {
  pub fn new() -> Self {
    Self {
      state: Arc::new(Mutex::new(State {
        observers: SmallVec::new(),
        terminal: None,
        next_id: 0,
      })),
    }
  }

  /// Push a value to every active subscriber.
  pub fn accept(&self, value: T) {
    let snapshot: SmallVec<[SharedObserver<T>; 1]> = {
      let state = self.state.lock().unwrap();
      if state.terminal.is_some() {
        return;
      }
      state.observers.iter().map(|entry| entry.observer.clone()).collect()
    };
    // The last observer receives the moved value instead of a clone.
    let mut iter = snapshot.into_iter().peekable();
    while let Some(observer) = iter.next() {
      if iter.peek().is_some() {
        observer.accept(value.clone());
      } else {
        observer.accept(value);
        break;
      }
    }
  }

  /// Terminate every subscriber with a failure and seal the subject.
  pub fn error(&self, fault: Fault) {
    for observer in self.terminate(TerminalEvent::Failed(fault.clone())) {
      observer.error(fault.clone());
    }
  }

  /// Terminate every subscriber with completion and seal the subject.
  pub fn complete(&self) {
    for observer in self.terminate(TerminalEvent::Completed) {
      observer.complete();
    }
  }

  fn terminate(&self, event: TerminalEvent) -> SmallVec<[SharedObserver<T>; 1]> {
    let mut state = self.state.lock().unwrap();
    if state.terminal.is_some() {
      return SmallVec::new();
    }
    state.terminal = Some(event);
    std::mem::take(&mut state.observers).into_iter().map(|entry| entry.observer).collect()
  }

  pub fn observer_count(&self) -> usize { self.state.lock().unwrap().observers.len() }

  pub fn is_terminated(&self) -> bool { self.state.lock().unwrap().terminal.is_some() }

  /// The subject as a subscribable `Signal`.
  pub fn expose(&self) -> Signal<T> {
    let state = self.state.clone();
    Signal::new(move |observer, disposer| {
      let replay = {
        let mut s = state.lock().unwrap();
        match &s.terminal {
          Some(event) => Some(event.clone()),
          None => {
            s.next_id += 1;
            let id = s.next_id;
            s.observers.push(Entry { id, observer: observer.clone() });
            let state = state.clone();
            disposer.add_action(move || {
              state.lock().unwrap().observers.retain(|entry| entry.id != id);
            });
            None
          }
        }
      };
      match replay {
        Some(TerminalEvent::Completed) => observer.complete(),
        Some(TerminalEvent::Failed(fault)) => observer.error(fault),
        None => {}
      }
      disposer
    })
  }
}

/// A subject is itself an observer, so a pipeline can terminate into one.
impl<T: Flow> Observer<T> for Signaling<T> {
  fn accept(&self, value: T) { Signaling::accept(self, value); }

  fn error(&self, fault: Fault) { Signaling::error(self, fault); }

  fn complete(&self) { Signaling::complete(self); }
}
