//! Value-pairing combination: queue pairing (`combine`), latest-slot pairing
//! (`combine_latest`) and self-pairing (`pair`).

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
};

use crate::{
  fault::guarded,
  observer::Subscriber,
  signal::{Flow, Signal},
  tuple::{Pair, Triple},
};

// ============================================================================
// combine — nth-with-nth queue pairing
// ============================================================================

struct ZipState<T, U> {
  left: VecDeque<T>,
  right: VecDeque<U>,
  left_done: bool,
  right_done: bool,
}

impl<T, U> ZipState<T, U> {
  // A side that completed with an empty queue can never contribute again.
  fn exhausted(&self) -> bool {
    (self.left_done && self.left.is_empty()) || (self.right_done && self.right.is_empty())
  }
}

impl<T: Flow> Signal<T> {
  /// Pair the nth value of this signal with the nth value of `other`.
  pub fn combine<U: Flow>(&self, other: &Signal<U>) -> Signal<Pair<T, U>> {
    self.combine_with(other, Pair)
  }

  /// `combine` through an explicit pairing function.
  pub fn combine_with<U: Flow, R: Flow>(
    &self, other: &Signal<U>, f: impl Fn(T, U) -> R + Send + Sync + 'static,
  ) -> Signal<R> {
    let left = self.clone();
    let right = other.clone();
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let state = Arc::new(Mutex::new(ZipState {
        left: VecDeque::new(),
        right: VecDeque::new(),
        left_done: false,
        right_done: false,
      }));

      {
        let values_state = state.clone();
        let done_state = state.clone();
        let downstream = observer.clone();
        let completions = observer.clone();
        let f = f.clone();
        let upstream = Subscriber::relay(&observer, move |value: T| {
          let matched = {
            let mut s = values_state.lock().unwrap();
            s.left.push_back(value);
            match (s.left.front(), s.right.front()) {
              (Some(_), Some(_)) => {
                Some((s.left.pop_front().unwrap(), s.right.pop_front().unwrap()))
              }
              _ => None,
            }
          };
          if let Some((l, r)) = matched {
            match guarded(|| f(l, r)) {
              Ok(paired) => downstream.accept(paired),
              Err(fault) => return downstream.error(fault),
            }
          }
          if values_state.lock().unwrap().exhausted() {
            downstream.complete();
          }
        })
        .on_complete(move || {
          let done = {
            let mut s = done_state.lock().unwrap();
            s.left_done = true;
            s.left.is_empty()
          };
          if done {
            completions.complete();
          }
        })
        .into_shared();
        left.subscribe_raw(upstream, disposer.sub());
      }

      {
        let values_state = state.clone();
        let downstream = observer.clone();
        let completions = observer.clone();
        let f = f.clone();
        let upstream = Subscriber::relay(&observer, move |value: U| {
          let matched = {
            let mut s = values_state.lock().unwrap();
            s.right.push_back(value);
            match (s.left.front(), s.right.front()) {
              (Some(_), Some(_)) => {
                Some((s.left.pop_front().unwrap(), s.right.pop_front().unwrap()))
              }
              _ => None,
            }
          };
          if let Some((l, r)) = matched {
            match guarded(|| f(l, r)) {
              Ok(paired) => downstream.accept(paired),
              Err(fault) => return downstream.error(fault),
            }
          }
          if values_state.lock().unwrap().exhausted() {
            downstream.complete();
          }
        })
        .on_complete(move || {
          let done = {
            let mut s = state.lock().unwrap();
            s.right_done = true;
            s.right.is_empty()
          };
          if done {
            completions.complete();
          }
        })
        .into_shared();
        right.subscribe_raw(upstream, disposer.sub());
      }

      disposer
    })
  }

  /// Three-way queue pairing.
  pub fn combine3<U: Flow, V: Flow>(
    &self, second: &Signal<U>, third: &Signal<V>,
  ) -> Signal<Triple<T, U, V>> {
    self.combine(second).combine_with(third, Pair::append)
  }
}

// ============================================================================
// combine_latest — latest-slot pairing
// ============================================================================

struct LatestState<T, U> {
  left: Option<T>,
  right: Option<U>,
  live: usize,
}

impl<T: Flow> Signal<T> {
  /// Pair every emission from either side with the other side's most recent
  /// value. Nothing is emitted until both sides have emitted at least once.
  /// One side completing freezes its latest value; downstream completes only
  /// when both sides have completed.
  pub fn combine_latest<U: Flow>(&self, other: &Signal<U>) -> Signal<Pair<T, U>> {
    self.combine_latest_with(other, Pair)
  }

  /// `combine_latest` through an explicit pairing function.
  pub fn combine_latest_with<U: Flow, R: Flow>(
    &self, other: &Signal<U>, f: impl Fn(T, U) -> R + Send + Sync + 'static,
  ) -> Signal<R> {
    let left = self.clone();
    let right = other.clone();
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let state =
        Arc::new(Mutex::new(LatestState { left: None, right: None, live: 2 }));

      let completion = |downstream: crate::observer::SharedObserver<R>,
                        state: Arc<Mutex<LatestState<T, U>>>| {
        move || {
          let done = {
            let mut s = state.lock().unwrap();
            s.live -= 1;
            s.live == 0
          };
          if done {
            downstream.complete();
          }
        }
      };

      {
        let values_state = state.clone();
        let downstream = observer.clone();
        let f = f.clone();
        let upstream = Subscriber::relay(&observer, move |value: T| {
          let other_latest = {
            let mut s = values_state.lock().unwrap();
            s.left = Some(value.clone());
            s.right.clone()
          };
          if let Some(r) = other_latest {
            match guarded(|| f(value, r)) {
              Ok(paired) => downstream.accept(paired),
              Err(fault) => downstream.error(fault),
            }
          }
        })
        .on_complete(completion(observer.clone(), state.clone()))
        .into_shared();
        left.subscribe_raw(upstream, disposer.sub());
      }

      {
        let state_values = state.clone();
        let downstream = observer.clone();
        let f = f.clone();
        let upstream = Subscriber::relay(&observer, move |value: U| {
          let other_latest = {
            let mut s = state_values.lock().unwrap();
            s.right = Some(value.clone());
            s.left.clone()
          };
          if let Some(l) = other_latest {
            match guarded(|| f(l, value)) {
              Ok(paired) => downstream.accept(paired),
              Err(fault) => downstream.error(fault),
            }
          }
        })
        .on_complete(completion(observer.clone(), state))
        .into_shared();
        right.subscribe_raw(upstream, disposer.sub());
      }

      disposer
    })
  }

  /// Three-way latest-slot pairing.
  pub fn combine_latest3<U: Flow, V: Flow>(
    &self, second: &Signal<U>, third: &Signal<V>,
  ) -> Signal<Triple<T, U, V>> {
    self.combine_latest(second).combine_latest_with(third, Pair::append)
  }

  /// Pair each value with its predecessor, starting from the second value.
  pub fn pair(&self) -> Signal<Pair<T, T>> {
    self.pair_state(None)
  }

  /// Pair each value with its predecessor, seeding the first pair with
  /// `seed`.
  pub fn pair_with(&self, seed: T) -> Signal<Pair<T, T>> { self.pair_state(Some(seed)) }

  fn pair_state(&self, seed: Option<T>) -> Signal<Pair<T, T>> {
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let previous = Mutex::new(seed.clone());
      let downstream = observer.clone();
      let upstream = Subscriber::relay(&observer, move |value: T| {
        let prior = previous.lock().unwrap().replace(value.clone());
        if let Some(prior) = prior {
          downstream.accept(Pair(prior, value));
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::signaling::Signaling;

  fn collect<T: Flow>(signal: &Signal<T>) -> Arc<Mutex<Vec<T>>> {
    let values = Arc::new(Mutex::new(vec![]));
    let sink = values.clone();
    signal.to(move |v| sink.lock().unwrap().push(v));
    values
  }

  #[test]
  fn combine_pairs_nth_with_nth() {
    let left = Signaling::new();
    let right = Signaling::new();
    let values =
      collect(&left.expose().combine_with(&right.expose(), |l: &str, r: &str| format!("{l}{r}")));

    left.accept("A");
    left.accept("B");
    right.accept("a");
    right.accept("b");
    left.accept("C");
    right.accept("c");

    assert_eq!(*values.lock().unwrap(), vec!["Aa", "Bb", "Cc"]);
  }

  #[test]
  fn combine_completes_when_an_exhausted_side_finishes() {
    let left = Signaling::<i32>::new();
    let right = Signaling::<i32>::new();
    let completions = Arc::new(AtomicUsize::new(0));
    let done = completions.clone();
    left.expose().combine(&right.expose()).to_all(|_| {}, |_| {}, move || {
      done.fetch_add(1, Ordering::SeqCst);
    });

    left.accept(1);
    right.accept(2);
    // Left finished with no queued values: no further pair can form.
    left.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn combine_latest_tuple_law() {
    let left = Signaling::new();
    let right = Signaling::new();
    let values =
      collect(&left.expose().combine_latest_with(&right.expose(), |l: &str, r: &str| {
        format!("{l}{r}")
      }));

    left.accept("A");
    assert!(values.lock().unwrap().is_empty());
    right.accept("a");
    right.accept("b");
    left.accept("B");

    assert_eq!(*values.lock().unwrap(), vec!["Aa", "Ab", "Bb"]);
  }

  #[test]
  fn combine_latest_tolerates_early_completion() {
    let left = Signaling::new();
    let right = Signaling::new();
    let completions = Arc::new(AtomicUsize::new(0));
    let done = completions.clone();
    let values = Arc::new(Mutex::new(vec![]));
    let sink = values.clone();
    left
      .expose()
      .combine_latest(&right.expose())
      .to_all(move |p: Pair<i32, i32>| sink.lock().unwrap().push((p.0, p.1)), |_| {}, move || {
        done.fetch_add(1, Ordering::SeqCst);
      });

    left.accept(1);
    left.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 0);

    // The completed side's latest value keeps contributing.
    right.accept(10);
    right.accept(20);
    right.complete();

    assert_eq!(*values.lock().unwrap(), vec![(1, 10), (1, 20)]);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn combine_latest3_carries_all_slots() {
    let a = Signaling::new();
    let b = Signaling::new();
    let c = Signaling::new();
    let values = collect(&a.expose().combine_latest3(&b.expose(), &c.expose()));

    a.accept(1);
    b.accept(2);
    c.accept(3);
    b.accept(20);

    assert_eq!(*values.lock().unwrap(), vec![Triple(1, 2, 3), Triple(1, 20, 3)]);
  }

  #[test]
  fn pair_offsets_by_one() {
    assert_eq!(Signal::from_iter(1..=4).pair().to_vec(), vec![
      Pair(1, 2),
      Pair(2, 3),
      Pair(3, 4)
    ]);
  }

  #[test]
  fn pair_with_seed_starts_immediately() {
    assert_eq!(Signal::from_iter(1..=2).pair_with(0).to_vec(), vec![Pair(0, 1), Pair(1, 2)]);
  }
}
