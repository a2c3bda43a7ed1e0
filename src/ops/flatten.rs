//! Inner-signal flattening. The five operators share one shape — map an
//! outer value to an inner signal — and differ only in concurrency and
//! ordering policy.

use std::{
  collections::{HashMap, VecDeque},
  hash::Hash,
  sync::{Arc, Mutex},
};

use super::Trampoline;
use crate::{
  disposable::Disposable,
  fault::guarded,
  observer::{SharedObserver, Subscriber},
  signal::{Flow, Signal},
};

// ============================================================================
// flat_map — unbounded concurrent subscription
// ============================================================================

struct FanState {
  active: usize,
  outer_done: bool,
}

impl<T: Flow> Signal<T> {
  /// Subscribe every inner signal as outer values arrive, forwarding inner
  /// values interleaved as they occur. Completes once the outer signal and
  /// every inner subscription have completed; any error is terminal.
  pub fn flat_map<R: Flow>(
    &self, f: impl Fn(T) -> Signal<R> + Send + Sync + 'static,
  ) -> Signal<R> {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let f = f.clone();
      let state = Arc::new(Mutex::new(FanState { active: 0, outer_done: false }));
      let downstream = observer.clone();
      let root = disposer.clone();
      let upstream = Subscriber::relay(&observer, {
        let state = state.clone();
        move |value| {
          let inner = match guarded(|| f(value)) {
            Ok(inner) => inner,
            Err(fault) => return downstream.error(fault),
          };
          state.lock().unwrap().active += 1;
          let inner_observer = Subscriber::forward(downstream.clone())
            .on_complete({
              let state = state.clone();
              let downstream = downstream.clone();
              move || {
                let finished = {
                  let mut s = state.lock().unwrap();
                  s.active -= 1;
                  s.outer_done && s.active == 0
                };
                if finished {
                  downstream.complete();
                }
              }
            })
            .into_shared();
          inner.subscribe_raw(inner_observer, root.sub());
        }
      })
      .on_complete({
        let state = state.clone();
        let downstream = observer.clone();
        move || {
          let finished = {
            let mut s = state.lock().unwrap();
            s.outer_done = true;
            s.active == 0
          };
          if finished {
            downstream.complete();
          }
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

// ============================================================================
// concat_map — strictly one inner at a time
// ============================================================================

struct ConcatMapState<R> {
  queue: VecDeque<Signal<R>>,
  busy: bool,
  outer_done: bool,
}

struct ConcatMapDriver<R> {
  state: Mutex<ConcatMapState<R>>,
  downstream: SharedObserver<R>,
  disposer: Disposable,
  trampoline: Trampoline,
}

impl<R: Flow> ConcatMapDriver<R> {
  fn push(self: Arc<Self>, inner: Signal<R>) {
    self.state.lock().unwrap().queue.push_back(inner);
    self.pump();
  }

  fn outer_completed(self: Arc<Self>) {
    self.state.lock().unwrap().outer_done = true;
    self.pump();
  }

  fn inner_completed(self: Arc<Self>) {
    self.state.lock().unwrap().busy = false;
    self.pump();
  }

  fn pump(self: Arc<Self>) {
    let driver = self.clone();
    self.trampoline.bounce(move || {
      if driver.disposer.is_disposed() {
        return;
      }
      let mut start = None;
      let mut finish = false;
      {
        let mut s = driver.state.lock().unwrap();
        if !s.busy {
          if let Some(inner) = s.queue.pop_front() {
            s.busy = true;
            start = Some(inner);
          } else if s.outer_done {
            s.outer_done = false;
            finish = true;
          }
        }
      }
      if let Some(inner) = start {
        let chain = driver.clone();
        let inner_observer = Subscriber::forward(driver.downstream.clone())
          .on_complete(move || chain.clone().inner_completed())
          .into_shared();
        inner.subscribe_raw(inner_observer, driver.disposer.sub());
      } else if finish {
        driver.downstream.complete();
      }
    });
  }
}

impl<T: Flow> Signal<T> {
  /// Subscribe inner signals strictly one at a time, in outer-arrival order;
  /// a queued inner signal is not even subscribed until the previous one
  /// completes.
  pub fn concat_map<R: Flow>(
    &self, f: impl Fn(T) -> Signal<R> + Send + Sync + 'static,
  ) -> Signal<R> {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let f = f.clone();
      let driver = Arc::new(ConcatMapDriver {
        state: Mutex::new(ConcatMapState {
          queue: VecDeque::new(),
          busy: false,
          outer_done: false,
        }),
        downstream: observer.clone(),
        disposer: disposer.clone(),
        trampoline: Trampoline::new(),
      });

      let upstream = Subscriber::relay(&observer, {
        let driver = driver.clone();
        move |value| match guarded(|| f(value)) {
          Ok(inner) => driver.clone().push(inner),
          Err(fault) => driver.downstream.error(fault),
        }
      })
      .on_complete(move || driver.clone().outer_completed())
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

// ============================================================================
// sequence_map — concurrent subscription, outer-arrival output order
// ============================================================================

struct SeqSlot<R> {
  id: u64,
  buffered: VecDeque<R>,
  done: bool,
}

struct SeqState<R> {
  slots: VecDeque<SeqSlot<R>>,
  outer_done: bool,
  next_id: u64,
}

impl<T: Flow> Signal<T> {
  /// Subscribe every inner signal concurrently (like `flat_map`) but emit
  /// outputs grouped in outer-arrival order: values of inner `n` are held
  /// back until inner `n-1` has completed.
  pub fn sequence_map<R: Flow>(
    &self, f: impl Fn(T) -> Signal<R> + Send + Sync + 'static,
  ) -> Signal<R> {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let f = f.clone();
      let state = Arc::new(Mutex::new(SeqState {
        slots: VecDeque::new(),
        outer_done: false,
        next_id: 0,
      }));
      let downstream = observer.clone();
      let root = disposer.clone();

      let upstream = Subscriber::relay(&observer, {
        let state = state.clone();
        move |value| {
          let inner = match guarded(|| f(value)) {
            Ok(inner) => inner,
            Err(fault) => return downstream.error(fault),
          };
          let id = {
            let mut s = state.lock().unwrap();
            s.next_id += 1;
            let new_id = s.next_id;
            s.slots.push_back(SeqSlot { id: new_id, buffered: VecDeque::new(), done: false });
            new_id
          };

          let on_value = {
            let state = state.clone();
            let downstream = downstream.clone();
            move |item: R| {
              let head = {
                let mut s = state.lock().unwrap();
                if s.slots.front().map(|slot| slot.id) == Some(id) {
                  true
                } else {
                  if let Some(slot) = s.slots.iter_mut().find(|slot| slot.id == id) {
                    slot.buffered.push_back(item.clone());
                  }
                  false
                }
              };
              if head {
                downstream.accept(item);
              }
            }
          };

          let on_done = {
            let state = state.clone();
            let downstream = downstream.clone();
            move || {
              let (ready, finished) = {
                let mut s = state.lock().unwrap();
                if let Some(slot) = s.slots.iter_mut().find(|slot| slot.id == id) {
                  slot.done = true;
                }
                let mut ready = Vec::new();
                while let Some(front) = s.slots.front_mut() {
                  ready.extend(front.buffered.drain(..));
                  if front.done {
                    s.slots.pop_front();
                  } else {
                    break;
                  }
                }
                (ready, s.outer_done && s.slots.is_empty())
              };
              for item in ready {
                downstream.accept(item);
              }
              if finished {
                downstream.complete();
              }
            }
          };

          let inner_observer = Subscriber::relay(&downstream, on_value)
            .on_complete(on_done)
            .into_shared();
          inner.subscribe_raw(inner_observer, root.sub());
        }
      })
      .on_complete({
        let state = state.clone();
        let downstream = observer.clone();
        move || {
          let finished = {
            let mut s = state.lock().unwrap();
            s.outer_done = true;
            s.slots.is_empty()
          };
          if finished {
            downstream.complete();
          }
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

// ============================================================================
// switch_map / key_map — superseding subscription slots
// ============================================================================

struct SwitchState {
  generation: u64,
  inner_live: bool,
  outer_done: bool,
  current: Option<Disposable>,
}

impl<T: Flow> Signal<T> {
  /// Track only the most recent inner signal: every new outer value disposes
  /// the previously active inner subscription before subscribing the new
  /// one, so stale inner events can never reach the output.
  pub fn switch_map<R: Flow>(
    &self, f: impl Fn(T) -> Signal<R> + Send + Sync + 'static,
  ) -> Signal<R> {
    let source = self.clone();
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let f = f.clone();
      let state = Arc::new(Mutex::new(SwitchState {
        generation: 0,
        inner_live: false,
        outer_done: false,
        current: None,
      }));
      let downstream = observer.clone();
      let root = disposer.clone();

      let upstream = Subscriber::relay(&observer, {
        let state = state.clone();
        move |value| {
          let inner = match guarded(|| f(value)) {
            Ok(inner) => inner,
            Err(fault) => return downstream.error(fault),
          };
          let (old, generation) = {
            let mut s = state.lock().unwrap();
            s.generation += 1;
            s.inner_live = true;
            (s.current.take(), s.generation)
          };
          // The superseded inner is dead before its replacement activates.
          if let Some(old) = old {
            old.dispose();
          }
          let child = root.sub();
          state.lock().unwrap().current = Some(child.clone());

          let inner_observer = Subscriber::forward(downstream.clone())
            .on_complete({
              let state = state.clone();
              let downstream = downstream.clone();
              move || {
                let finished = {
                  let mut s = state.lock().unwrap();
                  if s.generation == generation {
                    s.inner_live = false;
                    s.outer_done
                  } else {
                    false
                  }
                };
                if finished {
                  downstream.complete();
                }
              }
            })
            .into_shared();
          inner.subscribe_raw(inner_observer, child);
        }
      })
      .on_complete({
        let state = state.clone();
        let downstream = observer.clone();
        move || {
          let finished = {
            let mut s = state.lock().unwrap();
            s.outer_done = true;
            !s.inner_live
          };
          if finished {
            downstream.complete();
          }
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// `switch_map` with one slot per key: a new outer value supersedes only
  /// the previously active inner subscription for the same key; distinct
  /// keys run concurrently like `flat_map`.
  pub fn key_map<K, R: Flow>(
    &self, key: impl Fn(&T) -> K + Send + Sync + 'static,
    f: impl Fn(T) -> Signal<R> + Send + Sync + 'static,
  ) -> Signal<R>
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
  {
    let source = self.clone();
    let key = Arc::new(key);
    let f = Arc::new(f);
    Signal::new(move |observer, disposer| {
      let key = key.clone();
      let f = f.clone();
      let state = Arc::new(Mutex::new(KeyState::<K> {
        slots: HashMap::new(),
        active: 0,
        outer_done: false,
        next_generation: 0,
      }));
      let downstream = observer.clone();
      let root = disposer.clone();

      let upstream = Subscriber::relay(&observer, {
        let state = state.clone();
        move |value: T| {
          let slot_key = match guarded(|| key(&value)) {
            Ok(k) => k,
            Err(fault) => return downstream.error(fault),
          };
          let inner = match guarded(|| f(value)) {
            Ok(inner) => inner,
            Err(fault) => return downstream.error(fault),
          };

          let child = root.sub();
          let (superseded, generation) = {
            let mut s = state.lock().unwrap();
            s.next_generation += 1;
            let generation = s.next_generation;
            let old = s
              .slots
              .insert(slot_key.clone(), KeySlot { generation, handle: child.clone(), live: true });
            match &old {
              Some(slot) if slot.live => {}
              _ => s.active += 1,
            }
            (old, generation)
          };
          if let Some(slot) = superseded {
            slot.handle.dispose();
          }

          let inner_observer = Subscriber::forward(downstream.clone())
            .on_complete({
              let state = state.clone();
              let downstream = downstream.clone();
              let slot_key = slot_key.clone();
              move || {
                let finished = {
                  let mut s = state.lock().unwrap();
                  if let Some(slot) = s.slots.get_mut(&slot_key) {
                    if slot.generation == generation && slot.live {
                      slot.live = false;
                      s.active -= 1;
                    }
                  }
                  s.outer_done && s.active == 0
                };
                if finished {
                  downstream.complete();
                }
              }
            })
            .into_shared();
          inner.subscribe_raw(inner_observer, child);
        }
      })
      .on_complete({
        let state = state.clone();
        let downstream = observer.clone();
        move || {
          let finished = {
            let mut s = state.lock().unwrap();
            s.outer_done = true;
            s.active == 0
          };
          if finished {
            downstream.complete();
          }
        }
      })
      .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

struct KeySlot {
  generation: u64,
  handle: Disposable,
  live: bool,
}

struct KeyState<K> {
  slots: HashMap<K, KeySlot>,
  active: usize,
  outer_done: bool,
  next_generation: u64,
}

// ============================================================================
// Tests
// ============================================================================

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
  fn flat_map_interleaves_inner_values() {
    let outer = Signaling::new();
    let inner_a = Signaling::new();
    let inner_b = Signaling::new();

    let inners = [inner_a.clone(), inner_b.clone()];
    let values = collect(&outer.expose().flat_map(move |i: usize| inners[i].expose()));

    outer.accept(0);
    outer.accept(1);
    inner_a.accept("a1");
    inner_b.accept("b1");
    inner_a.accept("a2");

    assert_eq!(*values.lock().unwrap(), vec!["a1", "b1", "a2"]);
  }

  #[test]
  fn flat_map_completes_after_outer_and_all_inners() {
    let outer = Signaling::new();
    let inner = Signaling::<i32>::new();
    let completions = Arc::new(AtomicUsize::new(0));
    let done = completions.clone();
    let inner_for_map = inner.clone();
    outer.expose().flat_map(move |_: i32| inner_for_map.expose()).to_all(
      |_| {},
      |_| {},
      move || {
        done.fetch_add(1, Ordering::SeqCst);
      },
    );

    outer.accept(1);
    outer.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    inner.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn flat_map_synchronous_sources() {
    assert_eq!(
      Signal::from_iter(vec![1, 10]).flat_map(|v| Signal::from_iter(vec![v, v + 1])).to_vec(),
      vec![1, 2, 10, 11]
    );
  }

  #[test]
  fn concat_map_queues_inner_subscription() {
    let outer = Signaling::new();
    let first = Signaling::new();
    let second = Signaling::new();
    let started = Arc::new(AtomicUsize::new(0));

    let inners = [first.clone(), second.clone()];
    let counter = started.clone();
    let values = collect(&outer.expose().concat_map(move |i: usize| {
      counter.fetch_add(1, Ordering::SeqCst);
      inners[i].expose()
    }));

    outer.accept(0);
    outer.accept(1);
    // The mapper ran for both, but the second inner is not yet subscribed.
    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(second.observer_count(), 0);

    first.accept("f1");
    first.complete();
    assert_eq!(second.observer_count(), 1);
    second.accept("s1");
    second.complete();

    assert_eq!(*values.lock().unwrap(), vec!["f1", "s1"]);
  }

  #[test]
  fn sequence_map_holds_later_inners_back() {
    let outer = Signaling::new();
    let first = Signaling::new();
    let second = Signaling::new();

    let inners = [first.clone(), second.clone()];
    let values = collect(&outer.expose().sequence_map(move |i: usize| inners[i].expose()));

    outer.accept(0);
    outer.accept(1);
    // Both inners are live (concurrent subscription)...
    assert_eq!(first.observer_count(), 1);
    assert_eq!(second.observer_count(), 1);

    second.accept("s1");
    first.accept("f1");
    assert_eq!(*values.lock().unwrap(), vec!["f1"]);

    // ...but the second inner's output is released only once the first ends.
    first.complete();
    assert_eq!(*values.lock().unwrap(), vec!["f1", "s1"]);
    second.accept("s2");
    assert_eq!(*values.lock().unwrap(), vec!["f1", "s1", "s2"]);
  }

  #[test]
  fn switch_map_disposes_the_superseded_inner() {
    let outer = Signaling::new();
    let first = Signaling::new();
    let second = Signaling::new();

    let inners = [first.clone(), second.clone()];
    let values = collect(&outer.expose().switch_map(move |i: usize| inners[i].expose()));

    outer.accept(0);
    first.accept("f1");
    assert_eq!(first.observer_count(), 1);

    outer.accept(1);
    // Detail check: the old inner is unsubscribed, the new one is active.
    assert_eq!(first.observer_count(), 0);
    assert_eq!(second.observer_count(), 1);

    first.accept("stale");
    second.accept("s1");
    assert_eq!(*values.lock().unwrap(), vec!["f1", "s1"]);
  }

  #[test]
  fn switch_map_completion_requires_outer_and_current_inner() {
    let outer = Signaling::new();
    let inner = Signaling::<i32>::new();
    let completions = Arc::new(AtomicUsize::new(0));
    let done = completions.clone();
    let inner_for_map = inner.clone();
    outer.expose().switch_map(move |_: i32| inner_for_map.expose()).to_all(
      |_| {},
      |_| {},
      move || {
        done.fetch_add(1, Ordering::SeqCst);
      },
    );

    outer.accept(1);
    outer.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    inner.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn key_map_supersedes_per_key_slot() {
    let outer = Signaling::new();
    let slot_a1 = Signaling::new();
    let slot_a2 = Signaling::new();
    let slot_b = Signaling::new();

    let inners = [slot_a1.clone(), slot_a2.clone(), slot_b.clone()];
    let values = collect(&outer.expose().key_map(
      |outer_value: &(&'static str, usize)| outer_value.0,
      move |outer_value| inners[outer_value.1].expose(),
    ));

    outer.accept(("a", 0));
    outer.accept(("b", 2));
    slot_a1.accept("a1");
    slot_b.accept("b1");
    assert_eq!(slot_a1.observer_count(), 1);

    // A repeated key supersedes only that key's slot.
    outer.accept(("a", 1));
    assert_eq!(slot_a1.observer_count(), 0);
    assert_eq!(slot_b.observer_count(), 1);

    slot_a1.accept("stale");
    slot_a2.accept("a2");
    slot_b.accept("b2");

    assert_eq!(*values.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
  }

  #[test]
  fn key_map_completes_after_outer_and_every_slot() {
    let outer = Signaling::new();
    let inner = Signaling::<i32>::new();
    let completions = Arc::new(AtomicUsize::new(0));
    let done = completions.clone();
    let inner_for_map = inner.clone();
    outer
      .expose()
      .key_map(|v: &i32| *v % 2, move |_| inner_for_map.expose())
      .to_all(|_| {}, |_| {}, move || {
        done.fetch_add(1, Ordering::SeqCst);
      });

    outer.accept(1);
    outer.accept(2);
    outer.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    inner.complete();
    assert_eq!(completions.load(Ordering::SeqCst), 1);
  }
}
