//! Recursive expansion without call-stack growth.
//!
//! Each upstream value seeds a batch loop: the batch is emitted, fed back
//! through the expansion function as a fresh signal, and the collected
//! output becomes the next batch, until a round comes back empty. Rounds are
//! driven by an iterative trampoline (or hopped through a scheduler in the
//! asynchronous variant), so million-step expansions never deepen the stack.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
  time::Duration,
};

use super::Trampoline;
use crate::{
  disposable::Disposable,
  fault::guarded,
  observer::{SharedObserver, Subscriber},
  scheduler::SharedScheduler,
  signal::{Flow, Signal},
};

struct RecurseState {
  active: usize,
  outer_done: bool,
}

struct RecurseDriver<T> {
  expand: Arc<dyn Fn(Signal<T>) -> Signal<T> + Send + Sync>,
  downstream: SharedObserver<T>,
  disposer: Disposable,
  scheduler: Option<SharedScheduler>,
  state: Mutex<RecurseState>,
  batches: Mutex<VecDeque<Vec<T>>>,
  trampoline: Trampoline,
}

impl<T: Flow> RecurseDriver<T> {
  fn seed(self: Arc<Self>, value: T) {
    self.state.lock().unwrap().active += 1;
    self.enqueue(vec![value]);
  }

  fn enqueue(self: Arc<Self>, batch: Vec<T>) {
    match &self.scheduler {
      // Asynchronous variant: every round yields the stack entirely.
      Some(scheduler) => {
        let driver = self.clone();
        scheduler.schedule(Duration::ZERO, Box::new(move || driver.round(batch)));
      }
      None => {
        self.batches.lock().unwrap().push_back(batch);
        let driver = self.clone();
        self.trampoline.bounce(move || {
          let batch = driver.batches.lock().unwrap().pop_front();
          if let Some(batch) = batch {
            driver.clone().round(batch);
          }
        });
      }
    }
  }

  fn round(self: Arc<Self>, batch: Vec<T>) {
    if self.disposer.is_disposed() {
      return;
    }
    if batch.is_empty() {
      return self.seed_finished();
    }
    for value in &batch {
      if self.disposer.is_disposed() {
        return;
      }
      self.downstream.accept(value.clone());
    }

    let source = match guarded(|| (self.expand)(Signal::from_iter(batch))) {
      Ok(source) => source,
      Err(fault) => return self.downstream.error(fault),
    };
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    let driver = self.clone();
    let failures = self.downstream.clone();
    let observer = Subscriber::default()
      .on_next(move |value| sink.lock().unwrap().push(value))
      .on_error(move |fault| failures.error(fault))
      .on_complete(move || {
        let next = std::mem::take(&mut *collected.lock().unwrap());
        driver.clone().enqueue(next);
      })
      .into_shared();
    source.subscribe_raw(observer, self.disposer.sub());
  }

  fn seed_finished(&self) {
    let finished = {
      let mut s = self.state.lock().unwrap();
      s.active -= 1;
      s.outer_done && s.active == 0
    };
    if finished {
      self.downstream.complete();
    }
  }

  fn outer_completed(&self) {
    let finished = {
      let mut s = self.state.lock().unwrap();
      s.outer_done = true;
      s.active == 0
    };
    if finished {
      self.downstream.complete();
    }
  }
}

impl<T: Flow> Signal<T> {
  /// Emit each upstream value and then the endless chain `f(v)`, `f(f(v))`,
  /// … — bound it downstream (`take`, `take_while`) or by disposal.
  pub fn recurse(&self, f: impl Fn(T) -> T + Send + Sync + 'static) -> Signal<T> {
    let f = Arc::new(f);
    self.recurse_map(move |step| {
      let f = f.clone();
      step.map(move |value| f(value))
    })
  }

  /// Feed each round of output back through `expand` until a round comes
  /// back empty. Rounds run iteratively on the emitting thread.
  pub fn recurse_map(
    &self, expand: impl Fn(Signal<T>) -> Signal<T> + Send + Sync + 'static,
  ) -> Signal<T> {
    self.recurse_driver(Arc::new(expand), None)
  }

  /// `recurse_map` with every round hopped through `scheduler`, yielding the
  /// stack entirely between rounds for very large expansions.
  pub fn recurse_map_on(
    &self, expand: impl Fn(Signal<T>) -> Signal<T> + Send + Sync + 'static,
    scheduler: SharedScheduler,
  ) -> Signal<T> {
    self.recurse_driver(Arc::new(expand), Some(scheduler))
  }

  fn recurse_driver(
    &self, expand: Arc<dyn Fn(Signal<T>) -> Signal<T> + Send + Sync>,
    scheduler: Option<SharedScheduler>,
  ) -> Signal<T> {
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let driver = Arc::new(RecurseDriver {
        expand: expand.clone(),
        downstream: observer.clone(),
        disposer: disposer.clone(),
        scheduler: scheduler.clone(),
        state: Mutex::new(RecurseState { active: 0, outer_done: false }),
        batches: Mutex::new(VecDeque::new()),
        trampoline: Trampoline::new(),
      });

      let seeds = driver.clone();
      let upstream = Subscriber::relay(&observer, move |value| seeds.clone().seed(value))
        .on_complete(move || driver.outer_completed())
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}
