//! Quiet-window filtering: only the survivors of a burst get through.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use crate::{
  disposable::Disposable,
  fault::Fault,
  observer::{SharedObserver, Subscriber},
  scheduler::{default_scheduler, SharedScheduler},
  signal::{Flow, Signal},
};

struct DebounceDriver<T> {
  state: Mutex<DebounceState<T>>,
  downstream: SharedObserver<T>,
  disposer: Disposable,
  scheduler: SharedScheduler,
  window: Duration,
  emit_first: bool,
}

struct DebounceState<T> {
  pending: Option<T>,
  timer: Option<Disposable>,
  in_window: bool,
}

impl<T: Flow> DebounceDriver<T> {
  fn push(self: Arc<Self>, value: T) {
    let emit_now = {
      let mut s = self.state.lock().unwrap();
      if let Some(timer) = s.timer.take() {
        timer.dispose();
      }
      if self.emit_first && !s.in_window {
        s.in_window = true;
        s.pending = None;
        true
      } else {
        s.in_window = true;
        s.pending = Some(value.clone());
        false
      }
    };
    if emit_now {
      self.downstream.accept(value);
    }
    let driver = self.clone();
    let handle = self.scheduler.schedule(self.window, Box::new(move || driver.quiet()));
    self.state.lock().unwrap().timer = Some(handle);
  }

  fn quiet(self: Arc<Self>) {
    if self.disposer.is_disposed() {
      return;
    }
    let pending = {
      let mut s = self.state.lock().unwrap();
      s.timer = None;
      s.in_window = false;
      s.pending.take()
    };
    if let Some(value) = pending {
      self.downstream.accept(value);
    }
  }

  fn finish(self: Arc<Self>) {
    let pending = {
      let mut s = self.state.lock().unwrap();
      if let Some(timer) = s.timer.take() {
        timer.dispose();
      }
      s.pending.take()
    };
    if let Some(value) = pending {
      self.downstream.accept(value);
    }
    self.downstream.complete();
  }

  fn fail(self: Arc<Self>, fault: Fault) {
    {
      let mut s = self.state.lock().unwrap();
      if let Some(timer) = s.timer.take() {
        timer.dispose();
      }
      s.pending = None;
    }
    self.downstream.error(fault);
  }
}

impl<T: Flow> Signal<T> {
  /// Only the most recent value of a burst survives: each arrival resets the
  /// quiet window, and the value is emitted once the window elapses without
  /// a newer one. Zero window: pass-through.
  pub fn debounce(&self, window: Duration) -> Signal<T> {
    self.debounce_on(window, default_scheduler())
  }

  /// `debounce` on an explicit scheduler.
  pub fn debounce_on(&self, window: Duration, scheduler: SharedScheduler) -> Signal<T> {
    self.debounce_driver(window, scheduler, false)
  }

  /// `debounce` that additionally emits the very first value of a burst
  /// immediately.
  pub fn debounce_first(&self, window: Duration) -> Signal<T> {
    self.debounce_first_on(window, default_scheduler())
  }

  /// `debounce_first` on an explicit scheduler.
  pub fn debounce_first_on(&self, window: Duration, scheduler: SharedScheduler) -> Signal<T> {
    self.debounce_driver(window, scheduler, true)
  }

  fn debounce_driver(
    &self, window: Duration, scheduler: SharedScheduler, emit_first: bool,
  ) -> Signal<T> {
    if window.is_zero() {
      return self.clone();
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let driver = Arc::new(DebounceDriver {
        state: Mutex::new(DebounceState { pending: None, timer: None, in_window: false }),
        downstream: observer,
        disposer: disposer.clone(),
        scheduler: scheduler.clone(),
        window,
        emit_first,
      });

      let values = driver.clone();
      let completions = driver.clone();
      let failures = driver.clone();
      let upstream = Subscriber::default()
        .on_next(move |value| values.clone().push(value))
        .on_complete(move || completions.clone().finish())
        .on_error(move |fault| failures.clone().fail(fault))
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }

  /// Collect a whole burst and emit it as one `Vec` once the quiet window
  /// elapses. A zero window wraps each value in a singleton batch.
  pub fn debounce_all(&self, window: Duration) -> Signal<Vec<T>> {
    self.debounce_all_on(window, default_scheduler())
  }

  /// `debounce_all` on an explicit scheduler.
  pub fn debounce_all_on(&self, window: Duration, scheduler: SharedScheduler) -> Signal<Vec<T>> {
    if window.is_zero() {
      return self.map(|value| vec![value]);
    }
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      let driver = Arc::new(BurstDriver {
        state: Mutex::new(BurstState { burst: Vec::new(), timer: None }),
        downstream: observer,
        disposer: disposer.clone(),
        scheduler: scheduler.clone(),
        window,
      });

      let values = driver.clone();
      let completions = driver.clone();
      let failures = driver.clone();
      let upstream = Subscriber::default()
        .on_next(move |value| values.clone().push(value))
        .on_complete(move || completions.clone().finish())
        .on_error(move |fault| failures.clone().fail(fault))
        .into_shared();
      source.subscribe_raw(upstream, disposer)
    })
  }
}

struct BurstDriver<T> {
  state: Mutex<BurstState<T>>,
  downstream: SharedObserver<Vec<T>>,
  disposer: Disposable,
  scheduler: SharedScheduler,
  window: Duration,
}

struct BurstState<T> {
  burst: Vec<T>,
  timer: Option<Disposable>,
}

impl<T: Flow> BurstDriver<T> {
  fn push(self: Arc<Self>, value: T) {
    {
      let mut s = self.state.lock().unwrap();
      if let Some(timer) = s.timer.take() {
        timer.dispose();
      }
      s.burst.push(value);
    }
    let driver = self.clone();
    let handle = self.scheduler.schedule(self.window, Box::new(move || driver.quiet()));
    self.state.lock().unwrap().timer = Some(handle);
  }

  fn quiet(self: Arc<Self>) {
    if self.disposer.is_disposed() {
      return;
    }
    if let Some(batch) = self.take_burst() {
      self.downstream.accept(batch);
    }
  }

  fn finish(self: Arc<Self>) {
    if let Some(batch) = self.take_burst() {
      self.downstream.accept(batch);
    }
    self.downstream.complete();
  }

  fn fail(self: Arc<Self>, fault: Fault) {
    self.take_burst();
    self.downstream.error(fault);
  }

  fn take_burst(&self) -> Option<Vec<T>> {
    let mut s = self.state.lock().unwrap();
    if let Some(timer) = s.timer.take() {
      timer.dispose();
    }
    if s.burst.is_empty() {
      None
    } else {
      Some(std::mem::take(&mut s.burst))
    }
  }
}
