//! Composable, idempotent cancellation handles.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};

use smallvec::SmallVec;

enum Teardown {
  Action(Box<dyn FnOnce() + Send>),
  Child(Disposable),
}

struct Inner {
  disposed: AtomicBool,
  teardown: Mutex<SmallVec<[Teardown; 1]>>,
}

/// A cancellation token for one running subscription (or a piece of one).
///
/// Disposables compose: children added with [`add`](Disposable::add) and
/// cleanup actions added with [`add_action`](Disposable::add_action) are
/// disposed/run together, exactly once, when this handle is disposed.
/// Disposal is idempotent and safe to invoke from any thread; adding to an
/// already-disposed handle disposes the child immediately.
#[derive(Clone)]
pub struct Disposable(Arc<Inner>);

impl Default for Disposable {
  fn default() -> Self { Self::empty() }
}

impl Disposable {
  /// A fresh, undisposed handle with no attached cleanup.
  pub fn empty() -> Self {
    Disposable(Arc::new(Inner {
      disposed: AtomicBool::new(false),
      teardown: Mutex::new(SmallVec::new()),
    }))
  }

  /// A handle that runs `action` once when disposed.
  pub fn from_action(action: impl FnOnce() + Send + 'static) -> Self {
    let handle = Self::empty();
    handle.add_action(action);
    handle
  }

  pub fn is_disposed(&self) -> bool { self.0.disposed.load(Ordering::SeqCst) }

  /// Dispose this handle and everything attached to it. Repeated calls are
  /// no-ops; concurrent calls dispose the teardown set exactly once.
  pub fn dispose(&self) {
    let drained = {
      let mut teardown = self.0.teardown.lock().unwrap();
      if self.0.disposed.swap(true, Ordering::SeqCst) {
        return;
      }
      std::mem::take(&mut *teardown)
    };
    // Run teardown outside the lock: a child's cleanup may add to or dispose
    // other handles.
    for item in drained {
      match item {
        Teardown::Action(action) => action(),
        Teardown::Child(child) => child.dispose(),
      }
    }
  }

  /// Attach `child` so it is disposed together with this handle.
  pub fn add(&self, child: Disposable) -> &Self {
    if Arc::ptr_eq(&self.0, &child.0) {
      return self;
    }
    self.attach(Teardown::Child(child));
    self
  }

  /// Attach a cleanup action run once on disposal.
  pub fn add_action(&self, action: impl FnOnce() + Send + 'static) -> &Self {
    self.attach(Teardown::Action(Box::new(action)));
    self
  }

  /// Create a child handle: disposed with the parent, but independently
  /// disposable without affecting the parent.
  pub fn sub(&self) -> Disposable {
    let child = Disposable::empty();
    self.add(child.clone());
    child
  }

  fn attach(&self, item: Teardown) {
    let late = {
      let mut teardown = self.0.teardown.lock().unwrap();
      if self.0.disposed.load(Ordering::SeqCst) {
        Some(item)
      } else {
        // Long-lived subscriptions (switch_map, interval) attach many
        // short-lived children; drop the already-dead ones as we go.
        if teardown.len() > 32 {
          teardown.retain(|t| match t {
            Teardown::Child(child) => !child.is_disposed(),
            Teardown::Action(_) => true,
          });
        }
        teardown.push(item);
        None
      }
    };
    if let Some(item) = late {
      match item {
        Teardown::Action(action) => action(),
        Teardown::Child(child) => child.dispose(),
      }
    }
  }
}
