//! Prefixing a stream with known values.

use crate::{
  observer::Subscriber,
  signal::{Flow, Signal},
};

impl<T: Flow> Signal<T> {
  /// Emit `value` before anything from the upstream.
  pub fn start_with(&self, value: T) -> Signal<T> { self.start_with_iter([value]) }

  /// Emit every item of `values` before anything from the upstream.
  pub fn start_with_iter<I>(&self, values: I) -> Signal<T>
  where
    I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
  {
    let source = self.clone();
    Signal::new(move |observer, disposer| {
      for value in values.clone() {
        if disposer.is_disposed() {
          return disposer;
        }
        observer.accept(value);
      }
      source.subscribe_raw(Subscriber::forward(observer).into_shared(), disposer)
    })
  }
}
