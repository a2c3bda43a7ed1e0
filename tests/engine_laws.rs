//! Cross-operator laws of the engine, exercised through whole pipelines.

use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
  time::Duration,
};

use sigflow::prelude::*;

fn log_of<T: Flow + std::fmt::Debug>(signal: &Signal<T>) -> (Arc<Mutex<Vec<String>>>, Disposable) {
  let log = Arc::new(Mutex::new(vec![]));
  let (values, errors, completions) = (log.clone(), log.clone(), log.clone());
  let subscription = signal.to_all(
    move |v| values.lock().unwrap().push(format!("v:{v:?}")),
    move |fault| errors.lock().unwrap().push(format!("e:{fault}")),
    move || completions.lock().unwrap().push("done".into()),
  );
  (log, subscription)
}

#[test]
fn at_most_one_terminal_through_an_operator_chain() {
  let rogue = Signal::new(|observer: SharedObserver<i32>, disposer| {
    observer.accept(1);
    observer.complete();
    observer.complete();
    observer.accept(2);
    observer.error(Fault::msg("too late"));
    disposer
  });

  let (log, subscription) = log_of(&rogue.map(|v| v * 10).filter(|_| true));
  assert_eq!(*log.lock().unwrap(), vec!["v:10", "done"]);
  assert!(subscription.is_disposed());
}

#[test]
fn take_exactness_with_upstream_accounting() {
  let subscriptions = Arc::new(AtomicUsize::new(0));
  let counter = subscriptions.clone();
  let source = Signal::defer(move || {
    counter.fetch_add(1, Ordering::SeqCst);
    Signal::from_iter(vec![1, 2, 3, 4])
  });

  let (log, _) = log_of(&source.take(2));
  assert_eq!(*log.lock().unwrap(), vec!["v:1", "v:2", "done"]);
  assert_eq!(subscriptions.load(Ordering::SeqCst), 1);

  let (log, subscription) = log_of(&source.take(0));
  assert_eq!(*log.lock().unwrap(), vec!["done"]);
  assert!(subscription.is_disposed());
}

#[test]
fn combine_latest_example_from_two_hot_sources() {
  let upper = Signaling::new();
  let lower = Signaling::new();
  let values = Arc::new(Mutex::new(vec![]));
  let sink = values.clone();
  upper
    .expose()
    .combine_latest_with(&lower.expose(), |u: &'static str, l: &'static str| format!("{u}{l}"))
    .to(move |v| sink.lock().unwrap().push(v));

  upper.accept("A");
  assert!(values.lock().unwrap().is_empty());
  lower.accept("a");
  assert_eq!(*values.lock().unwrap(), vec!["Aa"]);
  lower.accept("b");
  assert_eq!(*values.lock().unwrap(), vec!["Aa", "Ab"]);
}

#[test]
fn switch_map_supersession_with_timed_inners() {
  let scheduler = TestScheduler::new();
  let outer = Signaling::new();
  let values = Arc::new(Mutex::new(vec![]));
  let sink = values.clone();
  let sched = scheduler.clone();
  outer
    .expose()
    .switch_map(move |label: &'static str| {
      Signal::of(label).delay_on(Duration::from_millis(10), sched.clone())
    })
    .to(move |v| sink.lock().unwrap().push(v));

  outer.accept("first");
  scheduler.advance_by(Duration::from_millis(5));
  // Superseded before its delay elapsed: "first" must never surface.
  outer.accept("second");
  scheduler.advance_by(Duration::from_millis(10));

  assert_eq!(*values.lock().unwrap(), vec!["second"]);
}

#[test]
fn retry_bound_counts_re_subscriptions_exactly() {
  let attempts = Arc::new(AtomicUsize::new(0));
  let counter = attempts.clone();
  let source = Signal::<i32>::defer(move || {
    let n = counter.fetch_add(1, Ordering::SeqCst);
    Signal::fail(Fault::msg(format!("failure {n}")))
  });

  let (log, _) = log_of(&source.retry_times(3));
  assert_eq!(attempts.load(Ordering::SeqCst), 4);
  assert_eq!(*log.lock().unwrap(), vec!["e:failure 3"]);
}

#[test]
fn debounce_quiescence_end_to_end() {
  let scheduler = TestScheduler::new();
  let subject = Signaling::new();
  let values = Arc::new(Mutex::new(vec![]));
  let sink = values.clone();
  subject
    .expose()
    .debounce_on(Duration::from_millis(25), scheduler.clone())
    .to(move |v| sink.lock().unwrap().push(v));

  for word in ["only", "last", "will", "be", "accepted"] {
    subject.accept(word);
  }
  scheduler.advance_by(Duration::from_millis(25));
  assert_eq!(*values.lock().unwrap(), vec!["accepted"]);
}

#[test]
fn share_ref_counting_and_restart() {
  let upstream_subscribes = Arc::new(AtomicUsize::new(0));
  let upstream_disposals = Arc::new(AtomicUsize::new(0));
  let subject = Signaling::<i32>::new();

  let subscribes = upstream_subscribes.clone();
  let disposals = upstream_disposals.clone();
  let source = subject.expose().effect_on_dispose(move || {
    disposals.fetch_add(1, Ordering::SeqCst);
  });
  let shared = Signal::defer(move || {
    subscribes.fetch_add(1, Ordering::SeqCst);
    source.clone()
  })
  .share();

  let first = shared.to(|_| {});
  let second = shared.to(|_| {});
  assert_eq!(upstream_subscribes.load(Ordering::SeqCst), 1);

  first.dispose();
  assert_eq!(upstream_disposals.load(Ordering::SeqCst), 0);
  second.dispose();
  assert_eq!(upstream_disposals.load(Ordering::SeqCst), 1);

  // A later subscriber starts the upstream over.
  let _third = shared.to(|_| {});
  assert_eq!(upstream_subscribes.load(Ordering::SeqCst), 2);
}

#[test]
fn disposal_is_idempotent_across_a_running_pipeline() {
  let scheduler = TestScheduler::new();
  let subscription = Signal::interval_on(
    Duration::from_millis(10),
    Duration::from_millis(10),
    scheduler.clone(),
  )
  .map(|n| n * 2)
  .to(|_| {});

  subscription.dispose();
  subscription.dispose();
  assert!(subscription.is_disposed());
  scheduler.flush();
}

#[test]
fn property_bridge_pipeline_with_debounced_writes() {
  let scheduler = TestScheduler::new();
  let profile = Variable::of("draft");
  let selected = Signaling::new();

  let cells = [profile.clone()];
  let values = Arc::new(Mutex::new(vec![]));
  let sink = values.clone();
  selected
    .expose()
    .switch_variable(move |index: usize| cells[index].clone())
    .debounce_on(Duration::from_millis(10), scheduler.clone())
    .to(move |v| sink.lock().unwrap().push(v));

  selected.accept(0);
  profile.set("edited");
  profile.set("saved");
  scheduler.advance_by(Duration::from_millis(10));

  assert_eq!(*values.lock().unwrap(), vec!["saved"]);
}

#[test]
fn hot_subject_fans_out_across_producer_threads() {
  let subject = Signaling::new();
  let total = Arc::new(AtomicUsize::new(0));
  let sum = total.clone();
  let subscription = subject.expose().to(move |v: usize| {
    sum.fetch_add(v, Ordering::SeqCst);
  });

  let producers: Vec<_> = (0..4)
    .map(|_| {
      let subject = subject.clone();
      std::thread::spawn(move || {
        for _ in 0..1000 {
          subject.accept(1);
        }
      })
    })
    .collect();
  for producer in producers {
    producer.join().unwrap();
  }

  assert_eq!(total.load(Ordering::SeqCst), 4000);
  subscription.dispose();
  subject.accept(7);
  assert_eq!(total.load(Ordering::SeqCst), 4000);
}

#[test]
fn pipeline_delivers_on_a_real_scheduler() {
  let scheduler: SharedScheduler = Arc::new(ThreadPoolScheduler::new());
  let values = Arc::new(Mutex::new(vec![]));
  let sink = values.clone();
  Signal::from_iter(1..=3).on(scheduler).to(move |v| sink.lock().unwrap().push(v));

  let deadline = std::time::Instant::now() + Duration::from_secs(2);
  while values.lock().unwrap().len() < 3 && std::time::Instant::now() < deadline {
    std::thread::sleep(Duration::from_millis(5));
  }
  assert_eq!(*values.lock().unwrap(), vec![1, 2, 3]);
}
