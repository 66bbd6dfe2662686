#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{GatedReclaimer, RecordingReclaimer, wait_for_reclaim};
use dircache::cache::reclaim::{ReclaimQueue, Reclaimer};
use dircache::config::{BackpressurePolicy, ReclaimOption};

fn option(queue_capacity: usize, workers: usize, policy: BackpressurePolicy) -> ReclaimOption {
    ReclaimOption {
        queue_capacity,
        workers,
        policy,
    }
}

/// Give the single worker time to dequeue the first item and park on the gate.
fn let_worker_park() {
    std::thread::sleep(Duration::from_millis(50));
}

#[test]
fn single_worker_reclaims_in_fifo_order() {
    let reclaimer = RecordingReclaimer::new();
    let queue = ReclaimQueue::spawn(
        "fifo",
        reclaimer.clone(),
        &option(64, 1, BackpressurePolicy::Block),
    )
    .unwrap();

    for i in 1u64..=10 {
        queue.submit(i);
    }
    wait_for_reclaim(queue.stats());

    assert_eq!(reclaimer.items(), (1..=10).collect::<Vec<_>>());
    assert_eq!(queue.stats().submitted(), 10);
    assert_eq!(queue.stats().reclaimed(), 10);
    assert_eq!(queue.stats().inline(), 0);
}

#[test]
fn shutdown_drains_everything_already_queued() {
    let reclaimer = GatedReclaimer::new();
    let queue = ReclaimQueue::spawn(
        "drain",
        reclaimer.clone(),
        &option(64, 2, BackpressurePolicy::Block),
    )
    .unwrap();

    for i in 0u64..20 {
        queue.submit(i);
    }
    assert!(reclaimer.inner.items().is_empty(), "workers are parked");

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let_worker_park();
            reclaimer.open();
        });
        queue.shutdown();
    });

    let mut items = reclaimer.inner.items();
    items.sort_unstable();
    assert_eq!(items, (0..20).collect::<Vec<_>>(), "nothing queued is lost");
}

#[test]
fn inline_policy_reclaims_on_caller_when_full() {
    let reclaimer = GatedReclaimer::new();
    let queue = ReclaimQueue::spawn(
        "inline",
        reclaimer.clone(),
        &option(1, 1, BackpressurePolicy::Inline),
    )
    .unwrap();

    // One item parks the worker, one fills the only slot; the rest cannot be queued.
    queue.submit(1);
    let_worker_park();
    for i in 2u64..=5 {
        queue.submit(i);
    }

    let inline = queue.stats().inline();
    assert!(inline >= 3, "expected at least 3 inline reclaims, got {inline}");
    assert_eq!(
        reclaimer.inner.items().len() as u64,
        inline,
        "inline reclaims complete before submit returns"
    );
    assert_eq!(queue.stats().blocked(), 0, "inline policy never blocks");

    reclaimer.open();
    wait_for_reclaim(queue.stats());

    let mut items = reclaimer.inner.items();
    items.sort_unstable();
    assert_eq!(items, vec![1, 2, 3, 4, 5], "every item reclaimed exactly once");
}

#[test]
fn block_policy_waits_for_a_free_slot() {
    let reclaimer = GatedReclaimer::new();
    let queue = ReclaimQueue::spawn(
        "block",
        reclaimer.clone(),
        &option(1, 1, BackpressurePolicy::Block),
    )
    .unwrap();

    queue.submit(1);
    let_worker_park();
    queue.submit(2);

    let done = AtomicBool::new(false);
    std::thread::scope(|scope| {
        let producer = scope.spawn(|| {
            queue.submit(3);
            done.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(100));
        assert!(
            !done.load(Ordering::SeqCst),
            "producer should be blocked on the full queue"
        );

        reclaimer.open();
        producer.join().unwrap();
    });

    wait_for_reclaim(queue.stats());
    let mut items = reclaimer.inner.items();
    items.sort_unstable();
    assert_eq!(items, vec![1, 2, 3]);
    assert_eq!(queue.stats().blocked(), 1);
    assert_eq!(queue.stats().inline(), 0, "block policy never reclaims inline");
}

#[test]
fn queue_without_workers_reclaims_inline() {
    let reclaimer = RecordingReclaimer::new();
    let queue = ReclaimQueue::spawn(
        "idle",
        reclaimer.clone(),
        &option(4, 0, BackpressurePolicy::Block),
    )
    .unwrap();

    queue.submit(7);
    queue.submit(8);

    assert_eq!(reclaimer.items(), vec![7, 8]);
    assert_eq!(queue.stats().inline(), 2);
    assert_eq!(queue.stats().pending(), 0);
}

#[derive(Clone)]
struct PanicOnThirteen {
    inner: RecordingReclaimer,
}

impl Reclaimer<u64> for PanicOnThirteen {
    fn reclaim(&mut self, item: u64) {
        assert!(item != 13, "unlucky item");
        self.inner.reclaim(item);
    }
}

#[test]
fn panicking_reclaimer_does_not_stop_the_worker() {
    let reclaimer = PanicOnThirteen {
        inner: RecordingReclaimer::new(),
    };
    let queue = ReclaimQueue::spawn(
        "panic",
        reclaimer.clone(),
        &option(8, 1, BackpressurePolicy::Block),
    )
    .unwrap();

    queue.submit(12);
    queue.submit(13);
    queue.submit(14);
    wait_for_reclaim(queue.stats());

    assert_eq!(reclaimer.inner.items(), vec![12, 14]);
    assert_eq!(queue.stats().reclaimed(), 3, "the panicked item still counts");
}

#[test]
fn pending_reflects_parked_work() {
    let reclaimer = GatedReclaimer::new();
    let queue = ReclaimQueue::spawn(
        "pending",
        reclaimer.clone(),
        &option(16, 1, BackpressurePolicy::Block),
    )
    .unwrap();

    assert_eq!(queue.stats().pending(), 0);
    for i in 0u64..4 {
        queue.submit(i);
    }
    assert_eq!(queue.stats().pending(), 4);

    reclaimer.open();
    wait_for_reclaim(queue.stats());
    assert_eq!(queue.stats().pending(), 0);
    assert_eq!(queue.depth(), 0);
}

#[derive(Clone)]
struct SlowReclaimer {
    inner: RecordingReclaimer,
}

impl Reclaimer<u64> for SlowReclaimer {
    fn reclaim(&mut self, item: u64) {
        std::thread::sleep(Duration::from_millis(300));
        self.inner.reclaim(item);
    }
}

#[test]
fn waiting_outlasts_a_slow_worker() {
    let reclaimer = SlowReclaimer {
        inner: RecordingReclaimer::new(),
    };
    let queue = ReclaimQueue::spawn(
        "slow",
        reclaimer.clone(),
        &option(8, 1, BackpressurePolicy::Block),
    )
    .unwrap();

    // Well over a second of work for the single worker.
    for i in 0u64..5 {
        queue.submit(i);
    }
    wait_for_reclaim(queue.stats());

    assert_eq!(reclaimer.inner.items(), vec![0, 1, 2, 3, 4]);
}
