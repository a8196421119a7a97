//! Integration tests for the Submission Queue
//!
//! Tests cover:
//! - Submission order equals execution order
//! - Backpressure at capacity
//! - Worker survival after failing actions
//! - Shutdown draining, idempotence and throttle release
//! - Interrupted drain waits and Ctrl+C outside them

use crate::integration::{
    create_test_queue, create_test_registry, fast_queue_config, wait_until, EventLog,
    ScriptedPrompt, TEST_PID,
};
use crossbeam::channel;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use wikibot::config::WikiConfig;
use wikibot::error::QueueError;
use wikibot::queue::{
    QueueConfig, QueueState, ShutdownGuard, ShutdownOutcome, SubmissionQueue, WORKER_THREAD_NAME,
};
use wikibot::site::SiteRegistry;
use wikibot::throttle::Throttle;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_actions_run_in_submission_order() {
    let (queue, _registry, _log) = create_test_queue(4, ScriptedPrompt::default());
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..20 {
        let seen = Arc::clone(&seen);
        queue
            .enqueue(format!("save {}", i), move || {
                seen.lock().push(i);
                Ok::<(), String>(())
            })
            .unwrap();
    }

    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
    assert_eq!(*seen.lock(), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_shutdown_releases_throttle_after_last_action() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let throttle = Arc::new(Throttle::new(
        TEST_PID,
        Duration::ZERO,
        Arc::new(EventLog::new(Arc::clone(&events))),
    ));
    let registry = Arc::new(SiteRegistry::new(Arc::new(WikiConfig::default()), throttle));
    registry.site(Some("en"), None, None, None, None).unwrap();
    let queue = SubmissionQueue::new(fast_queue_config(8), registry)
        .with_prompt(ScriptedPrompt::default());

    for name in ["a1", "a2", "a3"] {
        let events = Arc::clone(&events);
        queue
            .enqueue(name, move || {
                events.lock().push(name.to_string());
                Ok::<(), String>(())
            })
            .unwrap();
    }

    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
    assert_eq!(
        *events.lock(),
        vec!["register 4242", "a1", "a2", "a3", "drop 4242"]
    );
    assert_eq!(queue.state(), QueueState::Stopped);
}

#[test]
fn test_shutdown_is_idempotent() {
    let (queue, _registry, log) = create_test_queue(4, ScriptedPrompt::default());
    queue.enqueue("save", || Ok::<(), String>(())).unwrap();

    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::AlreadyStopped);
    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::AlreadyStopped);
    assert_eq!(log.drops(), vec![TEST_PID]);
}

#[test]
fn test_shutdown_without_sites_releases_nothing() {
    let (registry, log) = create_test_registry(Duration::ZERO);
    let queue = SubmissionQueue::new(fast_queue_config(4), registry)
        .with_prompt(ScriptedPrompt::default());
    queue.enqueue("noop", || Ok::<(), String>(())).unwrap();

    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
    assert!(log.drops().is_empty());
}

#[test]
fn test_enqueue_blocks_at_capacity() {
    let (queue, _registry, _log) = create_test_queue(1, ScriptedPrompt::default());
    let queue = Arc::new(queue);
    let (gate_tx, gate_rx) = channel::bounded::<()>(0);

    let first = queue
        .enqueue("blocked", move || {
            gate_rx.recv().map_err(|e| e.to_string())
        })
        .unwrap();
    // Worker holds the first action, so the next one fills the queue.
    assert!(wait_until(WAIT, || queue.is_empty()));
    let second = queue.enqueue("queued", || Ok::<(), String>(())).unwrap();

    let enqueued = Arc::new(AtomicBool::new(false));
    let submitter = {
        let queue = Arc::clone(&queue);
        let enqueued = Arc::clone(&enqueued);
        thread::spawn(move || {
            let third = queue.enqueue("waiting", || Ok::<(), String>(())).unwrap();
            enqueued.store(true, Ordering::SeqCst);
            third.wait()
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!enqueued.load(Ordering::SeqCst));

    gate_tx.send(()).unwrap();
    assert_eq!(first.wait(), Ok(()));
    assert_eq!(second.wait(), Ok(()));
    assert_eq!(submitter.join().unwrap(), Ok(()));
    assert!(enqueued.load(Ordering::SeqCst));
    queue.shutdown().unwrap();
}

#[test]
fn test_actions_never_overlap() {
    let (queue, _registry, _log) = create_test_queue(2, ScriptedPrompt::default());
    let queue = Arc::new(queue);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let queue = Arc::clone(&queue);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            thread::spawn(move || {
                for i in 0..10 {
                    let in_flight = Arc::clone(&in_flight);
                    let max_in_flight = Arc::clone(&max_in_flight);
                    queue
                        .enqueue(format!("t{}-{}", t, i), move || {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_in_flight.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(1));
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            Ok::<(), String>(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

#[test]
fn test_actions_run_on_put_thread() {
    let (queue, _registry, _log) = create_test_queue(4, ScriptedPrompt::default());
    let name = Arc::new(Mutex::new(None));
    let recorded = Arc::clone(&name);
    queue
        .enqueue("whoami", move || {
            *recorded.lock() = thread::current().name().map(str::to_string);
            Ok::<(), String>(())
        })
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(name.lock().as_deref(), Some(WORKER_THREAD_NAME));
    queue.shutdown().unwrap();
}

#[test]
fn test_failures_do_not_stop_worker() {
    let (queue, _registry, _log) = create_test_queue(4, ScriptedPrompt::default());
    let ran = Arc::new(AtomicUsize::new(0));

    let failed = queue
        .enqueue("save Locked", || Err::<(), _>("page is protected"))
        .unwrap();
    let panicked = queue
        .enqueue("save Broken", || -> Result<(), String> {
            panic!("unexpected response")
        })
        .unwrap();
    let counter = Arc::clone(&ran);
    let succeeded = queue
        .enqueue("save Fine", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        })
        .unwrap();

    assert!(matches!(failed.wait(), Err(QueueError::Execution { .. })));
    assert!(matches!(panicked.wait(), Err(QueueError::Panicked { .. })));
    assert_eq!(succeeded.wait(), Ok(()));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
}

#[test]
fn test_enqueue_after_shutdown_is_rejected() {
    let (queue, _registry, _log) = create_test_queue(4, ScriptedPrompt::default());
    queue.enqueue("early", || Ok::<(), String>(())).unwrap();
    queue.shutdown().unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let result = queue.enqueue("late", move || {
        flag.store(true, Ordering::SeqCst);
        Ok::<(), String>(())
    });
    assert_eq!(result.unwrap_err(), QueueError::Closed);
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_shutdown_reports_remaining() {
    let prompt = ScriptedPrompt::default();
    // The registry throttle is slower; queued writes follow the queue's own setting.
    let (registry, _log) = create_test_registry(Duration::from_secs(30));
    registry.site(None, None, None, None, None).unwrap();
    let config = QueueConfig {
        put_throttle: 0.01,
        ..fast_queue_config(8)
    };
    let queue = SubmissionQueue::new(config, registry).with_prompt(prompt.clone());
    let (gate_tx, gate_rx) = channel::bounded::<()>(0);

    queue
        .enqueue("blocked", move || gate_rx.recv().map_err(|e| e.to_string()))
        .unwrap();
    assert!(wait_until(WAIT, || queue.is_empty()));
    queue.enqueue("second", || Ok::<(), String>(())).unwrap();
    queue.enqueue("third", || Ok::<(), String>(())).unwrap();

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        gate_tx.send(()).unwrap();
    });
    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
    releaser.join().unwrap();

    let reports = prompt.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].pending, 2);
    assert_eq!(reports[0].estimate, Duration::from_millis(20));
    assert_eq!(prompt.confirms(), 0);
}

#[test]
fn test_state_is_readable_while_a_submitter_is_blocked() {
    let (queue, _registry, _log) = create_test_queue(1, ScriptedPrompt::default());
    let queue = Arc::new(queue);
    let (gate_tx, gate_rx) = channel::bounded::<()>(0);

    let observed = Arc::new(Mutex::new(None));
    let first = {
        let inner = Arc::clone(&queue);
        let observed = Arc::clone(&observed);
        queue
            .enqueue("inspect", move || {
                gate_rx.recv().map_err(|e| e.to_string())?;
                *observed.lock() = Some((inner.state(), format!("{:?}", inner)));
                Ok::<(), String>(())
            })
            .unwrap()
    };
    assert!(wait_until(WAIT, || queue.is_empty()));
    let second = queue.enqueue("fills queue", || Ok::<(), String>(())).unwrap();

    let enqueued = Arc::new(AtomicBool::new(false));
    let submitter = {
        let queue = Arc::clone(&queue);
        let enqueued = Arc::clone(&enqueued);
        thread::spawn(move || {
            let third = queue.enqueue("blocked", || Ok::<(), String>(())).unwrap();
            enqueued.store(true, Ordering::SeqCst);
            third.wait()
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!enqueued.load(Ordering::SeqCst));
    assert_eq!(queue.state(), QueueState::Running);

    gate_tx.send(()).unwrap();
    assert_eq!(first.wait_timeout(WAIT), Some(Ok(())));
    let (state, rendered) = observed.lock().take().unwrap();
    assert_eq!(state, QueueState::Running);
    assert!(rendered.contains("SubmissionQueue"), "{}", rendered);

    assert_eq!(second.wait(), Ok(()));
    assert_eq!(submitter.join().unwrap(), Ok(()));
    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
}

#[test]
fn test_ctrlc_outside_drain_wait_drains_through_guard() {
    let prompt = ScriptedPrompt::answering(false);
    let (queue, _registry, log) = create_test_queue(4, prompt.clone());
    let queue = Arc::new(queue);
    let interrupt = queue.interrupt_flag().clone();
    let (gate_tx, gate_rx) = channel::bounded::<()>(0);
    let ran = Arc::new(AtomicUsize::new(0));

    let guard = ShutdownGuard::new(Arc::clone(&queue));
    {
        let ran = Arc::clone(&ran);
        queue
            .enqueue("save Sandbox", move || {
                gate_rx.recv().map_err(|e| e.to_string())?;
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            })
            .unwrap();
    }
    {
        let ran = Arc::clone(&ran);
        queue
            .enqueue("save Other", move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            })
            .unwrap();
    }

    // First Ctrl+C: no exit, no new work, queued work still runs.
    interrupt.signal();
    assert!(interrupt.shutdown_requested());
    assert_eq!(
        queue.enqueue("late", || Ok::<(), String>(())).unwrap_err(),
        QueueError::Closed
    );

    // Second Ctrl+C lands in the drain wait and asks the operator.
    let operator = {
        let interrupt = interrupt.clone();
        let prompt = prompt.clone();
        thread::spawn(move || {
            assert!(wait_until(WAIT, || interrupt.is_armed()));
            interrupt.signal();
            assert!(wait_until(WAIT, || prompt.confirms() == 1));
            gate_tx.send(()).unwrap();
        })
    };
    drop(guard);
    operator.join().unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(log.drops(), vec![TEST_PID]);
    assert_eq!(queue.state(), QueueState::Stopped);
    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::AlreadyStopped);
}

#[test]
fn test_declined_interrupt_keeps_waiting() {
    let prompt = ScriptedPrompt::answering(false);
    let (queue, _registry, log) = create_test_queue(4, prompt.clone());
    let queue = Arc::new(queue);
    let (gate_tx, gate_rx) = channel::bounded::<()>(0);

    queue
        .enqueue("blocked", move || gate_rx.recv().map_err(|e| e.to_string()))
        .unwrap();

    let operator = {
        let queue = Arc::clone(&queue);
        let prompt = prompt.clone();
        thread::spawn(move || {
            assert!(wait_until(WAIT, || queue.interrupt_flag().is_armed()));
            queue.interrupt_flag().raise();
            assert!(wait_until(WAIT, || prompt.confirms() == 1));
            gate_tx.send(()).unwrap();
        })
    };

    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
    operator.join().unwrap();
    assert_eq!(prompt.confirms(), 1);
    assert_eq!(log.drops(), vec![TEST_PID]);
    assert!(!queue.interrupt_flag().is_armed());
}

#[test]
fn test_confirmed_interrupt_abandons_wait() {
    let prompt = ScriptedPrompt::answering(true);
    let (queue, _registry, log) = create_test_queue(4, prompt.clone());
    let queue = Arc::new(queue);
    let (gate_tx, gate_rx) = channel::bounded::<()>(0);

    queue
        .enqueue("blocked", move || gate_rx.recv().map_err(|e| e.to_string()))
        .unwrap();
    assert!(wait_until(WAIT, || queue.is_empty()));
    let pending = queue.enqueue("pending", || Ok::<(), String>(())).unwrap();

    let operator = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            assert!(wait_until(WAIT, || queue.interrupt_flag().is_armed()));
            queue.interrupt_flag().raise();
        })
    };

    assert_eq!(
        queue.shutdown().unwrap(),
        ShutdownOutcome::Abandoned { remaining: 1 }
    );
    operator.join().unwrap();
    assert!(log.drops().is_empty());
    assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::AlreadyStopped);

    // The worker keeps draining in the background and releases on exit.
    gate_tx.send(()).unwrap();
    assert_eq!(pending.wait(), Ok(()));
    assert!(wait_until(WAIT, || log.drops() == vec![TEST_PID]));
    assert!(wait_until(WAIT, || queue.state() == QueueState::Stopped));
}

#[test]
fn test_shutdown_guard_drains_on_drop() {
    let (queue, _registry, log) = create_test_queue(4, ScriptedPrompt::default());
    let queue = Arc::new(queue);
    let ran = Arc::new(AtomicUsize::new(0));

    {
        let guard = ShutdownGuard::new(Arc::clone(&queue));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            guard
                .queue()
                .enqueue("save", move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                })
                .unwrap();
        }
    }

    assert_eq!(ran.load(Ordering::SeqCst), 3);
    assert_eq!(queue.state(), QueueState::Stopped);
    assert_eq!(log.drops(), vec![TEST_PID]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_execution_order_matches_submission(
        values in prop::collection::vec(any::<u16>(), 0..40),
        capacity in 0usize..4,
    ) {
        let (queue, _registry, _log) = create_test_queue(capacity, ScriptedPrompt::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for value in values.iter().copied() {
            let seen = Arc::clone(&seen);
            queue
                .enqueue("record", move || {
                    seen.lock().push(value);
                    Ok::<(), String>(())
                })
                .unwrap();
        }
        prop_assert_eq!(queue.shutdown().unwrap(), ShutdownOutcome::Drained);
        prop_assert_eq!(&*seen.lock(), &values);
    }
}
