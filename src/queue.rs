//! Submission Queue
//!
//! Deferred, strictly serialized execution of write actions. Submissions go into a
//! bounded FIFO drained by one dedicated worker thread (`put-thread`), started lazily
//! on the first submission. Shutdown appends a stop entry, waits for the worker with a
//! polling timeout so an operator interruption can be noticed, and finally drops the
//! process from the throttle log.
//!
//! Execution failures are logged and reported on the submission's own completion
//! channel; they never reach the submitting call and never stop the worker.

use crate::error::{QueueError, WikiError};
use crate::site::SiteRegistry;
use crate::throttle::Throttle;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

mod interrupt;
mod prompt;

pub use interrupt::InterruptFlag;
pub use prompt::{DrainPrompt, NonInteractive, Remaining, TerminalPrompt};

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "put-thread";

/// Configuration for the submission queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Minimum seconds between two queued writes; also drives the drain estimate
    #[serde(default = "default_put_throttle")]
    pub put_throttle: f64,

    /// Queue capacity; enqueue blocks when full. 0 means unbounded.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// How often shutdown wakes up to check for interruptions (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_put_throttle() -> f64 {
    10.0
}

fn default_max_queue_size() -> usize {
    64
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            put_throttle: default_put_throttle(),
            max_queue_size: default_max_queue_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Gap the worker keeps between two queued writes
    pub fn put_delay(&self) -> Duration {
        if self.put_throttle > 0.0 {
            Duration::try_from_secs_f64(self.put_throttle).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    /// Time needed to push `pending` writes through at `put_delay`
    pub fn drain_estimate(&self, pending: usize) -> Duration {
        self.put_delay()
            .saturating_mul(u32::try_from(pending).unwrap_or(u32::MAX))
    }
}

/// Lifecycle of the queue. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueueState {
    NotStarted,
    Running,
    Draining,
    Stopped,
}

impl QueueState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Submission ID for log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(u64);

impl SubmissionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

type Action = Box<dyn FnOnce() -> Result<(), String> + Send + 'static>;

struct WorkItem {
    id: SubmissionId,
    label: String,
    action: Action,
    completion: Sender<Result<(), QueueError>>,
}

enum QueueEntry {
    Work(WorkItem),
    /// No further work follows; the worker exits when it reads this
    Stop,
}

/// Handle to one queued action and its outcome.
///
/// Dropping it is fine: the queue is fire-and-forget unless the caller asks.
#[derive(Debug)]
pub struct Submission {
    id: SubmissionId,
    label: String,
    receiver: Receiver<Result<(), QueueError>>,
}

impl Submission {
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Block until the action has run
    pub fn wait(self) -> Result<(), QueueError> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(QueueError::Dropped(self.label.clone())))
    }

    /// Block up to `timeout`; `None` if the action has not run yet
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), QueueError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(QueueError::Dropped(self.label.clone()))),
        }
    }

    /// Outcome if the action has already run
    pub fn try_result(&self) -> Option<Result<(), QueueError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(QueueError::Dropped(self.label.clone()))),
        }
    }
}

/// Result of [`SubmissionQueue::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Everything submitted before shutdown ran and the throttle was released
    Drained,
    /// The operator stopped waiting; the worker keeps draining in the background
    Abandoned { remaining: usize },
    /// An earlier call already shut the queue down
    AlreadyStopped,
}

#[derive(Default)]
struct Worker {
    handle: Option<JoinHandle<()>>,
    exited: Option<Receiver<()>>,
}

#[derive(Default)]
struct ExitState {
    worker_done: bool,
    abandoned: bool,
}

/// State shared with the worker thread
struct Shared {
    pending: AtomicUsize,
    exit: Mutex<ExitState>,
    registry: Arc<SiteRegistry>,
}

impl Shared {
    fn release_throttle(&self) {
        if let Err(e) = self.registry.release_throttle() {
            error!(error = %e, "Failed to drop process from throttle log");
        }
    }
}

/// Bounded, single-worker submission queue
pub struct SubmissionQueue {
    config: QueueConfig,
    sender: Sender<QueueEntry>,
    receiver: Receiver<QueueEntry>,
    state: AtomicU8,
    /// Cleared by shutdown. Submitters hold a read guard across their send, so once
    /// shutdown owns the write guard no work can land behind the stop entry.
    accepting: RwLock<bool>,
    worker: Mutex<Worker>,
    shutdown_done: Mutex<bool>,
    shared: Arc<Shared>,
    prompt: Box<dyn DrainPrompt>,
    interrupt: InterruptFlag,
    next_id: AtomicU64,
}

impl SubmissionQueue {
    /// Create a queue that asks the operator on the terminal when interrupted
    pub fn new(config: QueueConfig, registry: Arc<SiteRegistry>) -> Self {
        let (sender, receiver) = if config.max_queue_size == 0 {
            channel::unbounded()
        } else {
            channel::bounded(config.max_queue_size)
        };
        Self {
            config,
            sender,
            receiver,
            state: AtomicU8::new(QueueState::NotStarted as u8),
            accepting: RwLock::new(true),
            worker: Mutex::new(Worker::default()),
            shutdown_done: Mutex::new(false),
            shared: Arc::new(Shared {
                pending: AtomicUsize::new(0),
                exit: Mutex::new(ExitState::default()),
                registry,
            }),
            prompt: Box::new(TerminalPrompt),
            interrupt: InterruptFlag::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the operator prompt
    pub fn with_prompt(mut self, prompt: impl DrainPrompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    /// Share an interruption flag, e.g. one fed by a Ctrl+C handler
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt_flag(&self) -> &InterruptFlag {
        &self.interrupt
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.shared.registry
    }

    /// Current lifecycle state; never waits on a blocked submitter
    pub fn state(&self) -> QueueState {
        let state = QueueState::from_u8(self.state.load(Ordering::SeqCst));
        if state == QueueState::Draining && self.shared.exit.lock().worker_done {
            QueueState::Stopped
        } else {
            state
        }
    }

    fn set_state(&self, state: QueueState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Number of queued submissions not yet picked up by the worker
    pub fn len(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued submissions and the estimated time to push them through at `put_throttle`
    pub fn remaining(&self) -> Remaining {
        let pending = self.len();
        Remaining {
            pending,
            estimate: self.config.drain_estimate(pending),
        }
    }

    /// Queue `action` for execution on the worker thread.
    ///
    /// Blocks while the queue is at capacity. Starts the worker on first use. Fails
    /// with [`QueueError::Closed`] once shutdown has begun or the operator asked the
    /// process to stop. An action must not submit to its own queue while that queue
    /// is full.
    pub fn enqueue<F, E>(&self, label: impl Into<String>, action: F) -> Result<Submission, QueueError>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let label = label.into();
        let id = SubmissionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (completion, receiver) = channel::bounded(1);
        let item = WorkItem {
            id,
            label: label.clone(),
            action: Box::new(move || action().map_err(|e| e.to_string())),
            completion,
        };

        // Recursive so a queued action can still submit while shutdown waits for
        // the write guard behind a blocked submitter.
        let accepting = self.accepting.read_recursive();
        if !*accepting || self.interrupt.shutdown_requested() {
            warn!(label = %label, "Submission rejected: queue is shutting down");
            return Err(QueueError::Closed);
        }
        if self.state() == QueueState::NotStarted {
            self.start_worker()?;
        }

        let pending = self.shared.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if self.sender.send(QueueEntry::Work(item)).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        drop(accepting);

        debug!(
            submission = id.as_u64(),
            label = %label,
            pending,
            "Enqueued submission"
        );
        Ok(Submission {
            id,
            label,
            receiver,
        })
    }

    fn start_worker(&self) -> Result<(), QueueError> {
        let mut worker = self.worker.lock();
        if self.state() != QueueState::NotStarted {
            return Ok(());
        }
        let receiver = self.receiver.clone();
        let shared = Arc::clone(&self.shared);
        let put_delay = self.config.put_delay();
        let (exited_tx, exited_rx) = channel::bounded::<()>(0);

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || Self::worker_loop(receiver, shared, put_delay, exited_tx))
            .map_err(|e| QueueError::Spawn(e.to_string()))?;

        worker.handle = Some(handle);
        worker.exited = Some(exited_rx);
        self.set_state(QueueState::Running);
        info!(
            capacity = self.config.max_queue_size,
            put_throttle = self.config.put_throttle,
            "Started put-thread"
        );
        Ok(())
    }

    /// Worker loop. `_exited` is dropped on return, which is what shutdown waits for.
    fn worker_loop(
        receiver: Receiver<QueueEntry>,
        shared: Arc<Shared>,
        put_delay: Duration,
        _exited: Sender<()>,
    ) {
        debug!("Put-thread running");
        let throttle = Arc::clone(shared.registry.throttle());

        while let Ok(entry) = receiver.recv() {
            match entry {
                QueueEntry::Stop => {
                    debug!("Stop entry received");
                    break;
                }
                QueueEntry::Work(item) => {
                    shared.pending.fetch_sub(1, Ordering::SeqCst);
                    Self::execute(item, &throttle, put_delay);
                }
            }
        }

        let mut exit = shared.exit.lock();
        exit.worker_done = true;
        if exit.abandoned {
            // Shutdown stopped waiting, so the release falls to the worker.
            shared.release_throttle();
        }
        drop(exit);
        debug!("Put-thread stopped");
    }

    fn execute(item: WorkItem, throttle: &Throttle, put_delay: Duration) {
        let WorkItem {
            id,
            label,
            action,
            completion,
        } = item;

        throttle.wait_at_least(put_delay);
        let start = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(QueueError::Execution {
                label: label.clone(),
                message,
            }),
            Err(payload) => Err(QueueError::Panicked {
                label: label.clone(),
                message: panic_message(payload.as_ref()),
            }),
        };

        match &result {
            Ok(()) => debug!(
                submission = id.as_u64(),
                label = %label,
                duration_ms = start.elapsed().as_millis(),
                "Submission completed"
            ),
            Err(err) => error!(
                submission = id.as_u64(),
                label = %label,
                duration_ms = start.elapsed().as_millis(),
                error = %err,
                "Submission failed"
            ),
        }
        let _ = completion.send(result);
    }

    /// Drain the queue, stop the worker and drop the process from the throttle log.
    ///
    /// Only the first call does anything. Waiting polls every `poll_interval_ms` for an
    /// interruption; when the operator then confirms, this returns
    /// [`ShutdownOutcome::Abandoned`] while the worker finishes in the background.
    pub fn shutdown(&self) -> Result<ShutdownOutcome, WikiError> {
        let mut done = self.shutdown_done.lock();
        if *done {
            return Ok(ShutdownOutcome::AlreadyStopped);
        }
        debug!("shutdown() called");

        // Waits out submitters mid-send; later ones see the cleared flag.
        *self.accepting.write() = false;

        if self.state() != QueueState::NotStarted {
            self.set_state(QueueState::Draining);
            let remaining = self.remaining();
            if remaining.pending > 0 {
                self.prompt.report(remaining);
            }
            self.sender
                .send(QueueEntry::Stop)
                .map_err(|_| QueueError::Closed)?;

            let exited = self.worker.lock().exited.take();
            if let Some(exited) = exited {
                if let Some(remaining) = self.wait_for_worker(&exited) {
                    *done = true;
                    return Ok(self.abandon(remaining));
                }
            }
            let handle = self.worker.lock().handle.take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!("Put-thread terminated abnormally");
                }
            }
        }

        self.set_state(QueueState::Stopped);
        *done = true;
        self.shared.registry.release_throttle()?;
        info!("Submission queue stopped");
        Ok(ShutdownOutcome::Drained)
    }

    /// Wait for the worker to exit. Returns the pending count if the operator gave up.
    fn wait_for_worker(&self, exited: &Receiver<()>) -> Option<usize> {
        let poll = self.config.poll_interval();
        self.interrupt.arm();
        let outcome = loop {
            match exited.recv_timeout(poll) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break None,
                Err(RecvTimeoutError::Timeout) => {
                    if !self.interrupt.take() {
                        continue;
                    }
                    let remaining = self.remaining();
                    warn!(
                        pending = remaining.pending,
                        "Interrupted while waiting for the submission queue"
                    );
                    if self.prompt.confirm_abandon(remaining) {
                        break Some(remaining.pending);
                    }
                }
            }
        };
        self.interrupt.disarm();
        outcome
    }

    fn abandon(&self, remaining: usize) -> ShutdownOutcome {
        let mut exit = self.shared.exit.lock();
        exit.abandoned = true;
        if exit.worker_done {
            self.shared.release_throttle();
        }
        drop(exit);
        warn!(
            remaining,
            "Stopped waiting; put-thread keeps draining in the background"
        );
        ShutdownOutcome::Abandoned { remaining }
    }
}

impl fmt::Debug for SubmissionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionQueue")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("pending", &self.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Shuts the queue down when the owning scope ends
pub struct ShutdownGuard {
    queue: Arc<SubmissionQueue>,
}

impl ShutdownGuard {
    pub fn new(queue: Arc<SubmissionQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<SubmissionQueue> {
        &self.queue
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        match self.queue.shutdown() {
            Ok(outcome) => debug!(?outcome, "Shutdown guard released"),
            Err(e) => error!(error = %e, "Shutdown from guard failed"),
        }
    }
}
