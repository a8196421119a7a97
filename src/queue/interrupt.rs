//! Operator interruption observed while waiting for the queue to drain.

use crate::error::WikiError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Default)]
struct Flags {
    /// A drain wait is in progress and wants to see interruptions
    armed: AtomicBool,
    /// An interruption arrived and has not been handled yet
    raised: AtomicBool,
    /// The operator asked the process to wind down
    shutdown_requested: AtomicBool,
}

/// Shared interruption flag between a signal handler and `SubmissionQueue::shutdown`
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    flags: Arc<Flags>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interruption
    pub fn raise(&self) {
        self.flags.raised.store(true, Ordering::SeqCst);
    }

    /// Consume a pending interruption, if any
    pub fn take(&self) -> bool {
        self.flags.raised.swap(false, Ordering::SeqCst)
    }

    /// Ask the process to stop taking new work and shut down through its guard
    pub fn request_shutdown(&self) {
        self.flags.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.flags.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Deliver one Ctrl+C.
    ///
    /// During a drain wait this is an interruption the wait observes. Otherwise it
    /// requests a shutdown, which the queue's guard then carries out.
    pub fn signal(&self) {
        if self.is_armed() {
            self.raise();
        } else if !self.flags.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Interrupted; finishing queued writes before exit");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.flags.armed.load(Ordering::SeqCst)
    }

    pub(crate) fn arm(&self) {
        self.flags.raised.store(false, Ordering::SeqCst);
        self.flags.armed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn disarm(&self) {
        self.flags.armed.store(false, Ordering::SeqCst);
    }

    /// Route Ctrl+C to [`InterruptFlag::signal`]
    pub fn install_ctrlc_handler(&self) -> Result<(), WikiError> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.signal())
            .map_err(|e| WikiError::ConfigError(format!("Failed to set Ctrl+C handler: {}", e)))
    }
}
