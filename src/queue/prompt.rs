//! Operator-facing drain reports and the abandon-wait confirmation.

use owo_colors::OwoColorize;
use std::fmt;
use std::time::Duration;

/// Work still waiting in the queue and how long it should take to push through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub pending: usize,
    pub estimate: Duration,
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.estimate.as_secs();
        write!(
            f,
            "{} pending, estimated time remaining {}:{:02}:{:02}",
            self.pending,
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}

/// How shutdown talks to the operator
pub trait DrainPrompt: Send + Sync {
    /// Announce that shutdown is waiting for queued work
    fn report(&self, remaining: Remaining);

    /// Ask whether to stop waiting after an interruption. `false` keeps waiting.
    fn confirm_abandon(&self, remaining: Remaining) -> bool;
}

/// Terminal prompt backed by `dialoguer`
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl DrainPrompt for TerminalPrompt {
    fn report(&self, remaining: Remaining) {
        eprintln!(
            "{} {}",
            "Waiting for queued submissions:".bold(),
            remaining.yellow()
        );
    }

    fn confirm_abandon(&self, remaining: Remaining) -> bool {
        use dialoguer::Confirm;
        Confirm::new()
            .with_prompt(format!(
                "There are {} submissions remaining in the queue ({}). Really exit?",
                remaining.pending, remaining
            ))
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

/// Prompt that never asks: reports go to the log and interruptions are ignored
#[derive(Debug, Default)]
pub struct NonInteractive;

impl DrainPrompt for NonInteractive {
    fn report(&self, remaining: Remaining) {
        tracing::info!(
            pending = remaining.pending,
            estimate_secs = remaining.estimate.as_secs(),
            "Waiting for queued submissions"
        );
    }

    fn confirm_abandon(&self, _remaining: Remaining) -> bool {
        false
    }
}
