//! [`Schedule`] – transmissions held back by an injected delay.
//!
//! Entries are kept ordered by due time; entries with the same due time keep
//! insertion order.  Nothing here touches controller state: rate limiting and
//! the braking flag are applied when an entry is actually transmitted.

use std::time::{Duration, Instant};

use pedguard_types::CommandPayload;

/// A payload waiting for its due time.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub due: Instant,
    pub payload: CommandPayload,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Schedule {
    queue: Vec<Pending>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, due: Instant, payload: CommandPayload, reason: impl Into<String>) {
        let at = self.queue.partition_point(|p| p.due <= due);
        self.queue.insert(
            at,
            Pending {
                due,
                payload,
                reason: reason.into(),
            },
        );
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.queue.first().map(|p| p.due)
    }

    /// How long the loop may block at `now` without missing a due entry.
    pub fn wait_budget(&self, now: Instant, ceiling: Duration) -> Duration {
        match self.next_due() {
            Some(due) => due.saturating_duration_since(now).min(ceiling),
            None => ceiling,
        }
    }

    /// Remove and return every entry due at or before `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<Pending> {
        let due = self.queue.partition_point(|p| p.due <= now);
        self.queue.drain(..due).collect()
    }

    /// Discard everything; returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
