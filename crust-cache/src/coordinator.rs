//! Per-table fetch batching.
//!
//! Identities requested through `Table::get` are collected while a debounce
//! timer runs; every restart of the timer pushes the flush out. When it fires
//! (or a caller forces a flush) the pending identities leave as one batch.
//!
//! ```text
//!   Idle ──enqueue──▶ Collecting ──take_batch──▶ Flushing ──settle──▶ Idle
//!                        ▲  │enqueue (restart timer)        │
//!                        └──┘                  enqueue ─────┘ (back to Collecting)
//! ```
//!
//! The coordinator owns no I/O; the table spawns the timer and the request
//! and reports back through [`FetchCoordinator::settle`].

use std::collections::HashSet;

use crust_types::RecordId;
use tokio::task::JoinHandle;

/// Where a table's fetch pipeline is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing pending, nothing in flight.
    Idle,
    /// Identities pending; a debounce timer may be running.
    Collecting,
    /// Batches in flight and nothing new pending.
    Flushing,
}

/// One outgoing list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub seq: u64,
    pub ids: Vec<RecordId>,
}

#[derive(Debug)]
pub struct FetchCoordinator {
    pending: Vec<RecordId>,
    queued: HashSet<RecordId>,
    timer: Option<JoinHandle<()>>,
    phase: Phase,
    next_seq: u64,
    outstanding: usize,
}

impl Default for FetchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            queued: HashSet::new(),
            timer: None,
            phase: Phase::Idle,
            next_seq: 0,
            outstanding: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Identities waiting for the next batch, in request order.
    pub fn pending(&self) -> &[RecordId] {
        &self.pending
    }

    /// Number of batches sent and not yet settled.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Adds an identity to the next batch. Returns `false` if it is already
    /// pending.
    pub fn enqueue(&mut self, id: RecordId) -> bool {
        if !self.queued.insert(id) {
            return false;
        }
        self.pending.push(id);
        self.phase = Phase::Collecting;
        true
    }

    /// Installs a new debounce timer, cancelling the previous one.
    pub fn arm(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Cancels the running debounce timer, if any.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Takes every pending identity as one batch.
    ///
    /// The timer handle is released without being aborted, so the timer task
    /// itself may call this.
    pub fn take_batch(&mut self) -> Option<Batch> {
        self.timer = None;
        if self.pending.is_empty() {
            return None;
        }
        self.queued.clear();
        let batch = Batch {
            seq: self.next_seq,
            ids: std::mem::take(&mut self.pending),
        };
        self.next_seq += 1;
        self.outstanding += 1;
        self.phase = Phase::Flushing;
        Some(batch)
    }

    /// Records that a batch finished, successfully or not.
    pub fn settle(&mut self, batch: &Batch) {
        debug_assert!(batch.seq < self.next_seq);
        self.outstanding = self.outstanding.saturating_sub(1);
        self.phase = if !self.pending.is_empty() {
            Phase::Collecting
        } else if self.outstanding > 0 {
            Phase::Flushing
        } else {
            Phase::Idle
        };
    }
}
