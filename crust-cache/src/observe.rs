//! Observable state cells and lock helpers.
//!
//! Every piece of state the UI may react to (table length, key list, entity
//! revisions, index contents) lives in an [`Observable`], a thin wrapper over
//! a `tokio::sync::watch` sender. Readers take a snapshot or subscribe; writers
//! only notify when the value actually changes.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// A value with change notification.
#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            tx: watch::Sender::new(value),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.tx.borrow().clone()
    }

    /// Runs `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Stores `value`, notifying only if it differs from the current one.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Mutates in place; `f` returns whether anything changed.
    pub fn modify(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Mutates in place and always notifies.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl Observable<u64> {
    /// Bumps a revision counter.
    pub fn bump(&self) {
        self.tx.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Guards are only ever held for short synchronous sections, so a poisoned
/// lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
