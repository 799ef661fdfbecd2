//! Undo journal with nested checkpoints
//!
//! A [`Journal`] is an append-only log of `(key, previous value)` records
//! owned by a store. Each key is recorded at most once per span between two
//! checkpoints; restoring to a checkpoint pops every record at or after it
//! and hands the previous values back to the owner, newest first.
//!
//! Positions are absolute: they keep counting across commits, so a
//! checkpoint taken before a commit can be told apart from a live one.

use crate::error::{StateError, StateResult};
use std::collections::HashMap;
use std::hash::Hash;

/// Initial capacity of journals and pending-write caches
pub const START_CAPACITY: usize = 1024;

/// Rollback boundary returned by [`Journal::checkpoint`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    /// Start of the uncommitted journal, before any pending write
    Origin,
    /// Absolute journal position
    At(usize),
}

impl Checkpoint {
    /// Absolute position, if this is not [`Checkpoint::Origin`]
    pub fn position(&self) -> Option<usize> {
        match self {
            Checkpoint::Origin => None,
            Checkpoint::At(position) => Some(*position),
        }
    }
}

#[derive(Debug)]
struct JournalEntry<K, V> {
    key: K,
    previous: V,
    /// Position of the key's previous record, if any
    shadowed: Option<usize>,
}

/// Generic undo log keyed by `K`, remembering values of type `V`
#[derive(Debug)]
pub struct Journal<K, V> {
    entries: Vec<JournalEntry<K, V>>,
    /// Absolute position of `entries[0]`
    base: usize,
    /// Position of the most recent checkpoint (or restore target)
    span_start: usize,
    /// Newest record position per key
    latest: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone, V> Journal<K, V> {
    /// Create an empty journal
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(START_CAPACITY),
            base: 0,
            span_start: 0,
            latest: HashMap::with_capacity(START_CAPACITY),
        }
    }

    /// Absolute length, including committed records
    pub fn len(&self) -> usize {
        self.base + self.entries.len()
    }

    /// Number of uncommitted records
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no uncommitted records
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take a checkpoint at the current length and open a new dirty span
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.span_start = self.len();
        Checkpoint::At(self.span_start)
    }

    /// Whether `key` already has a record in the current dirty span
    pub fn is_recorded(&self, key: &K) -> bool {
        self.latest
            .get(key)
            .is_some_and(|&position| position >= self.span_start)
    }

    /// Record the value `key` held before its first write in this span.
    ///
    /// Returns `false` (and drops `previous`) when the key is already
    /// recorded in the current span.
    pub fn record(&mut self, key: K, previous: V) -> bool {
        if self.is_recorded(&key) {
            return false;
        }
        let position = self.len();
        let shadowed = self.latest.insert(key.clone(), position);
        self.entries.push(JournalEntry {
            key,
            previous,
            shadowed,
        });
        true
    }

    /// Undo every record at or after `checkpoint`, newest first.
    ///
    /// `apply` receives each key with the value it held before the record.
    /// Returns the number of records undone.
    pub fn restore<F>(&mut self, checkpoint: Checkpoint, mut apply: F) -> StateResult<usize>
    where
        F: FnMut(K, V),
    {
        let target = self.resolve(checkpoint)?;
        let keep = target - self.base;
        let mut undone = 0;

        while self.entries.len() > keep {
            let Some(entry) = self.entries.pop() else {
                break;
            };
            match entry.shadowed.filter(|&position| position >= self.base) {
                Some(position) => {
                    self.latest.insert(entry.key.clone(), position);
                }
                None => {
                    self.latest.remove(&entry.key);
                }
            }
            apply(entry.key, entry.previous);
            undone += 1;
        }

        self.span_start = target;
        tracing::trace!(target = target, undone = undone, "journal restored");
        Ok(undone)
    }

    /// Make every record below `up_to` permanent without reapplying it
    pub fn commit(&mut self, up_to: Checkpoint) -> StateResult<usize> {
        let target = self.resolve(up_to)?;
        let count = target - self.base;

        for (offset, entry) in self.entries.drain(..count).enumerate() {
            let position = self.base + offset;
            if self.latest.get(&entry.key) == Some(&position) {
                self.latest.remove(&entry.key);
            }
        }

        self.base = target;
        self.span_start = self.span_start.max(self.base);
        tracing::trace!(committed = count, base = self.base, "journal committed");
        Ok(count)
    }

    /// Make every record permanent
    pub fn commit_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.latest.clear();
        self.base += count;
        self.span_start = self.base;
        count
    }

    /// Forget all uncommitted records without reapplying them
    pub fn reset(&mut self) {
        self.commit_all();
    }

    fn resolve(&self, checkpoint: Checkpoint) -> StateResult<usize> {
        match checkpoint {
            Checkpoint::Origin => Ok(self.base),
            Checkpoint::At(position) if position > self.len() => {
                Err(StateError::UnknownCheckpoint {
                    checkpoint: position,
                    len: self.len(),
                })
            }
            Checkpoint::At(position) if position < self.base => {
                Err(StateError::CheckpointCommitted {
                    checkpoint: position,
                    base: self.base,
                })
            }
            Checkpoint::At(position) => Ok(position),
        }
    }
}

impl<K: Eq + Hash + Clone, V> Default for Journal<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
