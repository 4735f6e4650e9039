//! Resumable batch progress.
//!
//! A [`Checkpoint`] is the whole state of a multi-invocation fetch run: the
//! ordered id list and a progress map holding one [`FetchedTemplate`] per id
//! that has been attempted. Entries are only ever added, so a checkpoint
//! persisted after each id can be reloaded at any point and the run resumed
//! without re-fetching anything.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::template::FetchedTemplate;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    ids: Vec<String>,
    progress: BTreeMap<String, FetchedTemplate>,
}

impl Checkpoint {
    /// Start a run over `ids`. Duplicate ids are dropped, keeping the first.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        let mut dropped = 0usize;
        for id in ids {
            let id = id.into();
            if seen.insert(id.clone()) {
                unique.push(id);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, "duplicate ids dropped from checkpoint");
        }
        Self {
            ids: unique,
            progress: BTreeMap::new(),
        }
    }

    /// Rebuild a checkpoint from an id list and a previously persisted
    /// progress map. Entries for ids outside the list are kept but ignored
    /// by the counts.
    pub fn resume(ids: Vec<String>, progress: BTreeMap<String, FetchedTemplate>) -> Self {
        let mut cp = Self::new(ids);
        cp.progress = progress;
        cp
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn progress(&self) -> &BTreeMap<String, FetchedTemplate> {
        &self.progress
    }

    pub fn into_progress(self) -> BTreeMap<String, FetchedTemplate> {
        self.progress
    }

    pub fn get(&self, id: &str) -> Option<&FetchedTemplate> {
        self.progress.get(id)
    }

    /// Ids not yet attempted, in list order.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.ids
            .iter()
            .filter(|id| !self.progress.contains_key(id.as_str()))
            .map(String::as_str)
    }

    pub fn total(&self) -> usize {
        self.ids.len()
    }

    /// Ids of the list that have an entry, successful or not.
    pub fn completed(&self) -> usize {
        self.ids
            .iter()
            .filter(|id| self.progress.contains_key(id.as_str()))
            .count()
    }

    pub fn remaining(&self) -> usize {
        self.total() - self.completed()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Attempted ids whose entry is not fully ok, in list order.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.ids
            .iter()
            .filter(|id| self.progress.get(id.as_str()).is_some_and(|e| !e.ok()))
            .map(String::as_str)
            .collect()
    }

    /// Record the result for `id`. An existing entry is never replaced.
    ///
    /// Returns false if `id` already had an entry.
    pub fn record(&mut self, id: &str, entry: FetchedTemplate) -> bool {
        if self.progress.contains_key(id) {
            return false;
        }
        self.progress.insert(id.to_string(), entry);
        true
    }

    /// Drop the entry for `id` so the next batch attempts it again.
    pub fn forget(&mut self, id: &str) -> Option<FetchedTemplate> {
        self.progress.remove(id)
    }

    /// Snapshot the counts after a batch that processed `processed` ids.
    pub fn report(&self, processed: usize, succeeded: usize) -> BatchReport {
        BatchReport {
            processed,
            succeeded,
            failed: processed - succeeded,
            completed: self.completed(),
            remaining: self.remaining(),
            total: self.total(),
            finished: self.is_complete(),
        }
    }
}

/// Status returned by one batch invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Ids attempted by this invocation.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Ids attempted across all invocations.
    pub completed: usize,
    pub remaining: usize,
    pub total: usize,
    pub finished: bool,
}
