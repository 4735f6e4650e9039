//! Storage plumbing shared by export and patch runs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use nextport_core::{BatchReport, Checkpoint, FetchedTemplate};
use nextport_store::{StateStore, load_json, save_json};
use serde::Serialize;

use crate::SyncError;

/// Result of one export or patch invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub report: BatchReport,
    /// Set on the invocation that finished the run and wrote its artifact.
    pub artifact: Option<PathBuf>,
}

/// Progress of a stored run, read without touching the network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunProgress {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
    pub failed_ids: Vec<String>,
}

impl RunProgress {
    pub(crate) fn of(checkpoint: &Checkpoint) -> Self {
        Self {
            total: checkpoint.total(),
            completed: checkpoint.completed(),
            remaining: checkpoint.remaining(),
            failed_ids: checkpoint
                .failed_ids()
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

/// The two keys a resumable run lives under.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunKeys {
    pub ids: &'static str,
    pub progress: &'static str,
}

impl RunKeys {
    pub fn load_progress(
        &self,
        store: &dyn StateStore,
    ) -> Result<BTreeMap<String, FetchedTemplate>, SyncError> {
        Ok(load_json(store, self.progress)?.unwrap_or_default())
    }

    /// Persist callback for [`run_batch`](crate::run_batch): the whole map,
    /// every time.
    pub fn persister<'a>(
        self,
        store: &'a dyn StateStore,
    ) -> impl FnMut(&Checkpoint) -> Result<(), SyncError> + 'a {
        let key = self.progress;
        move |cp| Ok(save_json(store, key, cp.progress())?)
    }

    /// Drop both keys. Only called once the artifact has been delivered.
    pub fn clear(&self, store: &dyn StateStore) -> Result<(), SyncError> {
        store.remove(self.progress)?;
        store.remove(self.ids)?;
        Ok(())
    }

    /// Remove one id's entry so the next invocation fetches it again.
    pub fn forget(&self, store: &dyn StateStore, id: &str) -> Result<bool, SyncError> {
        let mut progress = self.load_progress(store)?;
        let removed = progress.remove(id).is_some();
        if removed {
            save_json(store, self.progress, &progress)?;
        }
        Ok(removed)
    }
}

/// `templates-<kind>-20261018T093000Z.json`
pub(crate) fn artifact_name(kind: &str, at: DateTime<Utc>) -> String {
    format!("templates-{kind}-{}.json", at.format("%Y%m%dT%H%M%SZ"))
}
