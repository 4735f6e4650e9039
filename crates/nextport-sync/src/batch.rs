//! The resumable batch loop shared by export and patch runs.

use chrono::Utc;
use nextport_core::{BatchReport, Checkpoint, FetchedTemplate};
use tracing::{info, warn};

use crate::{Pacing, SyncError, TemplateApi};

pub const DEFAULT_BATCH_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    batch_size: usize,
    pub pacing: Pacing,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pacing: Pacing::default(),
        }
    }
}

impl BatchOptions {
    /// A zero batch size would never make progress, so it is raised to 1.
    pub fn new(batch_size: usize, pacing: Pacing) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pacing,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Fetch details then content for one id.
///
/// Never fails: a call that errors is recorded in the entry (`content` stays
/// empty, the matching ok flag false) and the other call still runs.
pub async fn fetch_one<A>(api: &A, id: &str) -> FetchedTemplate
where
    A: TemplateApi + ?Sized,
{
    let mut entry = FetchedTemplate::empty(Utc::now());

    match api.fetch_details(id).await {
        Ok(details) => {
            entry.details = Some(details);
            entry.details_ok = true;
        }
        Err(e) => {
            warn!(id, error = %e, "details fetch failed");
            entry.note_error(format!("details: {e}"));
        }
    }

    match api.fetch_content(id).await {
        Ok(content) => {
            entry.content = content.content;
            entry.margins = content.margins;
            entry.udf_fields = content.udf_fields;
            entry.content_ok = true;
        }
        Err(e) => {
            warn!(id, error = %e, "content fetch failed");
            entry.note_error(format!("content: {e}"));
        }
    }

    entry
}

/// Process at most one batch of pending ids from `checkpoint`.
///
/// Ids are handled strictly in order. After each id the checkpoint is handed
/// to `persist`, and the loop waits one [`Pacing`] delay before the next id.
/// A persist failure stops the batch: continuing would fetch data that
/// cannot be saved.
pub async fn run_batch<A, F>(
    api: &A,
    checkpoint: &mut Checkpoint,
    options: &BatchOptions,
    mut persist: F,
) -> Result<BatchReport, SyncError>
where
    A: TemplateApi + ?Sized,
    F: FnMut(&Checkpoint) -> Result<(), SyncError>,
{
    let batch: Vec<String> = checkpoint
        .pending()
        .take(options.batch_size)
        .map(str::to_owned)
        .collect();

    info!(
        batch = batch.len(),
        completed = checkpoint.completed(),
        total = checkpoint.total(),
        "starting batch"
    );

    let mut succeeded = 0usize;
    for (i, id) in batch.iter().enumerate() {
        if i > 0 {
            options.pacing.pause().await;
        }
        let entry = fetch_one(api, id).await;
        if entry.ok() {
            succeeded += 1;
        }
        checkpoint.record(id, entry);
        persist(checkpoint)?;
    }

    let report = checkpoint.report(batch.len(), succeeded);
    info!(
        processed = report.processed,
        failed = report.failed,
        remaining = report.remaining,
        "batch done"
    );
    Ok(report)
}
