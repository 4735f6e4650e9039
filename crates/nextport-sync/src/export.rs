//! Full template export, resumable across invocations.
//!
//! The first invocation lists every template and stores the listing; each
//! invocation then fetches one batch. The invocation that fetches the last
//! id assembles the [`ExportDocument`], delivers it, and clears the stored
//! run. Until then every stored value is provisional.

use chrono::Utc;
use nextport_core::{Checkpoint, EXPORT_VERSION, ExportDocument, ExportedTemplate, TemplateSummary};
use nextport_store::{ArtifactSink, StateStore, keys, load_json, save_json};
use tracing::info;

use crate::run::{RunKeys, artifact_name};
use crate::{BatchOptions, RunProgress, RunStatus, SyncError, TemplateApi, run_batch};

const KEYS: RunKeys = RunKeys {
    ids: keys::EXPORT_TEMPLATES,
    progress: keys::EXPORT_PROGRESS,
};

pub struct Exporter<'a> {
    api: &'a dyn TemplateApi,
    store: &'a dyn StateStore,
    sink: &'a dyn ArtifactSink,
    options: BatchOptions,
}

impl<'a> Exporter<'a> {
    pub fn new(
        api: &'a dyn TemplateApi,
        store: &'a dyn StateStore,
        sink: &'a dyn ArtifactSink,
        options: BatchOptions,
    ) -> Self {
        Self {
            api,
            store,
            sink,
            options,
        }
    }

    /// Run one batch, finishing the export if nothing remains afterwards.
    pub async fn run(&self) -> Result<RunStatus, SyncError> {
        let templates = match load_json::<Vec<TemplateSummary>, _>(self.store, KEYS.ids)? {
            Some(templates) => {
                info!(count = templates.len(), "resuming export");
                templates
            }
            None => {
                let templates = self.api.list_templates().await?;
                save_json(self.store, KEYS.ids, &templates)?;
                info!(count = templates.len(), "export started");
                templates
            }
        };

        let ids: Vec<String> = templates.iter().map(|t| t.id.clone()).collect();
        let mut checkpoint = Checkpoint::resume(ids, KEYS.load_progress(self.store)?);

        let report = if checkpoint.is_complete() {
            checkpoint.report(0, 0)
        } else {
            run_batch(
                self.api,
                &mut checkpoint,
                &self.options,
                KEYS.persister(self.store),
            )
            .await?
        };

        let artifact = if report.finished {
            Some(self.finish(templates, &checkpoint)?)
        } else {
            None
        };
        Ok(RunStatus { report, artifact })
    }

    /// Progress of the stored export, if one is in flight.
    pub fn progress(store: &dyn StateStore) -> Result<Option<RunProgress>, SyncError> {
        let Some(templates) = load_json::<Vec<TemplateSummary>, _>(store, KEYS.ids)? else {
            return Ok(None);
        };
        let ids = templates.into_iter().map(|t| t.id).collect();
        let checkpoint = Checkpoint::resume(ids, KEYS.load_progress(store)?);
        Ok(Some(RunProgress::of(&checkpoint)))
    }

    /// Make the next invocation fetch `id` again.
    pub fn forget(store: &dyn StateStore, id: &str) -> Result<bool, SyncError> {
        KEYS.forget(store, id)
    }

    /// Throw away the stored export.
    pub fn reset(store: &dyn StateStore) -> Result<(), SyncError> {
        KEYS.clear(store)
    }

    fn finish(
        &self,
        templates: Vec<TemplateSummary>,
        checkpoint: &Checkpoint,
    ) -> Result<std::path::PathBuf, SyncError> {
        let exported_at = Utc::now();
        let templates: Vec<ExportedTemplate> = templates
            .into_iter()
            .map(|t| {
                let fetched = checkpoint.get(&t.id);
                ExportedTemplate::from_parts(t, fetched)
            })
            .collect();
        let failed = templates.iter().filter(|t| !t.ok).count();
        let doc = ExportDocument {
            export_version: EXPORT_VERSION,
            exported_at,
            templates,
        };

        let bytes = serde_json::to_vec_pretty(&doc)?;
        let path = self
            .sink
            .deliver(&artifact_name("export", exported_at), &bytes)?;
        KEYS.clear(self.store)?;
        info!(
            templates = doc.templates.len(),
            failed,
            path = %path.display(),
            "export complete"
        );
        Ok(path)
    }
}
