//! Targeted re-fetch of a fixed id list, typically the templates an export
//! left without content.

use chrono::Utc;
use nextport_core::{Checkpoint, PatchDocument};
use nextport_store::{ArtifactSink, StateStore, keys, load_json, save_json};
use tracing::{info, warn};

use crate::run::{RunKeys, artifact_name};
use crate::{BatchOptions, RunProgress, RunStatus, SyncError, TemplateApi, run_batch};

const KEYS: RunKeys = RunKeys {
    ids: keys::PATCH_IDS,
    progress: keys::PATCH_PROGRESS,
};

pub struct Patcher<'a> {
    api: &'a dyn TemplateApi,
    store: &'a dyn StateStore,
    sink: &'a dyn ArtifactSink,
    options: BatchOptions,
}

impl<'a> Patcher<'a> {
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

    /// Run one batch of the stored patch run, or start one over `ids`.
    ///
    /// A stored run always wins: `ids` are ignored until it finishes or is
    /// reset, so an interrupted run is resumed rather than restarted.
    pub async fn run(&self, ids: Option<Vec<String>>) -> Result<RunStatus, SyncError> {
        let stored: Option<Vec<String>> = load_json(self.store, KEYS.ids)?;
        let run_ids = match (stored, ids) {
            (Some(stored), supplied) => {
                if supplied.is_some_and(|s| s != stored) {
                    warn!(
                        stored = stored.len(),
                        "patch run in progress; supplied ids ignored until it finishes"
                    );
                }
                stored
            }
            (None, Some(ids)) if !ids.is_empty() => {
                // Dedup once so the stored list and the checkpoint agree.
                let ids = Checkpoint::new(ids).ids().to_vec();
                save_json(self.store, KEYS.ids, &ids)?;
                info!(count = ids.len(), "patch started");
                ids
            }
            (None, _) => {
                return Err(SyncError::InvalidInput(
                    "no patch run in progress and no ids supplied".into(),
                ));
            }
        };

        let mut checkpoint = Checkpoint::resume(run_ids, KEYS.load_progress(self.store)?);
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
            Some(self.finish(checkpoint)?)
        } else {
            None
        };
        Ok(RunStatus { report, artifact })
    }

    pub fn progress(store: &dyn StateStore) -> Result<Option<RunProgress>, SyncError> {
        let Some(ids) = load_json::<Vec<String>, _>(store, KEYS.ids)? else {
            return Ok(None);
        };
        let checkpoint = Checkpoint::resume(ids, KEYS.load_progress(store)?);
        Ok(Some(RunProgress::of(&checkpoint)))
    }

    pub fn forget(store: &dyn StateStore, id: &str) -> Result<bool, SyncError> {
        KEYS.forget(store, id)
    }

    pub fn reset(store: &dyn StateStore) -> Result<(), SyncError> {
        KEYS.clear(store)
    }

    fn finish(&self, checkpoint: Checkpoint) -> Result<std::path::PathBuf, SyncError> {
        let patched_at = Utc::now();
        let ids = checkpoint.ids().to_vec();
        let mut progress = checkpoint.into_progress();
        progress.retain(|id, _| ids.contains(id));
        let doc = PatchDocument {
            patched_at,
            entries: progress,
        };
        let ok = doc.entries.values().filter(|e| e.ok()).count();

        let bytes = serde_json::to_vec_pretty(&doc)?;
        let path = self
            .sink
            .deliver(&artifact_name("patch", patched_at), &bytes)?;
        KEYS.clear(self.store)?;
        info!(
            entries = doc.entries.len(),
            ok,
            path = %path.display(),
            "patch complete"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pacing;
    use crate::batch::testing::FakeApi;
    use nextport_store::{MemorySink, MemoryStore};

    fn ids(v: &[&str]) -> Option<Vec<String>> {
        Some(v.iter().map(|s| s.to_string()).collect())
    }

    fn patcher<'a>(
        api: &'a FakeApi,
        store: &'a MemoryStore,
        sink: &'a MemorySink,
        batch_size: usize,
    ) -> Patcher<'a> {
        Patcher::new(api, store, sink, BatchOptions::new(batch_size, Pacing::none()))
    }

    #[tokio::test]
    async fn patch_completes_and_writes_map() {
        let mut api = FakeApi::with_ids(&["10", "11", "12"]);
        api.fail_content.insert("12".into());
        let store = MemoryStore::new();
        let sink = MemorySink::new();
        let p = patcher(&api, &store, &sink, 2);

        let s = p.run(ids(&["10", "12", "11"])).await.unwrap();
        assert_eq!((s.report.processed, s.report.remaining), (2, 1));
        assert_eq!(api.calls_to("content"), vec!["10", "12"]);

        let s = p.run(None).await.unwrap();
        assert!(s.report.finished);
        assert!(s.artifact.is_some());

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].0.starts_with("templates-patch-"));
        let doc: PatchDocument = serde_json::from_slice(&delivered[0].1).unwrap();
        assert_eq!(doc.entries.len(), 3);
        assert_eq!(doc.entries["11"].content, "<p>11</p>");
        assert!(!doc.entries["12"].content_ok);
        assert_eq!(doc.entries["12"].content, "");
        assert!(store.keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stored_run_wins_over_new_ids() {
        let api = FakeApi::with_ids(&["1", "2", "3"]);
        let store = MemoryStore::new();
        let sink = MemorySink::new();
        let p = patcher(&api, &store, &sink, 1);

        p.run(ids(&["1", "2"])).await.unwrap();
        let s = p.run(ids(&["3"])).await.unwrap();
        assert!(s.report.finished);
        assert_eq!(api.calls_to("details"), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn no_run_and_no_ids_is_an_error() {
        let api = FakeApi::default();
        let store = MemoryStore::new();
        let sink = MemorySink::new();
        let p = patcher(&api, &store, &sink, 25);
        assert!(matches!(p.run(None).await, Err(SyncError::InvalidInput(_))));
        assert!(matches!(p.run(Some(vec![])).await, Err(SyncError::InvalidInput(_))));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_fetched_once() {
        let api = FakeApi::with_ids(&["1", "2"]);
        let store = MemoryStore::new();
        let sink = MemorySink::new();
        let s = patcher(&api, &store, &sink, 25)
            .run(ids(&["1", "2", "1"]))
            .await
            .unwrap();
        assert_eq!(s.report.total, 2);
        assert_eq!(api.calls_to("content"), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn progress_reflects_stored_run() {
        let mut api = FakeApi::with_ids(&["1", "2", "3"]);
        api.fail_details.insert("1".into());
        let store = MemoryStore::new();
        let sink = MemorySink::new();
        let p = patcher(&api, &store, &sink, 1);

        assert!(Patcher::progress(&store).unwrap().is_none());
        p.run(ids(&["1", "2", "3"])).await.unwrap();
        let progress = Patcher::progress(&store).unwrap().unwrap();
        assert_eq!(progress.total, 3);
        assert_eq!(progress.remaining, 2);
        assert_eq!(progress.failed_ids, vec!["1"]);
    }
}
