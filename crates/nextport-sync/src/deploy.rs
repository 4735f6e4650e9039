//! Single-template overwrite with a mandatory backup.
//!
//! ```text
//! idle → backing_up → saving → success
//!              │          └──→ needs_ui_automation
//!              └──→ error
//! ```
//!
//! The current content is read and stored as a backup before anything is
//! written. If that read fails nothing is saved. A rejected save is not
//! retried: no second write path is known, so the operator finishes the job
//! by hand in the vendor's template editor.

use chrono::Utc;
use nextport_core::{DeployBackup, DeployRequest};
use nextport_store::{StateStore, keys, load_json, save_json};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{SyncError, TemplateApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Idle,
    BackingUp,
    Saving,
    Success,
    NeedsUiAutomation,
    Error,
}

impl DeployState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::NeedsUiAutomation | Self::Error)
    }

    /// Transitions allowed by the deploy state machine.
    pub fn can_advance_to(self, next: DeployState) -> bool {
        use DeployState::*;
        matches!(
            (self, next),
            (Idle, BackingUp)
                | (Idle, Error)
                | (BackingUp, Saving)
                | (BackingUp, Error)
                | (Saving, Success)
                | (Saving, NeedsUiAutomation)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BackingUp => "backing_up",
            Self::Saving => "saving",
            Self::Success => "success",
            Self::NeedsUiAutomation => "needs_ui_automation",
            Self::Error => "error",
        }
    }
}

/// Final report of a deploy or rollback. Never an `Err`: every failure is
/// described here for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployOutcome {
    pub state: DeployState,
    pub template_id: Option<String>,
    pub message: String,
    /// Storage key of the backup, once one has been written.
    pub backup_key: Option<String>,
}

struct Machine {
    state: DeployState,
    template_id: Option<String>,
    backup_key: Option<String>,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: DeployState::Idle,
            template_id: None,
            backup_key: None,
        }
    }

    fn advance(&mut self, next: DeployState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "{:?} -> {:?}",
            self.state,
            next
        );
        info!(from = self.state.as_str(), to = next.as_str(), "deploy state");
        self.state = next;
    }

    fn finish(mut self, next: DeployState, message: impl Into<String>) -> DeployOutcome {
        self.advance(next);
        DeployOutcome {
            state: self.state,
            template_id: self.template_id,
            message: message.into(),
            backup_key: self.backup_key,
        }
    }
}

pub struct Deployer<'a> {
    api: &'a dyn TemplateApi,
    store: &'a dyn StateStore,
}

impl<'a> Deployer<'a> {
    pub fn new(api: &'a dyn TemplateApi, store: &'a dyn StateStore) -> Self {
        Self { api, store }
    }

    /// Store the request inputs for [`run`](Self::run).
    pub fn stage(store: &dyn StateStore, request: &DeployRequest) -> Result<(), SyncError> {
        let key = keys::deploy_backup(&request.template_id);
        if !keys::is_valid(&key) {
            return Err(SyncError::InvalidInput(format!(
                "template id {:?} contains unsupported characters",
                request.template_id
            )));
        }
        save_json(store, keys::DEPLOY_TEMPLATE_ID, &request.template_id)?;
        save_json(store, keys::DEPLOY_HTML, &request.html)?;
        // A new request gets a fresh backup.
        store.remove(keys::DEPLOY_BACKED_UP)?;
        info!(id = %request.template_id, bytes = request.html.len(), "deploy staged");
        Ok(())
    }

    /// The staged request, if both inputs are present.
    pub fn staged(store: &dyn StateStore) -> Result<Option<DeployRequest>, SyncError> {
        let template_id: Option<String> = load_json(store, keys::DEPLOY_TEMPLATE_ID)?;
        let html: Option<String> = load_json(store, keys::DEPLOY_HTML)?;
        Ok(template_id
            .zip(html)
            .map(|(template_id, html)| DeployRequest { template_id, html }))
    }

    pub fn backup(
        store: &dyn StateStore,
        template_id: &str,
    ) -> Result<Option<DeployBackup>, SyncError> {
        Ok(load_json(store, &keys::deploy_backup(template_id))?)
    }

    /// Every stored backup, ordered by template id.
    pub fn backups(store: &dyn StateStore) -> Result<Vec<DeployBackup>, SyncError> {
        let mut backups = Vec::new();
        for key in store.keys()? {
            if key.starts_with(keys::DEPLOY_BACKUP_PREFIX)
                && let Some(backup) = load_json::<DeployBackup, _>(store, &key)?
            {
                backups.push(backup);
            }
        }
        Ok(backups)
    }

    /// Drop the staged inputs without deploying.
    pub fn reset(store: &dyn StateStore) -> Result<(), SyncError> {
        store.remove(keys::DEPLOY_TEMPLATE_ID)?;
        store.remove(keys::DEPLOY_HTML)?;
        store.remove(keys::DEPLOY_BACKED_UP)?;
        Ok(())
    }

    /// Deploy the staged request.
    pub async fn run(&self) -> DeployOutcome {
        let mut m = Machine::new();

        let request = match Self::staged(self.store) {
            Ok(Some(request)) => request,
            Ok(None) => {
                return m.finish(DeployState::Error, "no deploy request staged");
            }
            Err(e) => {
                error!(error = %e, "reading deploy inputs failed");
                return m.finish(DeployState::Error, format!("reading deploy inputs: {e}"));
            }
        };
        let id = request.template_id.as_str();
        m.template_id = Some(id.to_string());

        m.advance(DeployState::BackingUp);
        let backup_key = keys::deploy_backup(id);
        match self.staged_backup(id) {
            Ok(Some(kept)) => {
                info!(
                    id,
                    backed_up_at = %kept.backed_up_at,
                    "retrying staged deploy; keeping its backup"
                );
            }
            Ok(None) => {
                if let Err(message) = self.take_backup(id, &backup_key).await {
                    return m.finish(DeployState::Error, message);
                }
            }
            Err(e) => {
                error!(id, error = %e, "reading backup marker failed; nothing saved");
                return m.finish(
                    DeployState::Error,
                    format!("could not check the backup of {id}, nothing was saved: {e}"),
                );
            }
        }
        m.backup_key = Some(backup_key.clone());

        m.advance(DeployState::Saving);
        match self.api.save_content(id, &request.html).await {
            Ok(()) => {
                let mut message =
                    format!("deployed {id}; previous content kept under {backup_key}");
                if let Err(e) = Self::reset(self.store) {
                    warn!(id, error = %e, "clearing deploy inputs failed");
                    message.push_str(&format!(" (clearing staged inputs failed: {e})"));
                }
                m.finish(DeployState::Success, message)
            }
            Err(e) => {
                warn!(id, error = %e, "save rejected; manual deploy needed");
                m.finish(
                    DeployState::NeedsUiAutomation,
                    format!(
                        "save endpoint rejected the update ({e}). Open template {id} in the \
                         vendor editor, paste the staged HTML by hand, then run \
                         `nextport reset deploy`. The previous content is under {backup_key}; \
                         a retry of this request keeps that backup."
                    ),
                )
            }
        }
    }

    /// The backup taken for the staged request, if this run is a retry.
    fn staged_backup(&self, id: &str) -> Result<Option<DeployBackup>, SyncError> {
        let marker: Option<String> = load_json(self.store, keys::DEPLOY_BACKED_UP)?;
        if marker.as_deref() != Some(id) {
            return Ok(None);
        }
        Self::backup(self.store, id)
    }

    /// Read the live content and store it under `backup_key`. The error is
    /// the operator-facing message.
    async fn take_backup(&self, id: &str, backup_key: &str) -> Result<(), String> {
        let current = match self.api.fetch_content(id).await {
            Ok(current) => current,
            Err(e) => {
                error!(id, error = %e, "backup read failed; nothing saved");
                return Err(format!(
                    "could not read current content of {id}, nothing was saved: {e}"
                ));
            }
        };
        let backup = DeployBackup {
            template_id: id.to_string(),
            content: current.content,
            backed_up_at: Utc::now(),
        };
        save_json(self.store, backup_key, &backup)
            .and_then(|()| save_json(self.store, keys::DEPLOY_BACKED_UP, &id))
            .map_err(|e| {
                error!(id, error = %e, "storing backup failed; nothing saved");
                format!("could not store backup of {id}, nothing was saved: {e}")
            })
    }

    /// Re-submit the backed-up content of `template_id`. The backup is kept.
    pub async fn rollback(&self, template_id: &str) -> DeployOutcome {
        let mut m = Machine::new();
        m.template_id = Some(template_id.to_string());

        m.advance(DeployState::BackingUp);
        let backup = match Self::backup(self.store, template_id) {
            Ok(Some(backup)) => backup,
            Ok(None) => {
                return m.finish(DeployState::Error, format!("no backup stored for {template_id}"));
            }
            Err(e) => {
                return m.finish(DeployState::Error, format!("reading backup: {e}"));
            }
        };
        m.backup_key = Some(keys::deploy_backup(template_id));

        m.advance(DeployState::Saving);
        match self.api.save_content(template_id, &backup.content).await {
            Ok(()) => m.finish(
                DeployState::Success,
                format!(
                    "restored {template_id} to content backed up at {}",
                    backup.backed_up_at.to_rfc3339()
                ),
            ),
            Err(e) => m.finish(
                DeployState::NeedsUiAutomation,
                format!(
                    "save endpoint rejected the rollback ({e}). Paste the backup content into \
                     template {template_id} by hand."
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::testing::FakeApi;
    use nextport_store::MemoryStore;

    fn request(id: &str) -> DeployRequest {
        DeployRequest {
            template_id: id.into(),
            html: "<p>new [[estate.address]]</p>".into(),
        }
    }

    #[test]
    fn transitions() {
        use DeployState::*;
        assert!(Idle.can_advance_to(BackingUp));
        assert!(BackingUp.can_advance_to(Saving));
        assert!(Saving.can_advance_to(NeedsUiAutomation));
        assert!(!Saving.can_advance_to(Idle));
        assert!(!Success.can_advance_to(Idle));
        assert!(!Idle.can_advance_to(Saving));
        assert!(Error.is_terminal() && Success.is_terminal());
        assert!(!BackingUp.is_terminal());
    }

    #[test]
    fn state_serialises_snake_case() {
        assert_eq!(
            serde_json::to_value(DeployState::NeedsUiAutomation).unwrap(),
            "needs_ui_automation"
        );
        assert_eq!(DeployState::BackingUp.as_str(), "backing_up");
    }

    #[tokio::test]
    async fn successful_deploy_backs_up_then_clears_inputs() {
        let api = FakeApi::with_ids(&["42"]);
        let store = MemoryStore::new();
        let d = Deployer::new(&api, &store);
        Deployer::stage(&store, &request("42")).unwrap();

        let out = d.run().await;
        assert_eq!(out.state, DeployState::Success);
        assert_eq!(out.backup_key.as_deref(), Some("deploy.backup.42"));
        assert_eq!(api.calls(), vec!["content 42", "save 42"]);

        let backup = Deployer::backup(&store, "42").unwrap().unwrap();
        assert_eq!(backup.content, "<p>42</p>");
        assert!(Deployer::staged(&store).unwrap().is_none());

        let history = store.history();
        let backup_at = history.iter().position(|h| h == "set deploy.backup.42").unwrap();
        let cleared_at = history
            .iter()
            .position(|h| h == "remove deploy.template_id")
            .unwrap();
        assert!(backup_at < cleared_at);
    }

    #[tokio::test]
    async fn failed_backup_read_never_saves() {
        let mut api = FakeApi::with_ids(&["42"]);
        api.fail_content.insert("42".into());
        let store = MemoryStore::new();
        let d = Deployer::new(&api, &store);
        Deployer::stage(&store, &request("42")).unwrap();

        let out = d.run().await;
        assert_eq!(out.state, DeployState::Error);
        assert!(out.backup_key.is_none());
        assert!(api.calls_to("save").is_empty());
        assert!(Deployer::backup(&store, "42").unwrap().is_none());
        // Inputs stay for another attempt.
        assert!(Deployer::staged(&store).unwrap().is_some());
    }

    #[tokio::test]
    async fn rejected_save_needs_ui_automation_and_keeps_backup() {
        let mut api = FakeApi::with_ids(&["42"]);
        api.fail_save = true;
        let store = MemoryStore::new();
        let d = Deployer::new(&api, &store);
        Deployer::stage(&store, &request("42")).unwrap();

        let out = d.run().await;
        assert_eq!(out.state, DeployState::NeedsUiAutomation);
        assert!(out.message.contains("by hand"));
        assert_eq!(api.calls_to("save"), vec!["42"]);
        assert!(Deployer::backup(&store, "42").unwrap().is_some());
        assert_eq!(Deployer::staged(&store).unwrap(), Some(request("42")));
    }

    #[tokio::test]
    async fn retry_after_manual_paste_keeps_first_backup() {
        let mut api = FakeApi::with_ids(&["42"]);
        api.fail_save = true;
        let store = MemoryStore::new();
        Deployer::stage(&store, &request("42")).unwrap();
        let out = Deployer::new(&api, &store).run().await;
        assert_eq!(out.state, DeployState::NeedsUiAutomation);
        assert!(out.message.contains("nextport reset deploy"));

        // The operator pasted the new HTML in the vendor editor, then retried.
        let mut pasted = FakeApi::with_ids(&["42"]);
        pasted.content.insert("42".into(), "<p>NEW</p>".into());
        let out = Deployer::new(&pasted, &store).run().await;
        assert_eq!(out.state, DeployState::Success);
        assert_eq!(pasted.calls(), vec!["save 42"]);
        assert_eq!(Deployer::backup(&store, "42").unwrap().unwrap().content, "<p>42</p>");

        let out = Deployer::new(&pasted, &store).rollback("42").await;
        assert_eq!(out.state, DeployState::Success);
        assert!(store.get(keys::DEPLOY_BACKED_UP).unwrap().is_none());
    }

    #[tokio::test]
    async fn restaging_takes_a_fresh_backup() {
        let mut api = FakeApi::with_ids(&["42"]);
        api.fail_save = true;
        let store = MemoryStore::new();
        Deployer::stage(&store, &request("42")).unwrap();
        Deployer::new(&api, &store).run().await;

        let mut edited = FakeApi::with_ids(&["42"]);
        edited.content.insert("42".into(), "<p>edited</p>".into());
        Deployer::stage(&store, &request("42")).unwrap();
        let out = Deployer::new(&edited, &store).run().await;
        assert_eq!(out.state, DeployState::Success);
        assert_eq!(edited.calls(), vec!["content 42", "save 42"]);
        assert_eq!(
            Deployer::backup(&store, "42").unwrap().unwrap().content,
            "<p>edited</p>"
        );
    }

    #[tokio::test]
    async fn nothing_staged_is_an_error_without_calls() {
        let api = FakeApi::default();
        let store = MemoryStore::new();
        let out = Deployer::new(&api, &store).run().await;
        assert_eq!(out.state, DeployState::Error);
        assert!(out.template_id.is_none());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn stage_rejects_unsafe_ids() {
        let store = MemoryStore::new();
        let err = Deployer::stage(&store, &request("../x")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(_)));
        assert!(store.keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rollback_restores_backup() {
        let api = FakeApi::with_ids(&["42"]);
        let store = MemoryStore::new();
        let d = Deployer::new(&api, &store);
        Deployer::stage(&store, &request("42")).unwrap();
        d.run().await;

        let out = d.rollback("42").await;
        assert_eq!(out.state, DeployState::Success);
        assert_eq!(api.calls_to("save"), vec!["42", "42"]);
        assert!(Deployer::backup(&store, "42").unwrap().is_some());
        assert_eq!(Deployer::backups(&store).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rollback_without_backup_is_an_error() {
        let api = FakeApi::default();
        let store = MemoryStore::new();
        let out = Deployer::new(&api, &store).rollback("7").await;
        assert_eq!(out.state, DeployState::Error);
        assert!(api.calls().is_empty());
    }
}
