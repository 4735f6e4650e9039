//! Subcommand bodies. Each opens the state directory itself so offline
//! commands never need vendor credentials.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use nextport_core::{DeployRequest, ExportDocument, PatchDocument, count_merge_fields};
use nextport_sync::{DeployOutcome, DeployState, Deployer, Exporter, Patcher, TemplateApi};
use tracing::info;

use crate::config::{BatchArgs, PathArgs};
use crate::{RunTarget, Target, display};

pub async fn export(
    api: &dyn TemplateApi,
    paths: &PathArgs,
    batch: &BatchArgs,
) -> anyhow::Result<()> {
    let store = paths.store()?;
    let sink = paths.sink();
    let options = batch.options();
    let exporter = Exporter::new(api, &store, &sink, options);

    loop {
        let status = exporter.run().await.context("export batch failed")?;
        display::print_run("export", &status);
        if status.report.finished || !batch.until_done {
            return Ok(());
        }
        options.pacing.pause().await;
    }
}

pub async fn patch(
    api: &dyn TemplateApi,
    paths: &PathArgs,
    batch: &BatchArgs,
    ids: Option<Vec<String>>,
) -> anyhow::Result<()> {
    let store = paths.store()?;
    let sink = paths.sink();
    let options = batch.options();
    let patcher = Patcher::new(api, &store, &sink, options);

    let mut ids = ids;
    if ids.as_ref().is_some_and(Vec::is_empty) {
        if Patcher::progress(&store)?.is_none() {
            info!("no ids to patch");
            println!("patch: nothing to patch");
            return Ok(());
        }
        // Resume the stored run instead of ignoring an empty selection.
        ids = None;
    }
    loop {
        let status = patcher.run(ids.take()).await.context("patch batch failed")?;
        display::print_run("patch", &status);
        if status.report.finished || !batch.until_done {
            return Ok(());
        }
        options.pacing.pause().await;
    }
}

/// Pick the id source for a new patch run. `None` means "resume whatever
/// is stored".
pub fn resolve_patch_ids(
    ids: Vec<String>,
    ids_file: Option<&Path>,
    from_export: Option<&Path>,
) -> anyhow::Result<Option<Vec<String>>> {
    if !ids.is_empty() {
        return Ok(Some(parse_id_list(&ids.join("\n"))));
    }
    if let Some(path) = ids_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return Ok(Some(parse_id_list(&text)));
    }
    if let Some(path) = from_export {
        let doc = read_export(path)?;
        let missing = doc.ids_missing_content();
        info!(count = missing.len(), export = %path.display(), "ids without content");
        return Ok(Some(missing));
    }
    Ok(None)
}

/// One id per line; blank lines and `#` comments are skipped.
fn parse_id_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn apply_patch(export: &Path, patch: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let mut doc = read_export(export)?;
    let text =
        std::fs::read_to_string(patch).with_context(|| format!("reading {}", patch.display()))?;
    let patch_doc: PatchDocument =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", patch.display()))?;

    let filled = doc.apply_patch(&patch_doc);
    let out = out.map(Path::to_path_buf).unwrap_or_else(|| patched_path(export));
    std::fs::write(&out, serde_json::to_vec_pretty(&doc)?)
        .with_context(|| format!("writing {}", out.display()))?;

    let still_missing = doc.ids_missing_content().len();
    info!(filled, still_missing, out = %out.display(), "patch applied");
    println!("Filled {filled} template(s); {still_missing} still without content");
    println!("Wrote {}", out.display());
    Ok(())
}

/// `templates.json` -> `templates.patched.json`
fn patched_path(export: &Path) -> PathBuf {
    let stem = export
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".into());
    export.with_file_name(format!("{stem}.patched.json"))
}

pub async fn deploy(
    api: &dyn TemplateApi,
    paths: &PathArgs,
    id: Option<String>,
    html_file: Option<&Path>,
) -> anyhow::Result<DeployOutcome> {
    let store = paths.store()?;
    if let (Some(template_id), Some(path)) = (id, html_file) {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Deployer::stage(&store, &DeployRequest { template_id, html })?;
    }

    let outcome = Deployer::new(api, &store).run().await;
    display::print_deploy(&outcome);
    Ok(outcome)
}

pub async fn rollback(
    api: &dyn TemplateApi,
    paths: &PathArgs,
    id: &str,
) -> anyhow::Result<DeployOutcome> {
    let store = paths.store()?;
    let outcome = Deployer::new(api, &store).rollback(id).await;
    display::print_deploy(&outcome);
    Ok(outcome)
}

pub fn deploy_exit_code(outcome: &DeployOutcome) -> ExitCode {
    ExitCode::from(exit_status(outcome.state))
}

fn exit_status(state: DeployState) -> u8 {
    match state {
        DeployState::Success => 0,
        DeployState::NeedsUiAutomation => 2,
        _ => 1,
    }
}

pub fn status(paths: &PathArgs) -> anyhow::Result<()> {
    let store = paths.store()?;
    display::print_progress("export", Exporter::progress(&store)?.as_ref());
    display::print_progress("patch", Patcher::progress(&store)?.as_ref());
    display::print_staged(Deployer::staged(&store)?.as_ref());
    display::print_backups(&Deployer::backups(&store)?);
    Ok(())
}

pub fn reset(paths: &PathArgs, target: Target) -> anyhow::Result<()> {
    let store = paths.store()?;
    let what = match target {
        Target::Export => {
            Exporter::reset(&store)?;
            "export run"
        }
        Target::Patch => {
            Patcher::reset(&store)?;
            "patch run"
        }
        Target::Deploy => {
            Deployer::reset(&store)?;
            "staged deploy"
        }
    };
    info!(what, "reset");
    println!("Discarded stored {what}");
    Ok(())
}

pub fn forget(paths: &PathArgs, target: RunTarget, id: &str) -> anyhow::Result<()> {
    let store = paths.store()?;
    let removed = match target {
        RunTarget::Export => Exporter::forget(&store, id)?,
        RunTarget::Patch => Patcher::forget(&store, id)?,
    };
    if removed {
        println!("{id} will be fetched again on the next batch");
    } else {
        println!("{id} has no stored result");
    }
    Ok(())
}

pub fn fields(export: &Path, min_count: usize) -> anyhow::Result<()> {
    let doc = read_export(export)?;
    let counts = count_merge_fields(doc.templates.iter().map(|t| t.content.as_str()));
    let mut rows: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, n)| *n >= min_count)
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    display::print_fields(&rows, doc.templates.len());
    Ok(())
}

fn read_export(path: &Path) -> anyhow::Result<ExportDocument> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing export {}", path.display()))
}
