//! Plain-text rendering of run reports and stored state.

use chrono::SecondsFormat;
use nextport_core::{DeployBackup, DeployRequest};
use nextport_sync::{DeployOutcome, RunProgress, RunStatus};

const MAX_LIST_ITEMS: usize = 10;

pub fn print_run(kind: &str, status: &RunStatus) {
    let r = &status.report;
    println!(
        "{kind}: processed {} ({} ok, {} failed), {}/{} done, {} remaining",
        r.processed, r.succeeded, r.failed, r.completed, r.total, r.remaining
    );
    match &status.artifact {
        Some(path) => println!("{kind} complete: {}", path.display()),
        None if !r.finished => println!("  run `nextport {kind}` again to continue"),
        None => {}
    }
}

pub fn print_progress(kind: &str, progress: Option<&RunProgress>) {
    let Some(p) = progress else {
        println!("{:<10} no run in progress", kind);
        return;
    };
    println!(
        "{:<10} {}/{} done, {} remaining",
        kind, p.completed, p.total, p.remaining
    );
    if !p.failed_ids.is_empty() {
        println!("  {:<8} {}", "failed", truncated(&p.failed_ids));
    }
}

pub fn print_staged(request: Option<&DeployRequest>) {
    match request {
        Some(r) => println!(
            "{:<10} template {} staged ({} bytes)",
            "deploy",
            r.template_id,
            r.html.len()
        ),
        None => println!("{:<10} nothing staged", "deploy"),
    }
}

pub fn print_backups(backups: &[DeployBackup]) {
    if backups.is_empty() {
        return;
    }
    println!("backups");
    for b in backups {
        println!(
            "  {:<12} {} ({} bytes)",
            b.template_id,
            b.backed_up_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            b.content.len()
        );
    }
}

pub fn print_deploy(outcome: &DeployOutcome) {
    let id = outcome.template_id.as_deref().unwrap_or("-");
    println!("deploy {id}: {}", outcome.state.as_str());
    println!("  {}", outcome.message);
    if let Some(key) = &outcome.backup_key {
        println!("  backup: {key}");
    }
}

pub fn print_fields(rows: &[(String, usize)], templates: usize) {
    println!("{} merge field(s) across {templates} template(s)", rows.len());
    for (field, count) in rows {
        println!("  {:<40} {count}", field);
    }
}

fn truncated(ids: &[String]) -> String {
    let shown: Vec<&str> = ids.iter().take(MAX_LIST_ITEMS).map(String::as_str).collect();
    let mut out = shown.join(", ");
    if ids.len() > MAX_LIST_ITEMS {
        out.push_str(&format!(" ... (+{} more)", ids.len() - MAX_LIST_ITEMS));
    }
    out
}
