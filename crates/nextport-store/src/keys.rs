//! Storage keys shared by the export, patch, and deploy runs.

/// Template listing captured on the first export invocation.
pub const EXPORT_TEMPLATES: &str = "export.templates";
/// Export progress map (id → fetch result).
pub const EXPORT_PROGRESS: &str = "export.progress";

/// Id list of the current patch run.
pub const PATCH_IDS: &str = "patch.ids";
/// Patch progress map (id → fetch result).
pub const PATCH_PROGRESS: &str = "patch.progress";

/// Deploy request inputs. Cleared once a save succeeds.
pub const DEPLOY_TEMPLATE_ID: &str = "deploy.template_id";
pub const DEPLOY_HTML: &str = "deploy.html";
/// Id whose backup was taken for the staged request. A retry of that
/// request reuses the backup instead of re-reading possibly edited content.
pub const DEPLOY_BACKED_UP: &str = "deploy.backed_up";

pub const DEPLOY_BACKUP_PREFIX: &str = "deploy.backup.";

/// Key holding the pre-deploy content of one template.
pub fn deploy_backup(template_id: &str) -> String {
    format!("{DEPLOY_BACKUP_PREFIX}{template_id}")
}

/// A key is a non-empty run of ASCII letters, digits, `.`, `_` or `-`,
/// not starting with `.`. Keys double as file names.
pub fn is_valid(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_keys_are_valid() {
        for key in [
            EXPORT_TEMPLATES,
            EXPORT_PROGRESS,
            PATCH_IDS,
            PATCH_PROGRESS,
            DEPLOY_TEMPLATE_ID,
            DEPLOY_HTML,
            DEPLOY_BACKED_UP,
        ] {
            assert!(is_valid(key), "{key}");
        }
    }

    #[test]
    fn backup_key_embeds_id() {
        assert_eq!(deploy_backup("4711"), "deploy.backup.4711");
        assert!(is_valid(&deploy_backup("4711")));
    }

    #[test]
    fn path_like_keys_rejected() {
        assert!(!is_valid(""));
        assert!(!is_valid("../etc"));
        assert!(!is_valid("a/b"));
        assert!(!is_valid(".hidden"));
        assert!(!is_valid(&deploy_backup("a/b")));
    }
}
