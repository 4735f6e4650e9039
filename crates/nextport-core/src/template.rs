//! Template records as exchanged with the Vitec Next document-template API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::merge_field::extract_merge_fields;

/// Version stamped into every [`ExportDocument`].
pub const EXPORT_VERSION: u32 = 1;

/// Output channel a template renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Pdf,
    Email,
    Sms,
    PdfEmail,
}

/// Publication status of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Published,
    Archived,
}

/// One row of the vendor's template listing.
///
/// Only `id` is required. The vendor spells it `documentTemplateId` and may
/// send it as a number, so both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    #[serde(alias = "documentTemplateId", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl TemplateSummary {
    /// Summary carrying only an id, for ids supplied by the operator.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            channel: None,
            status: None,
            categories: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// Body of the content endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateContent {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margins: Option<Value>,
    #[serde(default, alias = "udfFields", skip_serializing_if = "Option::is_none")]
    pub udf_fields: Option<Value>,
}

/// Result of fetching one template: detail and content, each of which may
/// have failed independently.
///
/// A failed content fetch leaves `content` empty; the entry still counts as
/// processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedTemplate {
    pub details: Option<Value>,
    pub content: String,
    pub margins: Option<Value>,
    pub udf_fields: Option<Value>,
    pub fetched_at: DateTime<Utc>,
    pub details_ok: bool,
    pub content_ok: bool,
    /// First failure message, if any call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchedTemplate {
    /// An entry with nothing fetched yet.
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            details: None,
            content: String::new(),
            margins: None,
            udf_fields: None,
            fetched_at,
            details_ok: false,
            content_ok: false,
            error: None,
        }
    }

    /// True when both the detail and content calls succeeded.
    pub fn ok(&self) -> bool {
        self.details_ok && self.content_ok
    }

    /// Keep the first error only; later ones are usually consequences.
    pub fn note_error(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }
}

/// One template inside an [`ExportDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedTemplate {
    #[serde(flatten)]
    pub summary: TemplateSummary,
    pub content: String,
    pub margins: Option<Value>,
    pub udf_fields: Option<Value>,
    pub details: Option<Value>,
    #[serde(default)]
    pub merge_fields: Vec<String>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportedTemplate {
    /// Combine a listing row with its fetch result. A missing result is
    /// exported as a failed entry rather than dropped.
    pub fn from_parts(summary: TemplateSummary, fetched: Option<&FetchedTemplate>) -> Self {
        match fetched {
            Some(f) => Self {
                merge_fields: extract_merge_fields(&f.content),
                summary,
                content: f.content.clone(),
                margins: f.margins.clone(),
                udf_fields: f.udf_fields.clone(),
                details: f.details.clone(),
                ok: f.ok(),
                error: f.error.clone(),
            },
            None => Self {
                summary,
                content: String::new(),
                margins: None,
                udf_fields: None,
                details: None,
                merge_fields: Vec::new(),
                ok: false,
                error: Some("not fetched".to_string()),
            },
        }
    }

    /// Fill content fields from a patch entry. Returns false (and changes
    /// nothing) if this template already has content or the entry failed.
    pub fn fill_from(&mut self, patch: &FetchedTemplate) -> bool {
        if !self.content.is_empty() || !patch.content_ok || patch.content.is_empty() {
            return false;
        }
        self.content = patch.content.clone();
        self.margins = patch.margins.clone();
        self.udf_fields = patch.udf_fields.clone();
        if self.details.is_none() && patch.details_ok {
            self.details = patch.details.clone();
        }
        self.merge_fields = extract_merge_fields(&self.content);
        self.ok = self.details.is_some();
        if self.ok {
            self.error = None;
        }
        true
    }
}

/// Consolidated export written once every template has been processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub export_version: u32,
    pub exported_at: DateTime<Utc>,
    pub templates: Vec<ExportedTemplate>,
}

impl ExportDocument {
    /// Ids whose content is missing, in export order. These are the
    /// candidates for a patch run.
    pub fn ids_missing_content(&self) -> Vec<String> {
        self.templates
            .iter()
            .filter(|t| t.content.is_empty())
            .map(|t| t.summary.id.clone())
            .collect()
    }

    /// Fill missing content from a patch document. Returns the number of
    /// templates that were filled.
    pub fn apply_patch(&mut self, patch: &PatchDocument) -> usize {
        self.templates
            .iter_mut()
            .filter_map(|t| patch.entries.get(&t.summary.id).map(|p| t.fill_from(p)))
            .filter(|filled| *filled)
            .count()
    }
}

/// Patch-run output: id → fetch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchDocument {
    pub patched_at: DateTime<Utc>,
    pub entries: BTreeMap<String, FetchedTemplate>,
}

/// A pending overwrite of one template's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub template_id: String,
    pub html: String,
}

/// Content captured just before a deploy overwrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployBackup {
    pub template_id: String,
    pub content: String,
    pub backed_up_at: DateTime<Utc>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
