//! The slice of the vendor API the runs depend on.

use async_trait::async_trait;
use nextport_core::{TemplateContent, TemplateSummary};
use serde_json::Value;

use crate::SyncError;

/// Template endpoints of the vendor API. [`VendorClient`](crate::VendorClient)
/// is the HTTP implementation; runs take `&dyn TemplateApi` so they can be
/// driven without a network.
#[async_trait]
pub trait TemplateApi: Send + Sync {
    /// Every template visible to the session.
    async fn list_templates(&self) -> Result<Vec<TemplateSummary>, SyncError>;

    /// Template metadata as returned by the vendor, kept opaque.
    async fn fetch_details(&self, id: &str) -> Result<Value, SyncError>;

    async fn fetch_content(&self, id: &str) -> Result<TemplateContent, SyncError>;

    /// Overwrite the template's HTML content.
    async fn save_content(&self, id: &str, html: &str) -> Result<(), SyncError>;
}
