pub mod checkpoint;
pub mod merge_field;
pub mod template;

pub use checkpoint::{BatchReport, Checkpoint};
pub use merge_field::{count_merge_fields, extract_merge_fields};
pub use template::{
    Channel, DeployBackup, DeployRequest, EXPORT_VERSION, ExportDocument, ExportedTemplate,
    FetchedTemplate, PatchDocument, Status, TemplateContent, TemplateSummary,
};
