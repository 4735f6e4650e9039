//! Vendor sync layer: the Vitec Next template API client and the resumable
//! export, patch, and deploy runs built on it.

mod api;
pub mod auth;
mod batch;
mod deploy;
mod error;
mod export;
mod http;
mod pacing;
mod patch;
mod run;

pub use api::TemplateApi;
pub use auth::SessionAuth;
pub use batch::{BatchOptions, DEFAULT_BATCH_SIZE, fetch_one, run_batch};
pub use deploy::{DeployOutcome, DeployState, Deployer};
pub use error::SyncError;
pub use export::Exporter;
pub use http::{Endpoints, VendorClient};
pub use pacing::Pacing;
pub use patch::Patcher;
pub use run::{RunProgress, RunStatus};
