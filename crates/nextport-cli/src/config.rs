//! Command-line and environment configuration.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use nextport_store::{DirSink, DirStore};
use nextport_sync::auth::{DEFAULT_TOKEN_COOKIE, DEFAULT_TOKEN_HEADER};
use nextport_sync::{BatchOptions, DEFAULT_BATCH_SIZE, Endpoints, Pacing, SessionAuth, VendorClient};

/// Vendor connection settings. Only network commands read them.
#[derive(Args)]
pub struct ConnectionArgs {
    /// Vendor base URL, e.g. https://next.vitecnext.no
    #[arg(long, env = "NEXT_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Cookie header copied from a logged-in browser session
    #[arg(long, env = "NEXT_COOKIE", hide_env_values = true, global = true)]
    pub cookie: Option<String>,

    /// Cookie that carries the anti-forgery token
    #[arg(long, env = "NEXT_TOKEN_COOKIE", default_value = DEFAULT_TOKEN_COOKIE, global = true)]
    pub token_cookie: String,

    /// Request header the token is echoed in
    #[arg(long, env = "NEXT_TOKEN_HEADER", default_value = DEFAULT_TOKEN_HEADER, global = true)]
    pub token_header: String,

    /// Override the save endpoint path
    #[arg(long, env = "NEXT_SAVE_PATH", global = true)]
    pub save_path: Option<String>,
}

impl ConnectionArgs {
    /// Build the vendor client. Fails before any request if the session
    /// token cannot be found.
    pub fn client(&self) -> anyhow::Result<VendorClient> {
        let base_url = self
            .base_url
            .as_deref()
            .context("no vendor base URL (set --base-url or NEXT_BASE_URL)")?;
        let cookie = self
            .cookie
            .as_deref()
            .context("no session cookie (set --cookie or NEXT_COOKIE)")?;
        let auth = SessionAuth::from_cookie_header(cookie, &self.token_cookie, &self.token_header)?;

        let mut endpoints = Endpoints::default();
        if let Some(path) = &self.save_path {
            endpoints.save = path.clone();
        }
        Ok(VendorClient::new(base_url, auth, endpoints)?)
    }
}

/// Where run state and finished artifacts live.
#[derive(Args)]
pub struct PathArgs {
    /// Directory for resumable run state
    #[arg(long, env = "NEXTPORT_STATE_DIR", default_value = ".nextport", global = true)]
    pub state_dir: PathBuf,

    /// Directory finished export and patch files are written to
    #[arg(long, env = "NEXTPORT_OUT_DIR", default_value = ".", global = true)]
    pub out_dir: PathBuf,
}

impl PathArgs {
    pub fn store(&self) -> anyhow::Result<DirStore> {
        DirStore::open(&self.state_dir)
            .with_context(|| format!("opening state dir {}", self.state_dir.display()))
    }

    pub fn sink(&self) -> DirSink {
        DirSink::new(&self.out_dir)
    }
}

/// Batch sizing and pacing for export and patch.
#[derive(Args)]
pub struct BatchArgs {
    /// Templates fetched per invocation
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Lower bound of the pause between templates, in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub min_delay_ms: u64,

    /// Upper bound of the pause between templates, in milliseconds
    #[arg(long, default_value_t = 2300)]
    pub max_delay_ms: u64,

    /// Keep running batches until the run finishes
    #[arg(long)]
    pub until_done: bool,
}

impl BatchArgs {
    pub fn options(&self) -> BatchOptions {
        BatchOptions::new(
            self.batch_size,
            Pacing::from_millis(self.min_delay_ms, self.max_delay_ms),
        )
    }
}
