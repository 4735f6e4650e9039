use nextport_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("auth cookie {cookie:?} not found; copy the cookie header from a logged-in session")]
    MissingToken { cookie: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response body: {0}")]
    Unexpected(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    InvalidInput(String),
}
