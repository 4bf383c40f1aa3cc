//! Error types for Resoshare.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("{operation} kept failing after retries: {kind}")]
    RetriesExhausted { operation: String, kind: String },

    #[error("Account {0} is not provisioned in the shared store")]
    InvalidAccount(String),

    #[error("Browser returned an incomplete cookie snapshot")]
    IncompleteCookies,

    #[error("Browser fault: {0}")]
    Browser(#[from] BrowserFault),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Driver-level faults, classified once at the adapter boundary so the
/// supervisor can dispatch on them without seeing WebDriver error types.
#[derive(Error, Debug)]
pub enum BrowserFault {
    #[error("browser window was closed")]
    WindowClosed,

    #[error("browser session is gone")]
    SessionGone,

    #[error("unexpected alert is open")]
    AlertOpen,

    #[error("cookie domain mismatch")]
    CookieDomainMismatch,

    #[error("driver error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
