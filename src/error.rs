//! Error type shared by the template store, renderer plumbing and print
//! dispatcher. None of these errors leave the crate's public print/store entry
//! points; they are logged and absorbed there.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrintError {
    #[error("settings storage: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("template serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("print surface I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("print surface: {0}")]
    Surface(String),

    #[error("print backend: {0}")]
    Backend(String),

    #[error("timed out while {0}")]
    Timeout(&'static str),

    #[error("print cancelled by user")]
    Cancelled,

    #[error("unknown document kind: {0}")]
    UnknownKind(String),

    #[error("settings lock poisoned")]
    LockPoisoned,

    #[error("logging setup: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, PrintError>;
