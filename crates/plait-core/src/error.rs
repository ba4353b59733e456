//! Error types for plait-core

use thiserror::Error;

/// Result type alias using plait-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in plait-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed capture or remote payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network failure while talking to the remote store
    #[error("Transport error: {0}")]
    Transport(String),

    /// Authentication failure; re-authenticate instead of retrying blindly
    #[error("Authentication error: {0}")]
    Auth(String),
}

/// Coarse failure category reported by a sync pass so the caller can offer
/// a targeted remedy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncErrorCategory {
    Auth,
    Network,
    Validation,
    Unknown,
}

impl std::fmt::Display for SyncErrorCategory {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        };
        formatter.write_str(label)
    }
}

impl Error {
    /// Classify this error for sync reporting.
    pub const fn sync_category(&self) -> SyncErrorCategory {
        match self {
            Self::Auth(_) => SyncErrorCategory::Auth,
            Self::Transport(_) => SyncErrorCategory::Network,
            Self::Validation(_) | Self::Serialization(_) => SyncErrorCategory::Validation,
            _ => SyncErrorCategory::Unknown,
        }
    }
}
