use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] plait_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No capture input provided")]
    EmptyCaptureInput,
    #[error("Conversation ID cannot be empty")]
    EmptyConversationId,
    #[error("Conversation not found for id/prefix: {0}")]
    ConversationNotFound(String),
    #[error("{0}")]
    AmbiguousConversationId(String),
    #[error("Invalid conflict ID: {0}")]
    InvalidConflictId(String),
    #[error(
        "Sync is not configured. Set PLAIT_REMOTE_URL (plus PLAIT_REMOTE_TOKEN if the server wants one), or PLAIT_REMOTE_FILE for a shared-file remote, to enable `plait sync`."
    )]
    SyncNotConfigured,
}
