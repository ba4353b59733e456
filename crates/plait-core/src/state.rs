//! Shared sync state machine types.

/// Orchestrator phase: `Idle -> Syncing -> Success | Error`, back to `Idle`
/// on the next trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Syncing,
    Success,
    Error,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
        };
        formatter.write_str(label)
    }
}
