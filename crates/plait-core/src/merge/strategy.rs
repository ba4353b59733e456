//! Per-field merge strategies

/// How two replicas' values for one field are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Newer record-level `modified_at` wins; exact ties favor local
    LastWriterWins,
    /// Any side asserting `true` sticks
    BoolOr,
    /// Both sides must agree before the flag holds
    BoolAnd,
    /// Union of both sides' elements, de-duplicated
    SetUnion,
    /// Larger value wins (monotonic counters, update stamps)
    NumericMax,
    /// Smaller value wins (creation stamps)
    NumericMin,
    /// No total order over the inputs; divergent edits on both sides
    /// need a human decision
    Manual,
}

impl MergeStrategy {
    /// The automatic form used by a forced best-effort merge.
    #[must_use]
    pub const fn auto_upgraded(self) -> Self {
        match self {
            Self::Manual => Self::LastWriterWins,
            other => other,
        }
    }
}

/// Strategy table for conversations. Fields not listed keep the local
/// value: identity fields must never be overwritten by a remote record
/// describing the same logical entity, and `dirty` is local bookkeeping.
/// `detail_status` is reconciled by rank in `merge_conversations`, not here.
pub const CONVERSATION_STRATEGIES: &[(&str, MergeStrategy)] = &[
    ("title", MergeStrategy::Manual),
    ("preview", MergeStrategy::LastWriterWins),
    ("summary", MergeStrategy::LastWriterWins),
    ("message_count", MergeStrategy::NumericMax),
    ("tags", MergeStrategy::SetUnion),
    ("detail_synced_at", MergeStrategy::NumericMax),
    ("created_at", MergeStrategy::NumericMin),
    ("updated_at", MergeStrategy::NumericMax),
    ("synced_at", MergeStrategy::NumericMax),
    ("is_favorite", MergeStrategy::BoolOr),
    ("favorite_at", MergeStrategy::NumericMax),
    ("url", MergeStrategy::LastWriterWins),
    ("sync_version", MergeStrategy::NumericMax),
    ("modified_at", MergeStrategy::NumericMax),
    ("deleted", MergeStrategy::BoolAnd),
    ("deleted_at", MergeStrategy::NumericMax),
];

/// Strategy table for messages.
pub const MESSAGE_STRATEGIES: &[(&str, MergeStrategy)] = &[
    ("content", MergeStrategy::Manual),
    ("created_at", MergeStrategy::NumericMin),
    ("sync_version", MergeStrategy::NumericMax),
    ("modified_at", MergeStrategy::NumericMax),
    ("deleted", MergeStrategy::BoolAnd),
    ("deleted_at", MergeStrategy::NumericMax),
];
