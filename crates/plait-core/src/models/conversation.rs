//! Conversation model

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A composite conversation identifier: `"{platform}_{original_id}"`.
///
/// The platform-native ID is opaque and may itself contain underscores;
/// the platform prefix never does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Build the composite ID from its two parts.
    #[must_use]
    pub fn new(platform: &str, original_id: &str) -> Self {
        Self(format!("{platform}_{original_id}"))
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Platform prefix, up to the first underscore.
    #[must_use]
    pub fn platform(&self) -> &str {
        self.0.split_once('_').map_or("", |(platform, _)| platform)
    }

    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('_') {
            Some((platform, original_id)) if !platform.is_empty() && !original_id.is_empty() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(Error::Validation(format!(
                "invalid conversation id (expected \"platform_originalId\"): {s}"
            ))),
        }
    }
}

/// How much of a conversation's content has been retrieved.
///
/// The ordering is total: `None < Partial < Full`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DetailStatus {
    #[default]
    None,
    Partial,
    Full,
}

impl DetailStatus {
    /// Numeric rank used by the ingestion merge: `none(0) < partial(1) < full(2)`.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Partial => 1,
            Self::Full => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Partial => "partial",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for DetailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "partial" => Ok(Self::Partial),
            "full" => Ok(Self::Full),
            other => Err(Error::Validation(format!("invalid detail status: {other}"))),
        }
    }
}

/// One logical chat thread, keyed by `(platform, original_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Composite identifier, immutable once created
    pub id: ConversationId,
    /// Source platform ("chatgpt", "claude", ...), immutable
    pub platform: String,
    /// Platform-native conversation ID, immutable
    pub original_id: String,
    pub title: String,
    /// Derived preview text, at most 200 characters
    pub preview: String,
    /// Platform-generated summary, when the platform provides one
    pub summary: Option<String>,
    pub message_count: i64,
    pub tags: BTreeSet<String>,
    pub detail_status: DetailStatus,
    /// When message detail was last captured, if ever
    pub detail_synced_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last platform-side update timestamp (Unix ms)
    pub updated_at: i64,
    /// Last successful platform capture (Unix ms)
    pub synced_at: i64,
    pub is_favorite: bool,
    /// Non-null exactly when `is_favorite` is set
    pub favorite_at: Option<i64>,
    pub url: Option<String>,
    /// Monotonic counter bumped on conflict resolution
    pub sync_version: i64,
    /// Last local mutation time (Unix ms)
    pub modified_at: i64,
    /// Local changes pending upload. Replica-local, so it never travels
    /// in snapshots or conflict records.
    #[serde(skip)]
    pub dirty: bool,
    /// Soft delete flag for sync
    pub deleted: bool,
    /// Non-null exactly when `deleted` is set
    pub deleted_at: Option<i64>,
}

impl Conversation {
    /// Create an empty conversation shell for the given platform identity.
    #[must_use]
    pub fn new(platform: impl Into<String>, original_id: impl Into<String>, now_ms: i64) -> Self {
        let platform = platform.into();
        let original_id = original_id.into();
        Self {
            id: ConversationId::new(&platform, &original_id),
            platform,
            original_id,
            title: String::new(),
            preview: String::new(),
            summary: None,
            message_count: 0,
            tags: BTreeSet::new(),
            detail_status: DetailStatus::None,
            detail_synced_at: None,
            created_at: now_ms,
            updated_at: now_ms,
            synced_at: now_ms,
            is_favorite: false,
            favorite_at: None,
            url: None,
            sync_version: 0,
            modified_at: now_ms,
            dirty: true,
            deleted: false,
            deleted_at: None,
        }
    }

    /// Stamp a local mutation: bump `modified_at` and flag for upload.
    pub fn mark_modified(&mut self, now_ms: i64) {
        self.modified_at = now_ms;
        self.dirty = true;
    }

    /// Set or clear the favorite flag, keeping `favorite_at` paired with it.
    pub fn set_favorite(&mut self, favorite: bool, now_ms: i64) {
        self.is_favorite = favorite;
        self.favorite_at = favorite.then_some(now_ms);
        self.mark_modified(now_ms);
    }

    /// Soft-delete: the row stays until both replicas agree on the deletion.
    pub fn tombstone(&mut self, now_ms: i64) {
        self.deleted = true;
        self.deleted_at = Some(now_ms);
        self.mark_modified(now_ms);
    }
}
