//! Capture envelope: the validated boundary between platform adapters
//! and the merge core.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::models::{ConversationId, MessageRole};

/// What shape of network response a capture came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Conversation list view: metadata only
    List,
    /// Full detail fetch: the complete message set
    Detail,
    /// Streaming update: an incremental message fragment
    Stream,
}

/// How the ingestion merge treats a capture's message set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Full,
    Partial,
}

/// Conversation metadata as reported by a platform adapter, without any
/// sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedConversation {
    pub original_id: String,
    #[serde(default)]
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// The platform's own message count claim (list views report this
    /// without carrying messages)
    #[serde(default)]
    pub message_count: i64,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// One turn as reported by a platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: i64,
}

/// A normalized conversation fragment produced by a platform adapter from
/// one network response. Anything that fails [`Capture::validate`] is
/// rejected before it reaches the merge core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    pub platform: String,
    pub kind: CaptureKind,
    /// When the client captured this response (Unix ms)
    pub captured_at: i64,
    pub conversation: CapturedConversation,
    #[serde(default)]
    pub messages: Vec<CapturedMessage>,
}

impl Capture {
    /// The composite store ID this capture targets.
    #[must_use]
    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::new(&self.platform, &self.conversation.original_id)
    }

    /// Detail fetches are authoritative for the whole message set; list
    /// views and stream fragments are partial.
    #[must_use]
    pub const fn mode(&self) -> IngestMode {
        match self.kind {
            CaptureKind::Detail => IngestMode::Full,
            CaptureKind::List | CaptureKind::Stream => IngestMode::Partial,
        }
    }

    /// The `detail_synced_at` stamp this capture contributes: present when
    /// the capture actually carried message detail.
    #[must_use]
    pub fn detail_synced_at(&self) -> Option<i64> {
        (self.kind == CaptureKind::Detail || !self.messages.is_empty()).then_some(self.captured_at)
    }

    /// Structural validation at the ingestion boundary.
    pub fn validate(&self) -> Result<()> {
        if self.platform.trim().is_empty() {
            return Err(Error::Validation("capture platform must not be empty".to_string()));
        }
        if self.conversation.original_id.trim().is_empty() {
            return Err(Error::Validation(
                "capture conversation ID must not be empty".to_string(),
            ));
        }
        if self.captured_at <= 0 {
            return Err(Error::Validation(format!(
                "capture timestamp must be positive, got {}",
                self.captured_at
            )));
        }
        if self.conversation.message_count < 0 {
            return Err(Error::Validation(format!(
                "capture message count must not be negative, got {}",
                self.conversation.message_count
            )));
        }
        for message in &self.messages {
            if message.id.trim().is_empty() {
                return Err(Error::Validation("capture message ID must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Parse one capture or an array of captures from raw JSON, validating
    /// each envelope.
    pub fn parse_batch(raw: &str) -> Result<Vec<Self>> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|error| Error::Validation(format!("capture payload is not valid JSON: {error}")))?;

        let captures: Vec<Self> = match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    serde_json::from_value(item)
                        .map_err(|error| Error::Validation(format!("malformed capture: {error}")))
                })
                .collect::<Result<_>>()?,
            object => vec![serde_json::from_value(object)
                .map_err(|error| Error::Validation(format!("malformed capture: {error}")))?],
        };

        for capture in &captures {
            capture.validate()?;
        }
        Ok(captures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        r#"{
            "platform": "chatgpt",
            "kind": "detail",
            "captured_at": 5000,
            "conversation": {
                "original_id": "c1",
                "title": "Rust questions",
                "created_at": 1000,
                "updated_at": 4000,
                "message_count": 2
            },
            "messages": [
                {"id": "m1", "role": "user", "content": "hi", "created_at": 1000},
                {"id": "m2", "role": "assistant", "content": "hello", "created_at": 1500}
            ]
        }"#
        .to_string()
    }

    #[test]
    fn test_parse_single_capture() {
        let captures = Capture::parse_batch(&sample_json()).unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].conversation_id().as_str(), "chatgpt_c1");
        assert_eq!(captures[0].mode(), IngestMode::Full);
        assert_eq!(captures[0].messages.len(), 2);
    }

    #[test]
    fn test_parse_capture_array() {
        let raw = format!("[{}, {}]", sample_json(), sample_json());
        let captures = Capture::parse_batch(&raw).unwrap();
        assert_eq!(captures.len(), 2);
    }

    #[test]
    fn test_reject_unknown_kind() {
        let raw = sample_json().replace("\"detail\"", "\"export\"");
        let error = Capture::parse_batch(&raw).unwrap_err();
        assert!(error.to_string().contains("malformed capture"));
    }

    #[test]
    fn test_reject_empty_platform() {
        let raw = sample_json().replace("\"chatgpt\"", "\"  \"");
        assert!(Capture::parse_batch(&raw).is_err());
    }

    #[test]
    fn test_reject_non_json() {
        assert!(Capture::parse_batch("not json").is_err());
    }

    #[test]
    fn test_mode_mapping() {
        let captures = Capture::parse_batch(&sample_json()).unwrap();
        let mut capture = captures.into_iter().next().unwrap();

        capture.kind = CaptureKind::List;
        assert_eq!(capture.mode(), IngestMode::Partial);
        capture.kind = CaptureKind::Stream;
        assert_eq!(capture.mode(), IngestMode::Partial);
        capture.kind = CaptureKind::Detail;
        assert_eq!(capture.mode(), IngestMode::Full);
    }

    #[test]
    fn test_detail_synced_at_requires_detail() {
        let captures = Capture::parse_batch(&sample_json()).unwrap();
        let mut capture = captures.into_iter().next().unwrap();
        assert_eq!(capture.detail_synced_at(), Some(5000));

        // A pure list refresh carries no detail
        capture.kind = CaptureKind::List;
        capture.messages.clear();
        assert_eq!(capture.detail_synced_at(), None);

        // A stream fragment with messages does
        capture.kind = CaptureKind::Stream;
        capture.messages.push(CapturedMessage {
            id: "m9".to_string(),
            role: MessageRole::User,
            content: "more".to_string(),
            created_at: 6000,
        });
        assert_eq!(capture.detail_synced_at(), Some(5000));
    }
}
