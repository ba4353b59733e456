//! Ingestion merge: fold one validated capture into the stored state.
//!
//! Planning is pure. `plan_ingest` takes the stored conversation, its
//! stored messages, and an explicit clock, and returns the rows to write;
//! the service layer applies a plan inside a single transaction. Applying
//! the identical capture twice yields an `Unchanged` plan the second time,
//! so retries never dirty the store.

use std::collections::HashMap;

use crate::merge::dedupe;
use crate::models::{
    Capture, Conversation, ConversationId, DetailStatus, IngestMode, Message, MessageRole,
};
use crate::util::{normalize_text_option, truncate_chars};

/// Preview text is capped at this many characters.
pub const PREVIEW_MAX_CHARS: usize = 200;

/// What a capture did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First capture of this conversation
    Inserted,
    /// Folded into an existing conversation
    Merged,
    /// The capture carried nothing new
    Unchanged,
    /// The conversation is tombstoned and the capture is not newer
    SkippedTombstoned,
}

/// The rows one capture wants written, or nothing at all.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestPlan {
    pub outcome: IngestOutcome,
    pub conversation: Option<Conversation>,
    pub new_messages: Vec<Message>,
}

impl IngestPlan {
    const fn untouched(outcome: IngestOutcome) -> Self {
        Self {
            outcome,
            conversation: None,
            new_messages: Vec::new(),
        }
    }
}

/// Per-capture summary returned by the ingest surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub conversation_id: ConversationId,
    pub outcome: IngestOutcome,
    pub new_messages: usize,
}

/// Plan the merge of one capture against the stored state.
///
/// `stored_messages` must hold every message row of the conversation,
/// tombstoned ones included, so a dead ID is never reused.
#[must_use]
pub fn plan_ingest(
    existing: Option<&Conversation>,
    stored_messages: &HashMap<String, Message>,
    capture: &Capture,
    now_ms: i64,
) -> IngestPlan {
    existing.map_or_else(
        || plan_insert(stored_messages, capture, now_ms),
        |existing| plan_merge(existing, stored_messages, capture, now_ms),
    )
}

fn plan_insert(
    stored_messages: &HashMap<String, Message>,
    capture: &Capture,
    now_ms: i64,
) -> IngestPlan {
    let id = capture.conversation_id();
    let deduped = dedupe(capture_messages(capture, &id, now_ms), stored_messages);
    let incoming = &capture.conversation;

    let mut conversation = Conversation::new(
        capture.platform.clone(),
        incoming.original_id.clone(),
        now_ms,
    );
    conversation.title = incoming.title.clone();
    conversation.summary = normalize_text_option(incoming.summary.clone());
    conversation.url = normalize_text_option(incoming.url.clone());
    conversation.tags = incoming.tags.clone();
    conversation.created_at = incoming.created_at;
    conversation.updated_at = incoming.updated_at.max(incoming.created_at);
    conversation.synced_at = capture.captured_at;
    conversation.detail_synced_at = capture.detail_synced_at();

    match capture.mode() {
        IngestMode::Full => {
            conversation.detail_status = DetailStatus::Full;
            conversation.message_count = count(&deduped);
            conversation.preview = full_preview(&deduped);
        }
        IngestMode::Partial => {
            conversation.detail_status = DetailStatus::Partial;
            conversation.message_count = incoming.message_count.max(count(&deduped));
            conversation.preview = partial_preview(&deduped).unwrap_or_default();
        }
    }

    IngestPlan {
        outcome: IngestOutcome::Inserted,
        conversation: Some(conversation),
        new_messages: deduped,
    }
}

fn plan_merge(
    existing: &Conversation,
    stored_messages: &HashMap<String, Message>,
    capture: &Capture,
    now_ms: i64,
) -> IngestPlan {
    let incoming = &capture.conversation;

    // A tombstoned conversation only comes back for strictly newer activity
    if existing.deleted && incoming.updated_at <= tombstone_time(existing) {
        return IngestPlan::untouched(IngestOutcome::SkippedTombstoned);
    }

    let mut merged = existing.clone();

    if !incoming.title.trim().is_empty() {
        merged.title = incoming.title.clone();
    }
    merged.created_at = existing.created_at.min(incoming.created_at);
    merged.updated_at = existing.updated_at.max(incoming.updated_at);
    merged.synced_at = existing.synced_at.max(capture.captured_at);
    merged.message_count = existing.message_count.max(incoming.message_count);
    if let Some(summary) = normalize_text_option(incoming.summary.clone()) {
        merged.summary = Some(summary);
    }
    if let Some(url) = normalize_text_option(incoming.url.clone()) {
        merged.url = Some(url);
    }
    merged.tags.extend(incoming.tags.iter().cloned());
    merged.detail_synced_at = max_option(existing.detail_synced_at, capture.detail_synced_at());

    let incoming_status = match capture.mode() {
        IngestMode::Full => DetailStatus::Full,
        IngestMode::Partial => DetailStatus::Partial,
    };
    if incoming_status.rank() >= existing.detail_status.rank() {
        merged.detail_status = incoming_status;
    } else if incoming.updated_at > existing.updated_at
        && existing.detail_status == DetailStatus::Full
    {
        // Newer but less detailed: stale full detail must not be presented
        // as still fully fresh
        merged.detail_status = DetailStatus::Partial;
    }

    let deduped = dedupe(capture_messages(capture, &existing.id, now_ms), stored_messages);
    let new_messages: Vec<Message> = deduped
        .iter()
        .filter(|message| !stored_messages.contains_key(&message.id))
        .cloned()
        .collect();

    match capture.mode() {
        IngestMode::Full => {
            merged.message_count = count(&deduped);
            merged.preview = full_preview(&deduped);
        }
        IngestMode::Partial => {
            if !capture.messages.is_empty() {
                merged.message_count = existing.message_count + count(&new_messages);
            }
            if let Some(preview) = partial_preview(&new_messages) {
                merged.preview = preview;
            }
        }
    }

    if existing.deleted {
        merged.deleted = false;
        merged.deleted_at = None;
    }

    if merged == *existing && new_messages.is_empty() {
        return IngestPlan::untouched(IngestOutcome::Unchanged);
    }

    merged.mark_modified(now_ms);
    IngestPlan {
        outcome: IngestOutcome::Merged,
        conversation: Some(merged),
        new_messages,
    }
}

fn capture_messages(capture: &Capture, id: &ConversationId, now_ms: i64) -> Vec<Message> {
    capture
        .messages
        .iter()
        .map(|captured| {
            let mut message = Message::new(
                id.clone(),
                captured.id.clone(),
                captured.role,
                captured.content.clone(),
                captured.created_at,
            );
            message.modified_at = now_ms;
            message
        })
        .collect()
}

/// First user message, else first message, capped for display.
fn full_preview(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|message| message.role == MessageRole::User)
        .or_else(|| messages.first())
        .map(|message| truncate_chars(&message.content, PREVIEW_MAX_CHARS))
        .unwrap_or_default()
}

/// Most recent new user message, when there is one.
fn partial_preview(new_messages: &[Message]) -> Option<String> {
    new_messages
        .iter()
        .filter(|message| message.role == MessageRole::User)
        .max_by_key(|message| message.created_at)
        .map(|message| truncate_chars(&message.content, PREVIEW_MAX_CHARS))
}

fn tombstone_time(conversation: &Conversation) -> i64 {
    conversation.deleted_at.unwrap_or(conversation.modified_at)
}

fn count(messages: &[Message]) -> i64 {
    i64::try_from(messages.len()).unwrap_or(i64::MAX)
}

fn max_option(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaptureKind, CapturedConversation, CapturedMessage};
    use pretty_assertions::assert_eq;

    fn capture(kind: CaptureKind, captured_at: i64) -> Capture {
        Capture {
            platform: "chatgpt".to_string(),
            kind,
            captured_at,
            conversation: CapturedConversation {
                original_id: "c1".to_string(),
                title: "Rust questions".to_string(),
                created_at: 1_000,
                updated_at: 2_000,
                message_count: 0,
                summary: None,
                url: None,
                tags: std::collections::BTreeSet::new(),
            },
            messages: Vec::new(),
        }
    }

    fn captured_message(id: &str, role: MessageRole, content: &str, created_at: i64) -> CapturedMessage {
        CapturedMessage {
            id: id.to_string(),
            role,
            content: content.to_string(),
            created_at,
        }
    }

    fn full_capture_with_five_messages() -> Capture {
        let mut capture = capture(CaptureKind::Detail, 5_000);
        capture.conversation.message_count = 5;
        capture.messages = vec![
            captured_message("m1", MessageRole::System, "be helpful", 1_000),
            captured_message("m2", MessageRole::User, "how do lifetimes work?", 1_100),
            captured_message("m3", MessageRole::Assistant, "let me explain", 1_200),
            captured_message("m4", MessageRole::User, "thanks", 1_300),
            captured_message("m5", MessageRole::Assistant, "welcome", 1_400),
        ];
        capture
    }

    /// Apply a plan the way the service layer would, in memory.
    fn apply(
        plan: &IngestPlan,
        store: &mut (Option<Conversation>, HashMap<String, Message>),
    ) {
        if let Some(conversation) = &plan.conversation {
            store.0 = Some(conversation.clone());
        }
        for message in &plan.new_messages {
            store.1.insert(message.id.clone(), message.clone());
        }
    }

    #[test]
    fn test_insert_full_capture() {
        let capture = full_capture_with_five_messages();
        let plan = plan_ingest(None, &HashMap::new(), &capture, 9_000);

        assert_eq!(plan.outcome, IngestOutcome::Inserted);
        let conversation = plan.conversation.unwrap();
        assert_eq!(conversation.id.as_str(), "chatgpt_c1");
        assert_eq!(conversation.detail_status, DetailStatus::Full);
        assert_eq!(conversation.message_count, 5);
        assert_eq!(conversation.preview, "how do lifetimes work?");
        assert_eq!(conversation.detail_synced_at, Some(5_000));
        assert_eq!(conversation.synced_at, 5_000);
        assert_eq!(conversation.modified_at, 9_000);
        assert!(conversation.dirty);
        assert_eq!(plan.new_messages.len(), 5);
    }

    #[test]
    fn test_insert_list_capture_without_messages() {
        let mut list = capture(CaptureKind::List, 5_000);
        list.conversation.message_count = 12;
        let plan = plan_ingest(None, &HashMap::new(), &list, 9_000);

        let conversation = plan.conversation.unwrap();
        assert_eq!(conversation.detail_status, DetailStatus::Partial);
        assert_eq!(conversation.message_count, 12);
        assert_eq!(conversation.preview, "");
        assert_eq!(conversation.detail_synced_at, None);
        assert!(plan.new_messages.is_empty());
    }

    #[test]
    fn test_metadata_merge_uses_min_and_max() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );

        let mut refresh = capture(CaptureKind::List, 6_000);
        refresh.conversation.created_at = 500;
        refresh.conversation.updated_at = 3_000;
        refresh.conversation.message_count = 9;
        refresh.conversation.title = String::new();

        let plan = plan_ingest(store.0.as_ref(), &store.1, &refresh, 9_500);
        let merged = plan.conversation.unwrap();
        assert_eq!(merged.created_at, 500);
        assert_eq!(merged.updated_at, 3_000);
        assert_eq!(merged.synced_at, 6_000);
        assert_eq!(merged.message_count, 9);
        // Empty incoming title keeps the existing one
        assert_eq!(merged.title, "Rust questions");
    }

    #[test]
    fn test_newer_list_refresh_demotes_stale_full_detail() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );

        let mut refresh = capture(CaptureKind::List, 6_000);
        refresh.conversation.updated_at = 4_000;
        let plan = plan_ingest(store.0.as_ref(), &store.1, &refresh, 9_500);
        assert_eq!(
            plan.conversation.unwrap().detail_status,
            DetailStatus::Partial
        );
    }

    #[test]
    fn test_older_list_refresh_keeps_full_detail() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );

        let mut refresh = capture(CaptureKind::List, 6_000);
        refresh.conversation.updated_at = 1_500;
        refresh.conversation.message_count = 5;
        let plan = plan_ingest(store.0.as_ref(), &store.1, &refresh, 9_500);
        // Only synced_at moves; stale full detail is still trusted
        assert_eq!(plan.outcome, IngestOutcome::Merged);
        let merged = plan.conversation.unwrap();
        assert_eq!(merged.detail_status, DetailStatus::Full);
        assert_eq!(merged.synced_at, 6_000);
        assert_eq!(merged.updated_at, 2_000);
    }

    #[test]
    fn test_partial_stream_folds_new_messages() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );

        let mut stream = capture(CaptureKind::Stream, 6_000);
        stream.conversation.updated_at = 4_000;
        stream.messages = vec![
            captured_message("m6", MessageRole::User, "one more question", 1_500),
            captured_message("m7", MessageRole::User, "and another", 1_600),
            captured_message("m2", MessageRole::User, "how do lifetimes work?", 1_100),
        ];

        let plan = plan_ingest(store.0.as_ref(), &store.1, &stream, 9_500);
        assert_eq!(plan.outcome, IngestOutcome::Merged);
        assert_eq!(plan.new_messages.len(), 2);

        let merged = plan.conversation.unwrap();
        assert_eq!(merged.message_count, 7);
        assert_eq!(merged.detail_status, DetailStatus::Partial);
        assert_eq!(merged.preview, "and another");
        assert_eq!(merged.detail_synced_at, Some(6_000));
    }

    #[test]
    fn test_partial_without_user_messages_keeps_preview() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );

        let mut stream = capture(CaptureKind::Stream, 6_000);
        stream.messages = vec![captured_message(
            "m6",
            MessageRole::Assistant,
            "a follow-up",
            1_500,
        )];
        let plan = plan_ingest(store.0.as_ref(), &store.1, &stream, 9_500);
        let merged = plan.conversation.unwrap();
        assert_eq!(merged.preview, "how do lifetimes work?");
        assert_eq!(merged.message_count, 6);
    }

    #[test]
    fn test_full_recapture_is_authoritative_for_count() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );
        // Platform pruned the thread; a fresh detail fetch reports 2 turns
        let mut shrunk = capture(CaptureKind::Detail, 6_000);
        shrunk.messages = vec![
            captured_message("m2", MessageRole::User, "how do lifetimes work?", 1_100),
            captured_message("m3", MessageRole::Assistant, "let me explain", 1_200),
        ];
        let plan = plan_ingest(store.0.as_ref(), &store.1, &shrunk, 9_500);
        assert_eq!(plan.conversation.unwrap().message_count, 2);
        assert!(plan.new_messages.is_empty());
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let full = full_capture_with_five_messages();
        let mut store = (None, HashMap::new());
        apply(&plan_ingest(None, &store.1, &full, 9_000), &mut store);
        let replay = plan_ingest(store.0.as_ref(), &store.1, &full, 9_900);
        assert_eq!(replay.outcome, IngestOutcome::Unchanged);
        assert_eq!(replay.conversation, None);
        assert!(replay.new_messages.is_empty());

        let mut stream = capture(CaptureKind::Stream, 6_000);
        stream.conversation.updated_at = 4_000;
        stream.messages = vec![captured_message("m6", MessageRole::User, "more", 1_500)];
        apply(
            &plan_ingest(store.0.as_ref(), &store.1, &stream, 9_950),
            &mut store,
        );
        let replay = plan_ingest(store.0.as_ref(), &store.1, &stream, 9_999);
        assert_eq!(replay.outcome, IngestOutcome::Unchanged);
    }

    #[test]
    fn test_colliding_capture_id_is_deduped_before_persist() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );

        let mut stream = capture(CaptureKind::Stream, 6_000);
        stream.messages = vec![captured_message(
            "m2",
            MessageRole::User,
            "entirely different words",
            1_700,
        )];
        let plan = plan_ingest(store.0.as_ref(), &store.1, &stream, 9_500);
        assert_eq!(plan.new_messages.len(), 1);
        assert_eq!(plan.new_messages[0].id, "m2_dup1");
    }

    #[test]
    fn test_replaying_a_colliding_capture_is_idempotent() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );

        let mut stream = capture(CaptureKind::Stream, 6_000);
        stream.conversation.updated_at = 4_000;
        stream.messages = vec![captured_message(
            "m1",
            MessageRole::User,
            "entirely different words",
            1_700,
        )];
        let first = plan_ingest(store.0.as_ref(), &store.1, &stream, 9_500);
        assert_eq!(first.outcome, IngestOutcome::Merged);
        assert_eq!(first.new_messages.len(), 1);
        assert_eq!(first.new_messages[0].id, "m1_dup1");
        apply(&first, &mut store);

        // A retry of the same capture must fold onto m1_dup1, not mint m1_dup2
        let replay = plan_ingest(store.0.as_ref(), &store.1, &stream, 9_900);
        assert_eq!(replay.outcome, IngestOutcome::Unchanged);
        assert_eq!(replay.conversation, None);
        assert!(replay.new_messages.is_empty());
    }

    #[test]
    fn test_tombstoned_conversation_skips_stale_capture() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );
        if let Some(conversation) = store.0.as_mut() {
            conversation.tombstone(10_000);
        }

        let stale = full_capture_with_five_messages();
        let plan = plan_ingest(store.0.as_ref(), &store.1, &stale, 11_000);
        assert_eq!(plan.outcome, IngestOutcome::SkippedTombstoned);
        assert_eq!(plan.conversation, None);
    }

    #[test]
    fn test_tombstoned_conversation_resurrects_on_newer_capture() {
        let mut store = (None, HashMap::new());
        apply(
            &plan_ingest(None, &store.1, &full_capture_with_five_messages(), 9_000),
            &mut store,
        );
        if let Some(conversation) = store.0.as_mut() {
            conversation.tombstone(10_000);
        }

        let mut revived = capture(CaptureKind::List, 12_000);
        revived.conversation.updated_at = 11_000;
        let plan = plan_ingest(store.0.as_ref(), &store.1, &revived, 12_500);
        assert_eq!(plan.outcome, IngestOutcome::Merged);
        let merged = plan.conversation.unwrap();
        assert!(!merged.deleted);
        assert_eq!(merged.deleted_at, None);
    }
}
