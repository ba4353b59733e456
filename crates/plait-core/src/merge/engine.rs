//! Generic two-way field merge over JSON object maps, plus typed
//! wrappers for the two entity types.

use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::merge::strategy::{MergeStrategy, CONVERSATION_STRATEGIES, MESSAGE_STRATEGIES};
use crate::models::{Conversation, Message};

/// Record-level timestamps driving lww decisions and conflict
/// classification.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
    pub local_modified_at: i64,
    pub remote_modified_at: i64,
    /// Last known common sync point between the two replicas
    pub last_synced_at: i64,
}

/// One field the strategy table could not auto-resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub field: String,
    pub local: Value,
    pub remote: Value,
}

/// Outcome of merging two records field-by-field.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub merged: Map<String, Value>,
    pub conflicts: Vec<FieldConflict>,
}

/// Merge of one typed entity pair.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMerge<T> {
    pub merged: T,
    pub conflicts: Vec<FieldConflict>,
}

/// Reconcile two records field-by-field per the strategy table.
///
/// Fields absent from the table keep the local value. A `Manual` field
/// whose sides diverged since `last_synced_at` lands in `conflicts` and
/// keeps the local value until a human decides.
#[must_use]
pub fn merge_fields(
    local: &Map<String, Value>,
    remote: &Map<String, Value>,
    strategies: &[(&str, MergeStrategy)],
    ctx: MergeContext,
) -> MergeOutcome {
    let mut merged = local.clone();
    let mut conflicts = Vec::new();

    for &(field, strategy) in strategies {
        let local_value = local.get(field).cloned().unwrap_or(Value::Null);
        let remote_value = remote.get(field).cloned().unwrap_or(Value::Null);
        if local_value == remote_value {
            continue;
        }

        let resolved = match strategy {
            MergeStrategy::LastWriterWins => last_writer_wins(local_value, remote_value, ctx),
            MergeStrategy::BoolOr => Value::Bool(truthy(&local_value) || truthy(&remote_value)),
            MergeStrategy::BoolAnd => Value::Bool(truthy(&local_value) && truthy(&remote_value)),
            MergeStrategy::SetUnion => set_union(&local_value, &remote_value),
            MergeStrategy::NumericMax => pick_numeric(local_value, remote_value, Ordering::Greater),
            MergeStrategy::NumericMin => pick_numeric(local_value, remote_value, Ordering::Less),
            MergeStrategy::Manual => match resolve_manual(local_value, remote_value, ctx) {
                ManualOutcome::Resolved(value) => value,
                ManualOutcome::NeedsUser { local, remote } => {
                    conflicts.push(FieldConflict {
                        field: field.to_string(),
                        local,
                        remote,
                    });
                    continue;
                }
            },
        };
        merged.insert(field.to_string(), resolved);
    }

    MergeOutcome { merged, conflicts }
}

/// Merge two replicas' copies of one conversation.
pub fn merge_conversations(
    local: &Conversation,
    remote: &Conversation,
    last_synced_at: i64,
) -> Result<EntityMerge<Conversation>> {
    merge_conversations_with(local, remote, last_synced_at, CONVERSATION_STRATEGIES)
}

/// Forced best-effort merge: every `Manual` field falls back to lww.
pub fn merge_conversations_auto(
    local: &Conversation,
    remote: &Conversation,
    last_synced_at: i64,
) -> Result<Conversation> {
    let upgraded = auto_strategies(CONVERSATION_STRATEGIES);
    let outcome = merge_conversations_with(local, remote, last_synced_at, &upgraded)?;
    Ok(outcome.merged)
}

/// Merge two replicas' copies of one message.
pub fn merge_messages(
    local: &Message,
    remote: &Message,
    last_synced_at: i64,
) -> Result<EntityMerge<Message>> {
    merge_messages_with(local, remote, last_synced_at, MESSAGE_STRATEGIES)
}

/// Forced best-effort merge: every `Manual` field falls back to lww.
pub fn merge_messages_auto(
    local: &Message,
    remote: &Message,
    last_synced_at: i64,
) -> Result<Message> {
    let upgraded = auto_strategies(MESSAGE_STRATEGIES);
    let outcome = merge_messages_with(local, remote, last_synced_at, &upgraded)?;
    Ok(outcome.merged)
}

fn merge_conversations_with(
    local: &Conversation,
    remote: &Conversation,
    last_synced_at: i64,
    strategies: &[(&str, MergeStrategy)],
) -> Result<EntityMerge<Conversation>> {
    let ctx = MergeContext {
        local_modified_at: local.modified_at,
        remote_modified_at: remote.modified_at,
        last_synced_at,
    };
    let outcome = merge_fields(&to_map(local)?, &to_map(remote)?, strategies, ctx);
    let mut merged: Conversation = serde_json::from_value(Value::Object(outcome.merged))?;

    // Across replicas detail status takes the higher rank; the ingest-time
    // demotion rule applies only to fresh platform captures.
    merged.detail_status = local.detail_status.max(remote.detail_status);
    if merged.updated_at < merged.created_at {
        merged.updated_at = merged.created_at;
    }
    merged.favorite_at = paired_stamp(merged.is_favorite, merged.favorite_at, merged.modified_at);
    merged.deleted_at = paired_stamp(merged.deleted, merged.deleted_at, merged.modified_at);

    Ok(EntityMerge {
        merged,
        conflicts: outcome.conflicts,
    })
}

fn merge_messages_with(
    local: &Message,
    remote: &Message,
    last_synced_at: i64,
    strategies: &[(&str, MergeStrategy)],
) -> Result<EntityMerge<Message>> {
    let ctx = MergeContext {
        local_modified_at: local.modified_at,
        remote_modified_at: remote.modified_at,
        last_synced_at,
    };
    let outcome = merge_fields(&to_map(local)?, &to_map(remote)?, strategies, ctx);
    let mut merged: Message = serde_json::from_value(Value::Object(outcome.merged))?;
    merged.deleted_at = paired_stamp(merged.deleted, merged.deleted_at, merged.modified_at);

    Ok(EntityMerge {
        merged,
        conflicts: outcome.conflicts,
    })
}

fn auto_strategies(
    table: &[(&'static str, MergeStrategy)],
) -> Vec<(&'static str, MergeStrategy)> {
    table
        .iter()
        .map(|&(field, strategy)| (field, strategy.auto_upgraded()))
        .collect()
}

pub(crate) fn to_map<T: Serialize>(entity: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Validation(format!(
            "expected a JSON object to merge, got {other}"
        ))),
    }
}

enum ManualOutcome {
    Resolved(Value),
    NeedsUser { local: Value, remote: Value },
}

/// Values are already known unequal here.
fn resolve_manual(local: Value, remote: Value, ctx: MergeContext) -> ManualOutcome {
    let local_changed = ctx.local_modified_at > ctx.last_synced_at;
    let remote_changed = ctx.remote_modified_at > ctx.last_synced_at;
    match (local_changed, remote_changed) {
        (true, true) => ManualOutcome::NeedsUser { local, remote },
        (true, false) => ManualOutcome::Resolved(local),
        (false, true) => ManualOutcome::Resolved(remote),
        (false, false) => ManualOutcome::Resolved(last_writer_wins(local, remote, ctx)),
    }
}

fn last_writer_wins(local: Value, remote: Value, ctx: MergeContext) -> Value {
    if ctx.remote_modified_at > ctx.local_modified_at {
        remote
    } else {
        local
    }
}

fn truthy(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

fn set_union(local: &Value, remote: &Value) -> Value {
    let mut union: Vec<Value> = local.as_array().cloned().unwrap_or_default();
    if let Some(remote_items) = remote.as_array() {
        for item in remote_items {
            if !union.contains(item) {
                union.push(item.clone());
            }
        }
    }
    Value::Array(union)
}

/// Null on one side never beats a real number on the other.
fn pick_numeric(local: Value, remote: Value, prefer: Ordering) -> Value {
    match (local.as_f64(), remote.as_f64()) {
        (Some(local_number), Some(remote_number)) => {
            if remote_number.partial_cmp(&local_number) == Some(prefer) {
                remote
            } else {
                local
            }
        }
        (None, Some(_)) => remote,
        _ => local,
    }
}

fn paired_stamp(flag: bool, stamp: Option<i64>, fallback: i64) -> Option<i64> {
    if flag {
        stamp.or(Some(fallback))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationId, DetailStatus, MessageRole};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn ctx(local: i64, remote: i64, synced: i64) -> MergeContext {
        MergeContext {
            local_modified_at: local,
            remote_modified_at: remote,
            last_synced_at: synced,
        }
    }

    #[test]
    fn test_set_union_merges_tags() {
        let outcome = merge_fields(
            &object(json!({"tags": ["a", "b"]})),
            &object(json!({"tags": ["b", "c"]})),
            &[("tags", MergeStrategy::SetUnion)],
            ctx(0, 0, 0),
        );
        assert_eq!(outcome.merged["tags"], json!(["a", "b", "c"]));
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_bool_or_keeps_any_true() {
        let outcome = merge_fields(
            &object(json!({"is_favorite": true})),
            &object(json!({"is_favorite": false})),
            &[("is_favorite", MergeStrategy::BoolOr)],
            ctx(1_000, 2_000, 0),
        );
        assert_eq!(outcome.merged["is_favorite"], json!(true));
    }

    #[test]
    fn test_bool_and_requires_agreement() {
        let outcome = merge_fields(
            &object(json!({"deleted": true})),
            &object(json!({"deleted": false})),
            &[("deleted", MergeStrategy::BoolAnd)],
            ctx(1_000, 2_000, 0),
        );
        assert_eq!(outcome.merged["deleted"], json!(false));
    }

    #[test]
    fn test_numeric_max() {
        let outcome = merge_fields(
            &object(json!({"sync_version": 5})),
            &object(json!({"sync_version": 3})),
            &[("sync_version", MergeStrategy::NumericMax)],
            ctx(0, 0, 0),
        );
        assert_eq!(outcome.merged["sync_version"], json!(5));
    }

    #[test]
    fn test_numeric_min_and_null_handling() {
        let outcome = merge_fields(
            &object(json!({"created_at": 400, "detail_synced_at": null})),
            &object(json!({"created_at": 300, "detail_synced_at": 900})),
            &[
                ("created_at", MergeStrategy::NumericMin),
                ("detail_synced_at", MergeStrategy::NumericMax),
            ],
            ctx(0, 0, 0),
        );
        assert_eq!(outcome.merged["created_at"], json!(300));
        assert_eq!(outcome.merged["detail_synced_at"], json!(900));
    }

    #[test]
    fn test_lww_prefers_newer_and_ties_favor_local() {
        let newer_remote = merge_fields(
            &object(json!({"preview": "old"})),
            &object(json!({"preview": "new"})),
            &[("preview", MergeStrategy::LastWriterWins)],
            ctx(1_000, 2_000, 0),
        );
        assert_eq!(newer_remote.merged["preview"], json!("new"));

        let tie = merge_fields(
            &object(json!({"preview": "mine"})),
            &object(json!({"preview": "theirs"})),
            &[("preview", MergeStrategy::LastWriterWins)],
            ctx(2_000, 2_000, 0),
        );
        assert_eq!(tie.merged["preview"], json!("mine"));
    }

    #[test]
    fn test_undeclared_fields_keep_local() {
        let outcome = merge_fields(
            &object(json!({"id": "local-id", "title": "same"})),
            &object(json!({"id": "remote-id", "title": "same"})),
            &[("title", MergeStrategy::Manual)],
            ctx(1_000, 2_000, 0),
        );
        assert_eq!(outcome.merged["id"], json!("local-id"));
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_manual_conflict_when_both_sides_changed() {
        let outcome = merge_fields(
            &object(json!({"title": "local edit"})),
            &object(json!({"title": "remote edit"})),
            &[("title", MergeStrategy::Manual)],
            ctx(1_500, 1_800, 1_000),
        );
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].field, "title");
        assert_eq!(outcome.conflicts[0].local, json!("local edit"));
        assert_eq!(outcome.conflicts[0].remote, json!("remote edit"));
        // Local value holds until a human decides
        assert_eq!(outcome.merged["title"], json!("local edit"));
    }

    #[test]
    fn test_manual_single_sided_change_wins_silently() {
        let remote_only = merge_fields(
            &object(json!({"title": "stale"})),
            &object(json!({"title": "renamed"})),
            &[("title", MergeStrategy::Manual)],
            ctx(500, 1_800, 1_000),
        );
        assert!(remote_only.conflicts.is_empty());
        assert_eq!(remote_only.merged["title"], json!("renamed"));

        let local_only = merge_fields(
            &object(json!({"title": "renamed"})),
            &object(json!({"title": "stale"})),
            &[("title", MergeStrategy::Manual)],
            ctx(1_800, 500, 1_000),
        );
        assert!(local_only.conflicts.is_empty());
        assert_eq!(local_only.merged["title"], json!("renamed"));
    }

    fn conversation_pair() -> (Conversation, Conversation) {
        let mut local = Conversation::new("chatgpt", "c1", 1_000);
        local.title = "Local title".to_string();
        local.tags = ["rust".to_string()].into_iter().collect();
        local.sync_version = 5;
        local.modified_at = 1_500;

        let mut remote = local.clone();
        remote.title = "Remote title".to_string();
        remote.tags = ["sync".to_string()].into_iter().collect();
        remote.sync_version = 3;
        remote.is_favorite = true;
        remote.favorite_at = Some(1_600);
        remote.detail_status = DetailStatus::Full;
        remote.modified_at = 1_800;
        (local, remote)
    }

    #[test]
    fn test_merge_conversations_parks_title_and_merges_the_rest() {
        let (local, remote) = conversation_pair();
        let merge = merge_conversations(&local, &remote, 1_000).unwrap();

        assert_eq!(merge.conflicts.len(), 1);
        assert_eq!(merge.conflicts[0].field, "title");
        assert_eq!(merge.merged.title, "Local title");
        assert!(merge.merged.is_favorite);
        assert_eq!(merge.merged.favorite_at, Some(1_600));
        assert_eq!(merge.merged.detail_status, DetailStatus::Full);
        assert_eq!(merge.merged.sync_version, 5);
        let tags: Vec<&str> = merge.merged.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["rust", "sync"]);
    }

    #[test]
    fn test_merge_conversations_auto_resolves_by_lww() {
        let (local, remote) = conversation_pair();
        let merged = merge_conversations_auto(&local, &remote, 1_000).unwrap();
        // Remote edit is newer (1800 > 1500)
        assert_eq!(merged.title, "Remote title");
    }

    #[test]
    fn test_merge_conversations_identity_is_never_overwritten() {
        let (local, mut remote) = conversation_pair();
        remote.platform = "claude".to_string();
        let merge = merge_conversations(&local, &remote, 1_000).unwrap();
        assert_eq!(merge.merged.platform, "chatgpt");
        assert_eq!(merge.merged.id, local.id);
    }

    #[test]
    fn test_merge_messages_agreed_tombstone_sticks() {
        let conversation_id = ConversationId::new("chatgpt", "c1");
        let mut local = Message::new(conversation_id, "m1", MessageRole::User, "hi", 1_000);
        local.deleted = true;
        local.deleted_at = Some(1_400);
        local.modified_at = 1_400;

        let mut remote = local.clone();
        remote.deleted_at = Some(1_900);
        remote.modified_at = 1_900;

        let merge = merge_messages(&local, &remote, 1_000).unwrap();
        assert!(merge.merged.deleted);
        assert_eq!(merge.merged.deleted_at, Some(1_900));
        assert!(merge.conflicts.is_empty());
    }

    #[test]
    fn test_merge_messages_divergent_content_conflicts() {
        let conversation_id = ConversationId::new("chatgpt", "c1");
        let mut local = Message::new(conversation_id, "m1", MessageRole::User, "draft A", 1_000);
        local.modified_at = 1_500;
        let mut remote = local.clone();
        remote.content = "draft B".to_string();
        remote.modified_at = 1_700;

        let merge = merge_messages(&local, &remote, 1_200).unwrap();
        assert_eq!(merge.conflicts.len(), 1);
        assert_eq!(merge.conflicts[0].field, "content");
        assert_eq!(merge.merged.content, "draft A");

        let forced = merge_messages_auto(&local, &remote, 1_200).unwrap();
        assert_eq!(forced.content, "draft B");
    }
}
