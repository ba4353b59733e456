//! The sync pass: fetch, merge, upload, commit.
//!
//! One pass reconciles the local store against the remote snapshot entity
//! by entity and uploads the merged state back. Only one pass runs at a
//! time; a request that arrives while a pass is active is turned away
//! without touching the remote. Merge results are committed row by row, so
//! a pass that dies mid-way leaves earlier merges durable and the next
//! pass simply redoes the rest against the same remote state.
//!
//! Parked conflicts survive later passes: while the two sides of a field
//! still disagree, each pass keeps the conflict row (same ID, refreshed
//! snapshots), holds the local value locally, and uploads the remote value
//! in its place. Resolution is the only way a side wins.

use async_trait::async_trait;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::PoisonError;
use tokio::sync::Mutex;

use crate::db::{
    sync_meta_repository::{LAST_ERROR, LAST_REPORT},
    ConflictRepository, ConversationRepository, Database, MessageRepository,
    SqliteConflictRepository, SqliteConversationRepository, SqliteMessageRepository,
    SqliteSyncMetaRepository, SyncMetaRepository,
};
use crate::error::{Error, Result, SyncErrorCategory};
use crate::merge::{merge_conversations, merge_messages, to_map, FieldConflict};
use crate::models::{ConflictId, Conversation, ConversationId, EntityKind, Message, MergeConflict};
use crate::state::SyncPhase;
use crate::sync::remote::{RemoteSnapshot, RemoteStore};

/// Counters from one committed sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub completed_at: i64,
    pub conversations_uploaded: usize,
    pub conversations_downloaded: usize,
    pub messages_uploaded: usize,
    pub messages_downloaded: usize,
    /// Newly detected conflicts; carried-over ones are not re-counted
    pub conflicts_found: usize,
}

impl SyncReport {
    /// True when the pass moved no data in either direction
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.conversations_uploaded == 0
            && self.conversations_downloaded == 0
            && self.messages_uploaded == 0
            && self.messages_downloaded == 0
            && self.conflicts_found == 0
    }

    /// Net direction of the pass, derived from the counters.
    #[must_use]
    pub const fn direction(&self) -> SyncDirection {
        let uploaded = self.conversations_uploaded + self.messages_uploaded > 0;
        let downloaded = self.conversations_downloaded + self.messages_downloaded > 0;
        match (uploaded, downloaded) {
            (true, true) => SyncDirection::Bidirectional,
            (true, false) => SyncDirection::Upload,
            (false, true) => SyncDirection::Download,
            (false, false) => SyncDirection::None,
        }
    }
}

/// Which way data moved during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    None,
    Upload,
    Download,
    Bidirectional,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Bidirectional => "bidirectional",
        };
        formatter.write_str(label)
    }
}

/// Details of the last failed pass, kept for the status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub category: SyncErrorCategory,
    pub message: String,
    pub failed_at: i64,
}

/// What a sync request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRun {
    /// A full pass ran and committed
    Completed(SyncReport),
    /// Another pass held the flight lock, nothing was done
    AlreadyRunning,
}

/// Drives sync passes against one remote store.
pub struct SyncEngine {
    remote: Box<dyn RemoteStore>,
    phase: std::sync::Mutex<SyncPhase>,
    flight: Mutex<()>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(remote: Box<dyn RemoteStore>) -> Self {
        Self {
            remote,
            phase: std::sync::Mutex::new(SyncPhase::Idle),
            flight: Mutex::new(()),
        }
    }

    /// Where the engine currently stands
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Run one sync pass.
    ///
    /// Returns [`SyncRun::AlreadyRunning`] without fetching when a pass is
    /// already in flight. On failure the error is recorded for the status
    /// surface, the watermark stays put, and dirty flags survive so the
    /// next pass retries the upload.
    pub async fn sync(&self, database: &Mutex<Database>, now_ms: i64) -> Result<SyncRun> {
        let Ok(_flight) = self.flight.try_lock() else {
            tracing::info!("Sync pass already running, not starting another");
            return Ok(SyncRun::AlreadyRunning);
        };

        self.set_phase(SyncPhase::Syncing);
        match self.pass(database, now_ms).await {
            Ok(report) => {
                self.set_phase(SyncPhase::Success);
                Ok(SyncRun::Completed(report))
            }
            Err(error) => {
                self.set_phase(SyncPhase::Error);
                self.record_failure(database, &error, now_ms).await;
                Err(error)
            }
        }
    }

    async fn pass(&self, database: &Mutex<Database>, now_ms: i64) -> Result<SyncReport> {
        let mut db = database.lock().await;

        let watermark = SqliteSyncMetaRepository::new(db.connection()).last_synced_at()?;
        tracing::info!(remote = self.remote.name(), watermark, "Starting sync pass");

        let fetched = self.remote.fetch().await?;
        let outcome = merge_snapshot(db.connection(), fetched, watermark, now_ms)?;

        self.remote.store(&outcome.snapshot).await?;

        let tx = db.transaction()?;
        {
            let conversations = SqliteConversationRepository::new(&tx);
            for id in &outcome.clean_conversations {
                conversations.mark_clean(id)?;
            }
            let messages = SqliteMessageRepository::new(&tx);
            for (conversation_id, message_id) in &outcome.clean_messages {
                messages.mark_clean(conversation_id, message_id)?;
            }
            let meta = SqliteSyncMetaRepository::new(&tx);
            meta.set_last_synced_at(now_ms)?;
            meta.set(LAST_REPORT, &serde_json::to_string(&outcome.report)?)?;
            meta.delete(LAST_ERROR)?;
        }
        tx.commit()?;

        tracing::info!(
            uploaded = outcome.report.conversations_uploaded + outcome.report.messages_uploaded,
            downloaded =
                outcome.report.conversations_downloaded + outcome.report.messages_downloaded,
            conflicts = outcome.report.conflicts_found,
            "Sync pass complete"
        );
        Ok(outcome.report)
    }

    async fn record_failure(&self, database: &Mutex<Database>, error: &Error, now_ms: i64) {
        let failure = SyncFailure {
            category: error.sync_category(),
            message: error.to_string(),
            failed_at: now_ms,
        };
        tracing::error!(category = %failure.category, error = %error, "Sync pass failed");

        let db = database.lock().await;
        let meta = SqliteSyncMetaRepository::new(db.connection());
        let persisted = serde_json::to_string(&failure)
            .map_err(Error::from)
            .and_then(|json| meta.set(LAST_ERROR, &json));
        if let Err(persist_error) = persisted {
            tracing::warn!(error = %persist_error, "Could not record the sync failure");
        }
    }
}

/// Last committed pass report, if any pass ever completed.
pub fn last_report(meta: &impl SyncMetaRepository) -> Result<Option<SyncReport>> {
    meta.get(LAST_REPORT)?
        .map(|raw| serde_json::from_str(&raw).map_err(Error::from))
        .transpose()
}

/// Last recorded failure, cleared by the next successful pass.
pub fn last_failure(meta: &impl SyncMetaRepository) -> Result<Option<SyncFailure>> {
    meta.get(LAST_ERROR)?
        .map(|raw| serde_json::from_str(&raw).map_err(Error::from))
        .transpose()
}

struct PassOutcome {
    snapshot: RemoteSnapshot,
    report: SyncReport,
    clean_conversations: Vec<ConversationId>,
    clean_messages: Vec<(ConversationId, String)>,
}

/// Merge the fetched snapshot into the local store and assemble the
/// snapshot to upload. Writes merged rows and conflict rows as it goes.
fn merge_snapshot(
    conn: &Connection,
    fetched: Option<RemoteSnapshot>,
    watermark: i64,
    now_ms: i64,
) -> Result<PassOutcome> {
    let conversations_repo = SqliteConversationRepository::new(conn);
    let messages_repo = SqliteMessageRepository::new(conn);
    let conflicts_repo = SqliteConflictRepository::new(conn);

    let remote = fetched.unwrap_or_else(|| {
        tracing::info!("Remote holds no snapshot yet, uploading the full archive");
        RemoteSnapshot::new(now_ms, Vec::new(), Vec::new())
    });

    let mut parked_conversations: HashMap<String, Vec<MergeConflict>> = HashMap::new();
    let mut parked_messages: HashMap<String, Vec<MergeConflict>> = HashMap::new();
    for row in conflicts_repo.all()? {
        let bucket = match row.entity_kind {
            EntityKind::Conversation => &mut parked_conversations,
            EntityKind::Message => &mut parked_messages,
        };
        bucket.entry(row.entity_id.clone()).or_default().push(row);
    }

    let mut report = SyncReport {
        completed_at: now_ms,
        conversations_uploaded: 0,
        conversations_downloaded: 0,
        messages_uploaded: 0,
        messages_downloaded: 0,
        conflicts_found: 0,
    };

    let mut remote_conversations: HashMap<String, Conversation> = remote
        .conversations
        .into_iter()
        .map(|conversation| (conversation.id.as_str().to_string(), conversation))
        .collect();

    let mut upload_conversations = Vec::new();
    let mut clean_conversations = Vec::new();

    for local in conversations_repo.all()? {
        let key = local.id.as_str().to_string();
        let Some(remote_version) = remote_conversations.remove(&key) else {
            if parked_conversations.remove(&key).is_some() {
                conflicts_repo.delete_for_entity(EntityKind::Conversation, &key)?;
            }
            report.conversations_uploaded += 1;
            clean_conversations.push(local.id.clone());
            upload_conversations.push(local);
            continue;
        };

        let merge = merge_conversations(&local, &remote_version, watermark)?;
        let parked = parked_conversations.remove(&key).unwrap_or_default();
        let had_parked = !parked.is_empty();
        let outcome = reconcile(
            &local,
            &remote_version,
            merge.merged,
            merge.conflicts,
            parked,
            EntityKind::Conversation,
            &key,
            now_ms,
        )?;

        let pending = !outcome.rows.is_empty();
        park_rows(&conflicts_repo, EntityKind::Conversation, &key, &outcome.rows, had_parked, now_ms)?;
        report.conflicts_found += outcome.fresh;

        let mut keep = outcome.keep;
        keep.dirty = local.dirty;
        let downloaded = keep != local;
        let uploaded = outcome.upload != remote_version;

        if pending {
            keep.dirty = true;
            conversations_repo.upsert(&keep)?;
        } else if downloaded {
            keep.dirty = uploaded;
            conversations_repo.upsert(&keep)?;
        }
        if downloaded {
            report.conversations_downloaded += 1;
        }
        if uploaded {
            report.conversations_uploaded += 1;
        }
        if !pending {
            clean_conversations.push(local.id.clone());
        }
        upload_conversations.push(outcome.upload);
    }

    for remote_only in remote_conversations.into_values() {
        conversations_repo.upsert(&remote_only)?;
        report.conversations_downloaded += 1;
        upload_conversations.push(remote_only);
    }

    let known: HashSet<String> = upload_conversations
        .iter()
        .map(|conversation| conversation.id.as_str().to_string())
        .collect();

    let mut remote_messages: HashMap<(String, String), Message> = remote
        .messages
        .into_iter()
        .map(|message| {
            (
                (message.conversation_id.as_str().to_string(), message.id.clone()),
                message,
            )
        })
        .collect();

    let mut upload_messages = Vec::new();
    let mut clean_messages = Vec::new();

    for local in messages_repo.all()? {
        let key = (local.conversation_id.as_str().to_string(), local.id.clone());
        let entity_id = MergeConflict::message_entity_id(&key.0, &key.1);
        let Some(remote_version) = remote_messages.remove(&key) else {
            if parked_messages.remove(&entity_id).is_some() {
                conflicts_repo.delete_for_entity(EntityKind::Message, &entity_id)?;
            }
            report.messages_uploaded += 1;
            clean_messages.push((local.conversation_id.clone(), local.id.clone()));
            upload_messages.push(local);
            continue;
        };

        let merge = merge_messages(&local, &remote_version, watermark)?;
        let parked = parked_messages.remove(&entity_id).unwrap_or_default();
        let had_parked = !parked.is_empty();
        let outcome = reconcile(
            &local,
            &remote_version,
            merge.merged,
            merge.conflicts,
            parked,
            EntityKind::Message,
            &entity_id,
            now_ms,
        )?;

        let pending = !outcome.rows.is_empty();
        park_rows(&conflicts_repo, EntityKind::Message, &entity_id, &outcome.rows, had_parked, now_ms)?;
        report.conflicts_found += outcome.fresh;

        let mut keep = outcome.keep;
        keep.dirty = local.dirty;
        let downloaded = keep != local;
        let uploaded = outcome.upload != remote_version;

        if pending {
            keep.dirty = true;
            messages_repo.upsert(&keep)?;
        } else if downloaded {
            keep.dirty = uploaded;
            messages_repo.upsert(&keep)?;
        }
        if downloaded {
            report.messages_downloaded += 1;
        }
        if uploaded {
            report.messages_uploaded += 1;
        }
        if !pending {
            clean_messages.push((local.conversation_id.clone(), local.id.clone()));
        }
        upload_messages.push(outcome.upload);
    }

    for message in remote_messages.into_values() {
        if known.contains(message.conversation_id.as_str()) {
            messages_repo.upsert(&message)?;
            report.messages_downloaded += 1;
        } else {
            tracing::warn!(
                conversation = message.conversation_id.as_str(),
                message = %message.id,
                "Remote message references an unknown conversation, keeping it remote only"
            );
        }
        upload_messages.push(message);
    }

    // Leftover parked rows belong to entities that exist on neither side
    for entity_id in parked_conversations.keys() {
        conflicts_repo.delete_for_entity(EntityKind::Conversation, entity_id)?;
    }
    for entity_id in parked_messages.keys() {
        conflicts_repo.delete_for_entity(EntityKind::Message, entity_id)?;
    }

    upload_conversations.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    upload_messages.sort_by(|a, b| {
        (a.conversation_id.as_str(), a.created_at, a.id.as_str()).cmp(&(
            b.conversation_id.as_str(),
            b.created_at,
            b.id.as_str(),
        ))
    });

    Ok(PassOutcome {
        snapshot: RemoteSnapshot::new(now_ms, upload_conversations, upload_messages),
        report,
        clean_conversations,
        clean_messages,
    })
}

/// Replace an entity's parked rows with the fresh set, or clear them when
/// the divergence is gone.
fn park_rows(
    conflicts_repo: &SqliteConflictRepository<'_>,
    entity_kind: EntityKind,
    entity_id: &str,
    rows: &[MergeConflict],
    had_parked: bool,
    now_ms: i64,
) -> Result<()> {
    if rows.is_empty() {
        if had_parked {
            conflicts_repo.delete_for_entity(entity_kind, entity_id)?;
        }
        return Ok(());
    }

    conflicts_repo.delete_for_entity(entity_kind, entity_id)?;
    for row in rows {
        if row.detected_at == now_ms {
            tracing::warn!(
                entity = %row.entity_id,
                field = row.field.as_deref().unwrap_or("record"),
                "Both replicas edited the same field, parked for manual resolution"
            );
        }
        conflicts_repo.insert(row)?;
    }
    Ok(())
}

struct Reconciled<T> {
    /// Version to keep locally: the merge with local values on every
    /// conflicted field
    keep: T,
    /// Version for the outbound snapshot: the merge with remote values on
    /// every conflicted field
    upload: T,
    rows: Vec<MergeConflict>,
    /// How many of the rows were detected this pass
    fresh: usize,
}

#[allow(clippy::too_many_arguments)]
fn reconcile<T>(
    local: &T,
    remote: &T,
    merged: T,
    fresh_conflicts: Vec<FieldConflict>,
    parked: Vec<MergeConflict>,
    entity_kind: EntityKind,
    entity_id: &str,
    now_ms: i64,
) -> Result<Reconciled<T>>
where
    T: Serialize + DeserializeOwned + Clone,
{
    if fresh_conflicts.is_empty() && parked.is_empty() {
        return Ok(Reconciled {
            keep: merged.clone(),
            upload: merged,
            rows: Vec::new(),
            fresh: 0,
        });
    }

    let local_map = to_map(local)?;
    let remote_map = to_map(remote)?;
    let fresh = fresh_conflicts.len();

    let mut parked_by_field: HashMap<Option<String>, MergeConflict> = parked
        .into_iter()
        .map(|row| (row.field.clone(), row))
        .collect();

    let mut rows = Vec::new();
    for conflict in fresh_conflicts {
        let field = Some(conflict.field);
        // A redetected field keeps its conflict identity and original
        // detection time
        let (id, detected_at) = parked_by_field
            .remove(&field)
            .map_or_else(|| (ConflictId::new(), now_ms), |row| (row.id, row.detected_at));
        rows.push(MergeConflict {
            id,
            entity_kind,
            entity_id: entity_id.to_string(),
            field,
            local_version: Value::Object(local_map.clone()),
            remote_version: Value::Object(remote_map.clone()),
            detected_at,
        });
    }

    for (field, row) in parked_by_field {
        let still_divergent = match field.as_deref() {
            Some(name) => local_map.get(name) != remote_map.get(name),
            None => local_map != remote_map,
        };
        if still_divergent {
            rows.push(MergeConflict {
                id: row.id,
                entity_kind,
                entity_id: entity_id.to_string(),
                field,
                local_version: Value::Object(local_map.clone()),
                remote_version: Value::Object(remote_map.clone()),
                detected_at: row.detected_at,
            });
        }
    }

    if rows.is_empty() {
        return Ok(Reconciled {
            keep: merged.clone(),
            upload: merged,
            rows,
            fresh,
        });
    }

    let mut keep_map = to_map(&merged)?;
    let mut upload_map = keep_map.clone();
    if rows.iter().any(|row| row.field.is_none()) {
        keep_map.clone_from(&local_map);
        upload_map.clone_from(&remote_map);
    }
    for name in rows.iter().filter_map(|row| row.field.as_deref()) {
        keep_map.insert(
            name.to_string(),
            local_map.get(name).cloned().unwrap_or(Value::Null),
        );
        upload_map.insert(
            name.to_string(),
            remote_map.get(name).cloned().unwrap_or(Value::Null),
        );
    }

    Ok(Reconciled {
        keep: serde_json::from_value(Value::Object(keep_map))?,
        upload: serde_json::from_value(Value::Object(upload_map))?,
        rows,
        fresh,
    })
}
