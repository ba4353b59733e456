//! Shared archive service wrapper used across clients.
//!
//! One instance owns the database and the optional sync engine. All
//! repository access is serialized behind a `tokio` mutex, so callers can
//! clone the service freely and use it from any task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    ConflictRepository, ConversationFilter, ConversationRepository, Database, MessageRepository,
    SqliteConflictRepository, SqliteConversationRepository, SqliteMessageRepository,
    SqliteSyncMetaRepository, SyncMetaRepository,
};
use crate::error::{Error, Result};
use crate::ingest::{plan_ingest, IngestReport};
use crate::models::{Capture, ConflictId, Conversation, ConversationId, Message, MergeConflict};
use crate::resolve::{apply_resolution, ResolutionChoice, ResolutionOutcome};
use crate::state::SyncPhase;
use crate::sync::{
    last_failure, last_report, RemoteStore, SyncEngine, SyncFailure, SyncReport, SyncRun,
};

/// Point-in-time counters and sync bookkeeping for the status surface.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArchiveStatus {
    pub conversations: i64,
    pub messages: i64,
    pub pending_upload: i64,
    pub conflicts: i64,
    /// `None` when no remote store is configured
    pub phase: Option<SyncPhase>,
    /// 0 when no pass ever completed
    pub last_synced_at: i64,
    pub last_report: Option<SyncReport>,
    pub last_failure: Option<SyncFailure>,
}

/// Thread-safe service for archive and sync operations.
#[derive(Clone)]
pub struct ArchiveService {
    db: Arc<Mutex<Database>>,
    sync: Option<Arc<SyncEngine>>,
}

impl ArchiveService {
    /// Open the archive at a filesystem path, creating parent directories
    /// as needed.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::from_database(Database::open(&db_path)?))
    }

    /// Open an in-memory archive (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            sync: None,
        }
    }

    /// Attach a remote store, enabling [`ArchiveService::sync`].
    #[must_use]
    pub fn with_remote(mut self, remote: Box<dyn RemoteStore>) -> Self {
        self.sync = Some(Arc::new(SyncEngine::new(remote)));
        self
    }

    /// Whether a remote store is configured.
    #[must_use]
    pub fn sync_configured(&self) -> bool {
        self.sync.is_some()
    }

    /// Validate one capture and fold it into the store in a single
    /// transaction.
    pub async fn ingest_capture(&self, capture: &Capture, now_ms: i64) -> Result<IngestReport> {
        capture.validate()?;

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let report = {
            let conversations = SqliteConversationRepository::new(&tx);
            let messages = SqliteMessageRepository::new(&tx);

            let id = capture.conversation_id();
            let existing = conversations.get(&id)?;
            let stored: HashMap<String, Message> = messages
                .all_for_conversation(&id)?
                .into_iter()
                .map(|message| (message.id.clone(), message))
                .collect();

            let plan = plan_ingest(existing.as_ref(), &stored, capture, now_ms);
            if let Some(conversation) = &plan.conversation {
                conversations.upsert(conversation)?;
            }
            for message in &plan.new_messages {
                messages.upsert(message)?;
            }
            IngestReport {
                conversation_id: id,
                outcome: plan.outcome,
                new_messages: plan.new_messages.len(),
            }
        };
        tx.commit()?;

        tracing::debug!(
            conversation = report.conversation_id.as_str(),
            outcome = ?report.outcome,
            new_messages = report.new_messages,
            "Capture ingested"
        );
        Ok(report)
    }

    /// List live conversations, newest platform activity first.
    pub async fn list(
        &self,
        filter: &ConversationFilter,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let db = self.db.lock().await;
        SqliteConversationRepository::new(db.connection()).list(filter, limit)
    }

    /// Fetch a conversation by exact ID, tombstoned rows included.
    pub async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let db = self.db.lock().await;
        SqliteConversationRepository::new(db.connection()).get(id)
    }

    /// Live conversations whose ID starts with the given prefix.
    pub async fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<Conversation>> {
        let db = self.db.lock().await;
        SqliteConversationRepository::new(db.connection()).find_by_id_prefix(prefix)
    }

    /// Live transcript of a conversation in platform order.
    pub async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>> {
        let db = self.db.lock().await;
        SqliteMessageRepository::new(db.connection()).list_for_conversation(id)
    }

    /// Set or clear the favorite flag on a live conversation.
    pub async fn set_favorite(
        &self,
        id: &ConversationId,
        favorite: bool,
        now_ms: i64,
    ) -> Result<Conversation> {
        let db = self.db.lock().await;
        let repo = SqliteConversationRepository::new(db.connection());
        let mut conversation = match repo.get(id)? {
            Some(conversation) if !conversation.deleted => conversation,
            _ => return Err(Error::NotFound(format!("conversation {id}"))),
        };
        if conversation.is_favorite != favorite {
            conversation.set_favorite(favorite, now_ms);
            repo.upsert(&conversation)?;
        }
        Ok(conversation)
    }

    /// Tombstone a conversation. The row stays until both replicas agree on
    /// the deletion; repeating the call is a no-op.
    pub async fn delete(&self, id: &ConversationId, now_ms: i64) -> Result<Conversation> {
        let db = self.db.lock().await;
        let repo = SqliteConversationRepository::new(db.connection());
        let Some(mut conversation) = repo.get(id)? else {
            return Err(Error::NotFound(format!("conversation {id}")));
        };
        if !conversation.deleted {
            conversation.tombstone(now_ms);
            repo.upsert(&conversation)?;
            tracing::info!(conversation = id.as_str(), "Conversation tombstoned");
        }
        Ok(conversation)
    }

    /// Pending merge conflicts, oldest first.
    pub async fn conflicts(&self, limit: usize) -> Result<Vec<MergeConflict>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).list(limit)
    }

    /// Apply a human decision to a parked conflict.
    pub async fn resolve(
        &self,
        id: &ConflictId,
        choice: ResolutionChoice,
        now_ms: i64,
    ) -> Result<ResolutionOutcome> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let outcome = apply_resolution(&tx, id, choice, now_ms)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Counters and sync bookkeeping for the status surface.
    pub async fn status(&self) -> Result<ArchiveStatus> {
        let db = self.db.lock().await;
        let conversations = SqliteConversationRepository::new(db.connection());
        let messages = SqliteMessageRepository::new(db.connection());
        let meta = SqliteSyncMetaRepository::new(db.connection());
        Ok(ArchiveStatus {
            conversations: conversations.count()?,
            messages: messages.count()?,
            pending_upload: conversations.count_dirty()? + messages.count_dirty()?,
            conflicts: SqliteConflictRepository::new(db.connection()).count()?,
            phase: self.sync.as_ref().map(|engine| engine.phase()),
            last_synced_at: meta.last_synced_at()?,
            last_report: last_report(&meta)?,
            last_failure: last_failure(&meta)?,
        })
    }

    /// Run one sync pass against the configured remote store.
    pub async fn sync(&self, now_ms: i64) -> Result<SyncRun> {
        let Some(engine) = &self.sync else {
            return Err(Error::Validation(
                "no remote store is configured for sync".to_string(),
            ));
        };
        engine.sync(&self.db, now_ms).await
    }
}
