//! Database layer: connection handling, migrations, and repositories

pub mod conflict_repository;
pub mod connection;
pub mod conversation_repository;
pub mod message_repository;
pub mod migrations;
pub mod sync_meta_repository;

pub use conflict_repository::{ConflictRepository, SqliteConflictRepository};
pub use connection::Database;
pub use conversation_repository::{
    ConversationFilter, ConversationRepository, SqliteConversationRepository,
};
pub use message_repository::{MessageRepository, SqliteMessageRepository};
pub use sync_meta_repository::{SqliteSyncMetaRepository, SyncMetaRepository};
