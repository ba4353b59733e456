//! Data models for Plait

mod capture;
mod conflict;
mod conversation;
mod message;

pub use capture::{Capture, CaptureKind, CapturedConversation, CapturedMessage, IngestMode};
pub use conflict::{ConflictId, EntityKind, MergeConflict};
pub use conversation::{Conversation, ConversationId, DetailStatus};
pub use message::{Message, MessageRole};
