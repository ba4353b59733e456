//! Field-level merge algebra and message identity dedup

mod dedup;
mod engine;
mod strategy;

pub(crate) use engine::to_map;

pub use dedup::dedupe;
pub use engine::{
    merge_conversations, merge_conversations_auto, merge_fields, merge_messages,
    merge_messages_auto, EntityMerge, FieldConflict, MergeContext, MergeOutcome,
};
pub use strategy::{MergeStrategy, CONVERSATION_STRATEGIES, MESSAGE_STRATEGIES};
