//! plait-core - Core library for Plait
//!
//! This crate contains the shared models, database layer, and merge logic
//! used by all Plait interfaces (the CLI today, richer clients later).

pub mod db;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod models;
pub mod resolve;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Conversation, ConversationId, Message};
