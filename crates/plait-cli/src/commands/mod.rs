pub mod common;
pub mod completions;
pub mod conflicts;
pub mod delete;
pub mod favorite;
pub mod ingest;
pub mod list;
pub mod resolve;
pub mod show;
pub mod status;
pub mod sync;
