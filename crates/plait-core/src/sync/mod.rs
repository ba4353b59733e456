//! Snapshot sync between the local archive and a remote replica store

pub mod orchestrator;
pub mod remote;

pub use orchestrator::{
    last_failure, last_report, SyncDirection, SyncEngine, SyncFailure, SyncReport, SyncRun,
};
pub use remote::{
    FileRemoteStore, HttpRemoteStore, RemoteSnapshot, RemoteStore, SNAPSHOT_SCHEMA_VERSION,
};
