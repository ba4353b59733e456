//! Async service wrappers shared by the host surfaces

pub mod archive;

pub use archive::{ArchiveService, ArchiveStatus};
