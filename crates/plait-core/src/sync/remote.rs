//! Remote snapshot stores.
//!
//! The remote side of sync is a single JSON snapshot document rather than a
//! query API. [`HttpRemoteStore`] talks to a snapshot endpoint over HTTPS;
//! [`FileRemoteStore`] uses a file on a shared path, which keeps the whole
//! pipeline testable without a network.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::models::{Conversation, Message};
use crate::util::{is_http_url, normalize_text_option};

/// Snapshot layout version this build reads and writes
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// The full remote state: every conversation and message, tombstones included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub schema_version: u32,
    /// When the uploading replica produced this snapshot (ms)
    pub exported_at: i64,
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
}

impl RemoteSnapshot {
    #[must_use]
    pub const fn new(
        exported_at: i64,
        conversations: Vec<Conversation>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            exported_at,
            conversations,
            messages,
        }
    }

    /// Reject snapshots written by a newer build than this one
    pub fn validate(&self) -> Result<()> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(Error::Validation(format!(
                "snapshot schema version {} is newer than supported version {}",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            )));
        }
        Ok(())
    }
}

/// Trait for snapshot transport backends
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short backend name for log lines
    fn name(&self) -> &'static str;

    /// Download the current snapshot. `None` means the remote is empty.
    async fn fetch(&self) -> Result<Option<RemoteSnapshot>>;

    /// Upload a snapshot, replacing whatever the remote held
    async fn store(&self, snapshot: &RemoteSnapshot) -> Result<()>;
}

/// Snapshot store backed by an HTTP endpoint.
///
/// `GET {endpoint}/snapshot` downloads, `PUT {endpoint}/snapshot` replaces.
#[derive(Clone)]
pub struct HttpRemoteStore {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        Ok(Self {
            endpoint,
            token: normalize_text_option(token),
            client: reqwest::Client::builder()
                .build()
                .map_err(|error| Error::Transport(error.to_string()))?,
        })
    }

    fn snapshot_url(&self) -> String {
        format!("{}/snapshot", self.endpoint)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self) -> Result<Option<RemoteSnapshot>> {
        let response = self
            .authorize(self.client.get(self.snapshot_url()))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response.text().await.map_err(transport)?;
        let snapshot: RemoteSnapshot = serde_json::from_str(&body)?;
        snapshot.validate()?;
        Ok(Some(snapshot))
    }

    async fn store(&self, snapshot: &RemoteSnapshot) -> Result<()> {
        let response = self
            .authorize(self.client.put(self.snapshot_url()))
            .json(snapshot)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        Ok(())
    }
}

/// Snapshot store backed by a single JSON file, e.g. on a synced folder.
#[derive(Debug, Clone)]
pub struct FileRemoteStore {
    path: PathBuf,
}

impl FileRemoteStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RemoteStore for FileRemoteStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn fetch(&self) -> Result<Option<RemoteSnapshot>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let snapshot: RemoteSnapshot = serde_json::from_slice(&raw)?;
        snapshot.validate()?;
        Ok(Some(snapshot))
    }

    async fn store(&self, snapshot: &RemoteSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a crashed upload never leaves a torn snapshot
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn transport(error: reqwest::Error) -> Error {
    Error::Transport(error.to_string())
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(status, body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Error::Auth(message)
    } else {
        Error::Transport(message)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Validation("remote endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::Validation(
            "remote endpoint must include http:// or https://".to_string(),
        ))
    }
}
