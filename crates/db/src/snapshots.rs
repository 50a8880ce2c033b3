//! Durable session snapshots: one JSON file per conversation, written
//! atomically and valid until `expires_at`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, SystemTime};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use agroquote_core::domain::session::Session;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistenceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    saved_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    session: &'a Session,
}

#[derive(Deserialize)]
struct SnapshotFile {
    expires_at: DateTime<Utc>,
    session: Session,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
}

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    ttl: Duration,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { dir: dir.into(), ttl }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Creates the snapshot directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).await.map_err(|error| PersistenceError::io(&self.dir, error))
    }

    /// Snapshot path for a conversation id. Anything outside `[A-Za-z0-9_-]`
    /// is replaced so ids can never escape the directory.
    pub fn path_for(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// Writes to a temporary file in the same directory, then renames it over
    /// the previous snapshot.
    pub async fn save(&self, session: &Session, now: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.ensure_dir().await?;
        let body = serde_json::to_vec(&SnapshotRef {
            saved_at: now,
            expires_at: now + self.ttl,
            session,
        })?;

        let target = self.path_for(&session.id);
        let temp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&temp, body).await.map_err(|error| PersistenceError::io(&temp, error))?;
        if let Err(error) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(PersistenceError::io(&target, error));
        }
        Ok(())
    }

    /// The stored session, or `None` when the file is missing, unreadable as
    /// a snapshot, or past its expiry.
    pub async fn load(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Session>, PersistenceError> {
        let path = self.path_for(id);
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(PersistenceError::io(&path, error)),
        };

        let snapshot: SnapshotFile = match serde_json::from_slice(&body) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(
                    event_name = "persistence.snapshot_corrupt",
                    conversation_id = %id,
                    error = %error,
                    "ignoring unreadable snapshot"
                );
                return Ok(None);
            }
        };

        if snapshot.expires_at <= now {
            debug!(
                event_name = "persistence.snapshot_expired",
                conversation_id = %id,
                expires_at = %snapshot.expires_at,
                "snapshot expired"
            );
            return Ok(None);
        }

        let mut session = snapshot.session;
        session.expires_at = Some(snapshot.expires_at);
        Ok(Some(session))
    }

    pub async fn remove(&self, id: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(PersistenceError::io(&path, error)),
        }
    }

    /// Conversation ids that have a snapshot file, expired or not.
    pub async fn ids(&self) -> Result<Vec<String>, PersistenceError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(PersistenceError::io(&self.dir, error)),
        };
        let mut ids = Vec::new();
        while let Some(entry) =
            entries.next_entry().await.map_err(|error| PersistenceError::io(&self.dir, error))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Deletes snapshot files not modified within the TTL, independent of
    /// what the in-memory store holds.
    pub async fn sweep(&self, now: SystemTime) -> Result<SweepReport, PersistenceError> {
        let mut report = SweepReport::default();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(report),
            Err(error) => return Err(PersistenceError::io(&self.dir, error)),
        };
        let ttl = self.ttl.to_std().unwrap_or(StdDuration::ZERO);

        while let Some(entry) =
            entries.next_entry().await.map_err(|error| PersistenceError::io(&self.dir, error))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            report.scanned += 1;

            let modified = match entry.metadata().await.and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(error) => {
                    warn!(
                        event_name = "persistence.sweep_stat_failed",
                        path = %path.display(),
                        error = %error,
                        "skipping snapshot"
                    );
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or(StdDuration::ZERO);
            if age <= ttl {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => report.removed += 1,
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => warn!(
                    event_name = "persistence.sweep_remove_failed",
                    path = %path.display(),
                    error = %error,
                    "could not delete expired snapshot"
                ),
            }
        }
        Ok(report)
    }
}
