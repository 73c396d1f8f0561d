// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Append-only submission record store.
//!
//! The guard only needs three things from its backing store: append a
//! record, list the timestamps recorded for an identity, and drop everything
//! older than a cutoff. [`FileStore`] keeps one pipe-delimited line per
//! record; [`MemoryStore`] keeps them in a vector.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

const FIELD_DELIMITER: char = '|';

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Submission log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Resolved client address
    pub client_identity: String,
    /// Submitter email, best effort
    pub email: String,
}

impl SubmissionRecord {
    pub fn new(timestamp: i64, client_identity: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            timestamp,
            client_identity: client_identity.into(),
            email: email.into(),
        }
    }

    /// Serialize as `timestamp|identity|email` without a trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.timestamp,
            self.client_identity,
            self.email,
            d = FIELD_DELIMITER
        )
    }

    /// Parse a log line. The email may itself contain the delimiter, so
    /// only the first two are significant.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.trim_end_matches(['\r', '\n']).splitn(3, FIELD_DELIMITER);
        let timestamp = parts.next()?.trim().parse().ok()?;
        let client_identity = parts.next()?.to_string();
        let email = parts.next().unwrap_or_default().to_string();
        Some(Self {
            timestamp,
            client_identity,
            email,
        })
    }
}

/// Backing store for submission records.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Append one record.
    async fn append(&self, record: SubmissionRecord) -> Result<(), StoreError>;

    /// Timestamps of every record for `identity`, in storage order.
    async fn query_by_identity(&self, identity: &str) -> Result<Vec<i64>, StoreError>;

    /// Remove records with `timestamp <= cutoff`. Returns how many were removed.
    async fn prune_older_than(&self, cutoff: i64) -> Result<usize, StoreError>;

    /// Append then prune as one unit with respect to other writers.
    async fn append_and_prune(&self, record: SubmissionRecord, cutoff: i64) -> Result<usize, StoreError> {
        self.append(record).await?;
        self.prune_older_than(cutoff).await
    }
}

/// Flat-file store, one record per line.
///
/// Writers serialize on an async mutex for the whole append-and-prune
/// sequence. Readers do not take the lock and may see a slightly stale file.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn ensure_parent(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir).await.map_err(|e| self.io_err(e))
            }
            _ => Ok(()),
        }
    }

    /// Non-blank lines of the log, plus how many lines were not valid UTF-8
    /// and were skipped.
    async fn read_lines(&self) -> Result<(Vec<String>, usize), StoreError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(self.io_err(e)),
        };

        let mut lines = Vec::new();
        let mut unreadable = 0;
        for raw in content.split(|b| *b == b'\n') {
            match std::str::from_utf8(raw) {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => lines.push(line.trim_end_matches('\r').to_string()),
                Err(_) => unreadable += 1,
            }
        }
        if unreadable > 0 {
            warn!(path = %self.path.display(), unreadable, "Skipping undecodable submission log lines");
        }
        Ok((lines, unreadable))
    }

    async fn append_locked(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.ensure_parent().await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        let mut line = record.to_line();
        line.push('\n');
        file.write_all(line.as_bytes()).await.map_err(|e| self.io_err(e))?;
        file.flush().await.map_err(|e| self.io_err(e))
    }

    async fn prune_locked(&self, cutoff: i64) -> Result<usize, StoreError> {
        let (lines, unreadable) = self.read_lines().await?;
        let before = lines.len() + unreadable;
        // Undecodable lines and lines whose timestamp does not parse count as expired.
        let kept: Vec<String> = lines
            .into_iter()
            .filter(|line| {
                SubmissionRecord::parse_line(line).is_some_and(|r| r.timestamp > cutoff)
            })
            .collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut content = kept.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).await.map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| self.io_err(e))?;

        debug!(path = %self.path.display(), removed, "Pruned submission log");
        Ok(removed)
    }
}

#[async_trait]
impl SubmissionStore for FileStore {
    async fn append(&self, record: SubmissionRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.append_locked(&record).await
    }

    async fn query_by_identity(&self, identity: &str) -> Result<Vec<i64>, StoreError> {
        let (lines, _) = self.read_lines().await?;
        Ok(lines
            .iter()
            .filter_map(|line| {
                let record = SubmissionRecord::parse_line(line);
                if record.is_none() {
                    warn!(path = %self.path.display(), "Skipping malformed submission log line");
                }
                record
            })
            .filter(|r| r.client_identity == identity)
            .map(|r| r.timestamp)
            .collect())
    }

    async fn prune_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.prune_locked(cutoff).await
    }

    async fn append_and_prune(&self, record: SubmissionRecord, cutoff: i64) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.append_locked(&record).await?;
        self.prune_locked(cutoff).await
    }
}

/// In-process store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<SubmissionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record.
    pub async fn records(&self) -> Vec<SubmissionRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn append(&self, record: SubmissionRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn query_by_identity(&self, identity: &str) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.client_identity == identity)
            .map(|r| r.timestamp)
            .collect())
    }

    async fn prune_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.timestamp > cutoff);
        Ok(before - records.len())
    }

    async fn append_and_prune(&self, record: SubmissionRecord, cutoff: i64) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        records.push(record);
        let before = records.len();
        records.retain(|r| r.timestamp > cutoff);
        Ok(before - records.len())
    }
}
