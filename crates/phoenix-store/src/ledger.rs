// ABOUTME: Append-only alert ledger over a single CSV document held by a ContentStore.
// ABOUTME: Appends add one encoded line to the fetched text and write it conditionally, retrying on conflicts.

use std::fmt;
use std::sync::Arc;

use phoenix_core::codec::{Decoded, append_row, decode, encode};
use phoenix_core::record::{Record, RecordError};
use serde::Serialize;
use thiserror::Error;

use crate::config::{DEFAULT_APPEND_ATTEMPTS, LedgerConfig};
use crate::github::GithubStore;
use crate::store::{ContentStore, Snapshot, StoreError};

/// The ledger operation an error arose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Append,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::List => f.write_str("list"),
            Operation::Append => f.write_str("append"),
        }
    }
}

/// Errors surfaced to ledger callers. Each carries the operation and
/// document path so a UI can render it without inspecting internals.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{operation} {path}: alert ledger is not configured ({detail})")]
    NotConfigured {
        operation: Operation,
        path: String,
        detail: String,
    },

    /// Every attempt lost a race with another writer. The record was not stored.
    #[error(
        "append {path}: gave up after {attempts} conflicting write attempts; the alert was not recorded"
    )]
    Conflict { path: String, attempts: u32 },

    #[error("{operation} {path}: {message}")]
    Transport {
        operation: Operation,
        path: String,
        message: String,
    },

    /// The stored document cannot take new rows without rewriting existing ones.
    #[error("{operation} {path}: stored document is not an alert table ({message})")]
    MalformedDocument {
        operation: Operation,
        path: String,
        message: String,
    },

    #[error("invalid alert: {0}")]
    InvalidRecord(#[from] RecordError),
}

/// Stable classification of ledger errors for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerErrorKind {
    NotConfigured,
    Conflict,
    Transport,
    MalformedDocument,
    InvalidRecord,
}

impl LedgerError {
    #[must_use]
    pub fn kind(&self) -> LedgerErrorKind {
        match self {
            Self::NotConfigured { .. } => LedgerErrorKind::NotConfigured,
            Self::Conflict { .. } => LedgerErrorKind::Conflict,
            Self::Transport { .. } => LedgerErrorKind::Transport,
            Self::MalformedDocument { .. } => LedgerErrorKind::MalformedDocument,
            Self::InvalidRecord(_) => LedgerErrorKind::InvalidRecord,
        }
    }

    /// Whether repeating the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            LedgerErrorKind::Conflict | LedgerErrorKind::Transport
        )
    }

    fn from_store(operation: Operation, err: StoreError) -> Self {
        match err {
            StoreError::NotConfigured(detail) => Self::NotConfigured {
                operation,
                path: String::new(),
                detail: format!("{} is not set", detail),
            },
            // Write conflicts are retried by the append loop; any other is a host fault.
            StoreError::Conflict { path } => Self::Transport {
                operation,
                message: "unexpected version conflict".to_string(),
                path,
            },
            StoreError::Transport { path, message } => Self::Transport {
                operation,
                path,
                message,
            },
        }
    }

    fn at_path(mut self, document: &str) -> Self {
        if let Self::NotConfigured { path, .. } = &mut self
            && path.is_empty()
        {
            *path = document.to_string();
        }
        self
    }
}

/// What `append_unique` did with the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was written; `attempts` counts conflicting rounds plus the winning one.
    Appended { attempts: u32 },
    /// An equivalent alert already exists, so nothing was written.
    Duplicate { existing: Record },
}

/// An append-only table of alert records stored as one document.
///
/// Nothing is cached between calls: every `list` and every append attempt
/// reads the document afresh, and a version token is used for exactly one
/// write.
pub struct AlertLedger {
    store: Arc<dyn ContentStore>,
    path: String,
    max_attempts: u32,
}

impl AlertLedger {
    /// Create a ledger over `path` in `store` with the default retry budget.
    pub fn new(store: Arc<dyn ContentStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
            max_attempts: DEFAULT_APPEND_ATTEMPTS,
        }
    }

    /// Build a ledger backed by the configured content host.
    pub fn from_config(config: &LedgerConfig) -> Result<Self, StoreError> {
        let store = GithubStore::new(config.github.clone(), config.timeout)?;
        Ok(Self::new(Arc::new(store), config.alerts_path.clone())
            .with_max_attempts(config.append_attempts))
    }

    /// Set the number of write attempts an append makes before giving up.
    /// Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// All records currently in the ledger. A missing document is an empty ledger.
    pub async fn list(&self) -> Result<Vec<Record>, LedgerError> {
        Ok(self.list_with_report().await?.records)
    }

    /// Like `list`, but also returns the rows that could not be decoded.
    pub async fn list_with_report(&self) -> Result<Decoded, LedgerError> {
        let (decoded, _) = self.load(Operation::List).await?;
        tracing::info!(
            path = %self.path,
            records = decoded.records.len(),
            skipped = decoded.skipped.len(),
            "listed alerts"
        );
        Ok(decoded)
    }

    /// Records whose location contains `query`, ignoring case and surrounding whitespace.
    pub async fn find_by_location(&self, query: &str) -> Result<Vec<Record>, LedgerError> {
        let needle = query.trim().to_lowercase();
        let records = self.list().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.location.to_lowercase().contains(&needle))
            .collect())
    }

    /// Append `record` to the ledger.
    ///
    /// On `Err(LedgerError::Conflict)` the retry budget ran out and the
    /// record was not stored. Other store failures are returned at once.
    pub async fn append(&self, record: Record) -> Result<(), LedgerError> {
        self.append_inner(record, false).await.map(|_| ())
    }

    /// Append `record` unless an alert with the same location and the same
    /// description (ignoring case and whitespace runs) is already stored.
    pub async fn append_unique(&self, record: Record) -> Result<AppendOutcome, LedgerError> {
        self.append_inner(record, true).await
    }

    async fn append_inner(
        &self,
        mut record: Record,
        skip_duplicates: bool,
    ) -> Result<AppendOutcome, LedgerError> {
        record.validate()?;
        record.contact_info = record.contact_info.filter(|c| !c.is_empty());

        let message = format!("Add {} alert for {}", record.severity, record.location);

        for attempt in 1..=self.max_attempts {
            let (decoded, snapshot) = self.load(Operation::Append).await?;

            if skip_duplicates
                && let Some(existing) = decoded.records.iter().find(|r| same_alert(r, &record))
            {
                tracing::info!(
                    path = %self.path,
                    location = %record.location,
                    "skipping duplicate alert"
                );
                return Ok(AppendOutcome::Duplicate {
                    existing: existing.clone(),
                });
            }

            let (text, token) = match snapshot {
                Some(snapshot) => {
                    let text = append_row(&snapshot.content, &record).map_err(|reason| {
                        LedgerError::MalformedDocument {
                            operation: Operation::Append,
                            path: self.path.clone(),
                            message: format!("header: {}", reason),
                        }
                    })?;
                    (text, Some(snapshot.token))
                }
                None => (encode(std::slice::from_ref(&record)), None),
            };

            match self
                .store
                .write(&self.path, &text, token.as_ref(), &message)
                .await
            {
                Ok(new_token) => {
                    tracing::info!(
                        path = %self.path,
                        rows = decoded.records.len() + 1,
                        attempt,
                        token = %new_token,
                        "appended alert"
                    );
                    return Ok(AppendOutcome::Appended { attempts: attempt });
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::warn!(
                        path = %self.path,
                        attempt,
                        max_attempts = self.max_attempts,
                        "write conflict, re-reading document"
                    );
                }
                Err(err) => {
                    return Err(LedgerError::from_store(Operation::Append, err).at_path(&self.path));
                }
            }
        }

        Err(LedgerError::Conflict {
            path: self.path.clone(),
            attempts: self.max_attempts,
        })
    }

    /// Fetch and decode the document, logging every skipped row. The
    /// snapshot is returned as fetched so appends can extend it verbatim.
    async fn load(&self, operation: Operation) -> Result<(Decoded, Option<Snapshot>), LedgerError> {
        let snapshot = self
            .store
            .fetch(&self.path)
            .await
            .map_err(|e| LedgerError::from_store(operation, e).at_path(&self.path))?;

        let Some(snapshot) = snapshot else {
            tracing::debug!(path = %self.path, "document does not exist yet");
            return Ok((Decoded::default(), None));
        };

        let decoded = decode(&snapshot.content);
        for row in &decoded.skipped {
            tracing::warn!(
                path = %self.path,
                line = row.line_number,
                "skipping malformed ledger row: {}",
                row.reason
            );
        }
        Ok((decoded, Some(snapshot)))
    }
}

fn same_alert(a: &Record, b: &Record) -> bool {
    fn fold(s: &str) -> String {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
    a.location.trim().to_lowercase() == b.location.trim().to_lowercase()
        && fold(&a.description) == fold(&b.description)
}
