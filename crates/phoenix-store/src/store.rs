// ABOUTME: Defines the ContentStore trait: a named text blob guarded by optimistic concurrency.
// ABOUTME: Also holds the VersionToken and Snapshot types and the StoreError taxonomy.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a ContentStore. A missing document is not an error;
/// `fetch` reports it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} is not set; writing requires a credential")]
    NotConfigured(String),

    #[error("{path} was changed by another writer")]
    Conflict { path: String },

    #[error("request for {path} failed: {message}")]
    Transport { path: String, message: String },
}

/// Opaque identifier of the exact content a host currently stores for a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document's text together with the token identifying that content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub content: String,
    pub token: VersionToken,
}

/// A remote "named blob" resource with conditional writes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read the current content and version token of `path`.
    /// Returns `Ok(None)` when the document does not exist.
    async fn fetch(&self, path: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Replace the content of `path`.
    ///
    /// With `Some(token)` the write succeeds only if the stored content is
    /// still the one `token` identifies. With `None` the write succeeds only
    /// if the document does not exist yet. Either failure is
    /// `StoreError::Conflict`. Returns the token of the newly written content.
    async fn write(
        &self,
        path: &str,
        content: &str,
        token: Option<&VersionToken>,
        message: &str,
    ) -> Result<VersionToken, StoreError>;
}
