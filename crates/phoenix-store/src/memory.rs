// ABOUTME: In-process ContentStore with the same conditional-write rules as the remote host.
// ABOUTME: Used by tests and offline runs; tokens are store-wide revision numbers.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::{ContentStore, Snapshot, StoreError, VersionToken};

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, Snapshot>,
    revision: u64,
}

impl Inner {
    fn next_token(&mut self) -> VersionToken {
        self.revision += 1;
        VersionToken::new(format!("rev-{}", self.revision))
    }
}

/// A ContentStore held in memory. Every successful write gets a fresh token,
/// so a token is never reused even if the same content is written again.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document before the store is shared.
    pub fn with_document(mut self, path: &str, content: &str) -> Self {
        let inner = self.inner.get_mut();
        let token = inner.next_token();
        inner.documents.insert(
            path.to_string(),
            Snapshot {
                content: content.to_string(),
                token,
            },
        );
        self
    }

    /// Current content of `path`, if any.
    pub async fn content(&self, path: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.documents.get(path).map(|s| s.content.clone())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn fetch(&self, path: &str) -> Result<Option<Snapshot>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.documents.get(path).cloned())
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        token: Option<&VersionToken>,
        _message: &str,
    ) -> Result<VersionToken, StoreError> {
        let mut inner = self.inner.lock().await;

        let current = inner.documents.get(path).map(|s| &s.token);
        if current != token {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }

        let new_token = inner.next_token();
        inner.documents.insert(
            path.to_string(),
            Snapshot {
                content: content.to_string(),
                token: new_token.clone(),
            },
        );
        Ok(new_token)
    }
}
