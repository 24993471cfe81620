// ABOUTME: Persistence layer for phoenix, storing the alert ledger as one remote CSV document.
// ABOUTME: Provides the ContentStore seam, a GitHub contents client, an in-memory store, and the ledger.

pub mod config;
pub mod github;
pub mod ledger;
pub mod memory;
pub mod store;

pub use config::{ConfigError, GithubConfig, LedgerConfig};
pub use github::GithubStore;
pub use ledger::{AlertLedger, AppendOutcome, LedgerError, LedgerErrorKind, Operation};
pub use memory::MemoryStore;
pub use store::{ContentStore, Snapshot, StoreError, VersionToken};
