// ABOUTME: Configuration loading and validation for the alert ledger.
// ABOUTME: Reads PHOENIX_* environment variables for the content host, document path, and retry policy.

use std::time::Duration;

use thiserror::Error;

/// Environment variable holding the content host credential.
pub const TOKEN_ENV: &str = "PHOENIX_GITHUB_TOKEN";

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_ALERTS_PATH: &str = "data/alerts.csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_APPEND_ATTEMPTS: u32 = 3;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
}

/// Coordinates of the repository that holds the ledger document.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub base_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Absent credential still allows reads of public repositories.
    pub token: Option<String>,
}

/// Ledger configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub github: GithubConfig,
    pub alerts_path: String,
    pub timeout: Duration,
    pub append_attempts: u32,
}

impl LedgerConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - PHOENIX_GITHUB_TOKEN: bearer credential (optional; required for writes)
    /// - PHOENIX_GITHUB_OWNER: repository owner (required)
    /// - PHOENIX_GITHUB_REPO: repository name (required)
    /// - PHOENIX_GITHUB_BRANCH: branch to read and write (default: main)
    /// - PHOENIX_ALERTS_PATH: document path in the repository (default: data/alerts.csv)
    /// - PHOENIX_API_BASE_URL: content host base URL (default: https://api.github.com)
    /// - PHOENIX_HTTP_TIMEOUT_SECS: per-request timeout (default: 10)
    /// - PHOENIX_APPEND_ATTEMPTS: conflict retry budget for appends (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let owner = non_empty("PHOENIX_GITHUB_OWNER")
            .ok_or(ConfigError::Missing("PHOENIX_GITHUB_OWNER"))?;
        let repo =
            non_empty("PHOENIX_GITHUB_REPO").ok_or(ConfigError::Missing("PHOENIX_GITHUB_REPO"))?;

        let github = GithubConfig {
            base_url: non_empty("PHOENIX_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            owner,
            repo,
            branch: non_empty("PHOENIX_GITHUB_BRANCH")
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            token: non_empty(TOKEN_ENV),
        };

        let alerts_path =
            non_empty("PHOENIX_ALERTS_PATH").unwrap_or_else(|| DEFAULT_ALERTS_PATH.to_string());

        let timeout_secs = positive("PHOENIX_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let append_attempts = positive(
            "PHOENIX_APPEND_ATTEMPTS",
            u64::from(DEFAULT_APPEND_ATTEMPTS),
        )?;
        let append_attempts =
            u32::try_from(append_attempts).map_err(|_| ConfigError::InvalidNumber {
                var: "PHOENIX_APPEND_ATTEMPTS",
                value: append_attempts.to_string(),
            })?;

        Ok(Self {
            github,
            alerts_path,
            timeout: Duration::from_secs(timeout_secs),
            append_attempts,
        })
    }
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn positive(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match non_empty(var) {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidNumber { var, value }),
        },
    }
}
