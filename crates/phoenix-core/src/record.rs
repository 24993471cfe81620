// ABOUTME: Defines the Record struct representing one alert row in the ledger.
// ABOUTME: Includes the Severity enum, record construction, and append-time validation.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status assigned to newly reported alerts.
pub const DEFAULT_STATUS: &str = "pending";

/// Errors raised when a record or one of its fields is not representable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("field '{field}' contains a line break, which the ledger cannot store")]
    EmbeddedNewline { field: &'static str },

    #[error("unknown severity '{0}' (expected low, medium, high or critical)")]
    UnknownSeverity(String),
}

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(RecordError::UnknownSeverity(s.to_string())),
        }
    }
}

/// One alert entry. Field order matches the column order of the stored
/// document. Records are never modified once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub location: String,
    pub severity: Severity,
    pub description: String,
    pub contact_info: Option<String>,
    /// ISO-8601 text, stored exactly as given.
    pub timestamp: String,
    pub status: String,
    pub verified: bool,
}

impl Record {
    /// Create a new unverified, pending record stamped with the current UTC time.
    pub fn new(location: String, severity: Severity, description: String) -> Self {
        Self {
            location,
            severity,
            description,
            contact_info: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            status: DEFAULT_STATUS.to_string(),
            verified: false,
        }
    }

    /// Attach contact info. Blank input leaves the record without contact info,
    /// since the stored form cannot tell an empty value from an absent one.
    pub fn with_contact_info(mut self, contact: impl Into<String>) -> Self {
        let contact = contact.into();
        self.contact_info = if contact.trim().is_empty() {
            None
        } else {
            Some(contact)
        };
        self
    }

    /// Check that every text field fits on a single stored line.
    pub fn validate(&self) -> Result<(), RecordError> {
        let fields = [
            ("location", self.location.as_str()),
            ("description", self.description.as_str()),
            ("contactinfo", self.contact_info.as_deref().unwrap_or("")),
            ("timestamp", self.timestamp.as_str()),
            ("status", self.status.as_str()),
        ];
        for (field, value) in fields {
            if value.contains(['\n', '\r']) {
                return Err(RecordError::EmbeddedNewline { field });
            }
        }
        Ok(())
    }
}
