use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

impl CheckStatus {
    /// Glyph shown in front of the console line.
    pub fn glyph(self) -> &'static str {
        match self {
            CheckStatus::Passed => "\u{2713}",
            CheckStatus::Failed => "\u{2717}",
            CheckStatus::Skipped | CheckStatus::Error => "!",
        }
    }

    fn default_reason(self) -> &'static str {
        match self {
            CheckStatus::Passed => "Check passed",
            CheckStatus::Failed => "Check failed",
            CheckStatus::Skipped => "Skipped",
            CheckStatus::Error => "Unknown error",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckStatus::Passed => "Passed",
            CheckStatus::Failed => "Failed",
            CheckStatus::Skipped => "Skipped",
            CheckStatus::Error => "Error",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passed" => Ok(CheckStatus::Passed),
            "failed" => Ok(CheckStatus::Failed),
            "skipped" => Ok(CheckStatus::Skipped),
            "error" => Ok(CheckStatus::Error),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// Outcome of checking one file. Replaced wholesale by a newer check of the
/// same path, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff_frequency_hz: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(status: CheckStatus, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            status.default_reason().to_string()
        } else {
            reason
        };
        Self {
            status,
            reason,
            declared_kbps: None,
            measured_kbps: None,
            cutoff_frequency_hz: None,
            timestamp: Utc::now(),
        }
    }

    pub fn passed(reason: impl Into<String>) -> Self {
        Self::new(CheckStatus::Passed, reason)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(CheckStatus::Failed, reason)
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::new(CheckStatus::Skipped, reason)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(CheckStatus::Error, reason)
    }

    pub fn with_bitrates(mut self, declared_kbps: Option<u32>, measured_kbps: Option<u32>) -> Self {
        self.declared_kbps = declared_kbps;
        self.measured_kbps = measured_kbps;
        self
    }

    pub fn with_cutoff(mut self, cutoff_frequency_hz: Option<u32>) -> Self {
        self.cutoff_frequency_hz = cutoff_frequency_hz;
        self
    }
}

/// What an analyzer strategy extracts from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measurement {
    /// Declared and measured bitrate, still to be judged by the comparator.
    Bitrates { declared_kbps: u32, measured_kbps: u32 },
    /// Final verdict produced by the tool itself.
    Verdict {
        status: CheckStatus,
        reason: String,
        claimed_kbps: Option<u32>,
        cutoff_hz: Option<u32>,
    },
}

/// Sent from the worker thread to a subscriber for live progress
#[derive(Debug, Clone)]
pub enum CheckEvent {
    Started { path: PathBuf },
    Completed { path: PathBuf, result: CheckResult },
    Abandoned { count: usize },
}
