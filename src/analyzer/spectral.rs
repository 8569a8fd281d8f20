//! Spectral cutoff checker, invoked as `<tool> check <filename>` from inside
//! the file's folder.
//!
//! The tool answers with one of two sentences:
//!
//! ```text
//! song.mp3 seems good [320 kbps]
//! song.mp3 has max frequency about 11025 Hz [320 kbps]
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CheckError, Result};
use crate::models::CheckStatus;
use crate::process::{run_tool, tool_name};

const GOOD_PHRASE: &str = "seems good";
const MAX_PHRASE: &str = "has max";

static KBPS_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\s*kbps\]").unwrap());
static FREQUENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:about )?(\d+) Hz").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectralReport {
    pub status: CheckStatus,
    pub claimed_kbps: Option<u32>,
    pub cutoff_hz: Option<u32>,
}

impl SpectralReport {
    pub fn reason(&self) -> String {
        let kbps = self
            .claimed_kbps
            .map(|k| k.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match self.status {
            CheckStatus::Passed => format!("Seems good ({} kbps)", kbps),
            _ => {
                let cutoff = self
                    .cutoff_hz
                    .map(|hz| format!("{} Hz", hz))
                    .unwrap_or_else(|| "an unknown frequency".to_string());
                format!("Claims {} kbps but max frequency is about {}", kbps, cutoff)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpectralTool {
    tool: PathBuf,
    timeout: Duration,
}

impl SpectralTool {
    pub fn new(tool: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
        }
    }

    pub fn name(&self) -> String {
        tool_name(&self.tool)
    }

    pub fn check(&self, path: &Path) -> Result<SpectralReport> {
        let file_name = path.file_name().ok_or(CheckError::NotFound)?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let output = run_tool(
            &self.tool,
            [OsStr::new("check"), file_name],
            Some(dir),
            self.timeout,
        )?;

        if let Some(report) = parse_spectral_output(&output.stdout) {
            return Ok(report);
        }
        if !output.success {
            return Err(CheckError::ToolNonZeroExit {
                tool: self.name(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Err(CheckError::UnparseableOutput {
            tool: self.name(),
            output: collapse_whitespace(&output.stdout),
        })
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Recognize the tool's verdict sentence. `None` for any other shape.
///
/// The sentence starts with the file name, which may carry its own
/// `[128 kbps]` or `440 Hz` tags, so tokens are only read after the verdict.
pub fn parse_spectral_output(stdout: &str) -> Option<SpectralReport> {
    let text = collapse_whitespace(stdout);
    let good = text.rfind(GOOD_PHRASE);
    let max = text.rfind(MAX_PHRASE);

    match (good, max) {
        (Some(g), m) if m.map_or(true, |m| g > m) => {
            let tail = &text[g + GOOD_PHRASE.len()..];
            Some(SpectralReport {
                status: CheckStatus::Passed,
                claimed_kbps: capture_u32(&KBPS_TOKEN_RE, tail),
                cutoff_hz: None,
            })
        }
        (_, Some(m)) => {
            let tail = &text[m + MAX_PHRASE.len()..];
            if !tail.contains("frequency") {
                return None;
            }
            Some(SpectralReport {
                status: CheckStatus::Failed,
                claimed_kbps: capture_u32(&KBPS_TOKEN_RE, tail),
                cutoff_hz: capture_u32(&FREQUENCY_RE, tail),
            })
        }
        _ => None,
    }
}

fn capture_u32(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
