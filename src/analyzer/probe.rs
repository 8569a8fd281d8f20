//! Declared/actual bitrate via the media metadata probe (ffprobe-compatible).

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CheckError, Result};
use crate::process::{run_tool, tool_name};

/// Filename bitrate tags, tried in order.
static FILENAME_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)(\d{2,3})\s*kbps").unwrap(),
        Regex::new(r"\[(\d{2,3})\]").unwrap(),
        Regex::new(r"_(\d{2,3})").unwrap(),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeTarget {
    Stream,
    Format,
}

impl ProbeTarget {
    fn entries(self) -> &'static str {
        match self {
            ProbeTarget::Stream => "stream=bit_rate",
            ProbeTarget::Format => "format=bit_rate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeTool {
    tool: PathBuf,
    timeout: Duration,
}

impl ProbeTool {
    pub fn new(tool: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
        }
    }

    pub fn name(&self) -> String {
        tool_name(&self.tool)
    }

    /// Bitrate the file claims to have: audio stream, then container, then
    /// a tag in the file name.
    pub fn declared_bitrate(&self, path: &Path) -> Result<u32> {
        if let Some(kbps) = self.probe(path, ProbeTarget::Stream)? {
            return Ok(kbps);
        }
        if let Some(kbps) = self.probe(path, ProbeTarget::Format)? {
            return Ok(kbps);
        }
        let kbps = bitrate_from_filename(path).ok_or(CheckError::IndeterminateBitrate)?;
        debug!("Declared bitrate for {} taken from file name: {}kbps", path.display(), kbps);
        Ok(kbps)
    }

    /// Bitrate of the first audio stream as actually encoded.
    pub fn stream_bitrate(&self, path: &Path) -> Result<u32> {
        self.probe(path, ProbeTarget::Stream)?
            .ok_or(CheckError::IndeterminateBitrate)
    }

    fn probe(&self, path: &Path, target: ProbeTarget) -> Result<Option<u32>> {
        let mut args: Vec<&OsStr> = vec![OsStr::new("-v"), OsStr::new("error")];
        if target == ProbeTarget::Stream {
            args.extend([OsStr::new("-select_streams"), OsStr::new("a:0")]);
        }
        args.extend([
            OsStr::new("-show_entries"),
            OsStr::new(target.entries()),
            OsStr::new("-of"),
            OsStr::new("default=noprint_wrappers=1:nokey=1"),
            path.as_os_str(),
        ]);

        let output = run_tool(&self.tool, args, None, self.timeout)?;
        if !output.success {
            warn!(
                "{} ({}) exited with {} for {}: {}",
                self.name(),
                target.entries(),
                output.code,
                path.display(),
                output.stderr.trim()
            );
            return Ok(None);
        }
        Ok(parse_probe_output(&output.stdout))
    }
}

/// Parse the probe's bits/sec answer into whole kbps.
pub fn parse_probe_output(stdout: &str) -> Option<u32> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let bits: u64 = line.parse().ok()?;
    u32::try_from(bits / 1000).ok()
}

/// Look for a bitrate tag such as `320kbps`, `[256]` or `_192` in the file name.
pub fn bitrate_from_filename(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_string_lossy();
    FILENAME_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(&name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}
