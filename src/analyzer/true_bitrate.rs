use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CheckError, Result};
use crate::process::{run_tool, tool_name};

static KBPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*kbps").unwrap());
static KHZ_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*khz").unwrap());

/// Spectral bitrate estimator invoked as `<tool> <path>`.
#[derive(Debug, Clone)]
pub struct TrueBitrateTool {
    tool: PathBuf,
    timeout: Duration,
}

impl TrueBitrateTool {
    pub fn new(tool: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
        }
    }

    pub fn name(&self) -> String {
        tool_name(&self.tool)
    }

    /// Estimated real bitrate of the encoded content, in kbps.
    pub fn measure(&self, path: &Path) -> Result<u32> {
        let output = run_tool(&self.tool, [path.as_os_str()], None, self.timeout)?;
        if !output.success {
            return Err(CheckError::ToolNonZeroExit {
                tool: self.name(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        parse_true_bitrate_output(&output.stdout).ok_or_else(|| CheckError::UnparseableOutput {
            tool: self.name(),
            output: output.stdout.trim().to_string(),
        })
    }
}

/// Pull a bitrate from the estimator's report: an explicit `NNN kbps` line
/// wins, otherwise a `NN.N kHz` cutoff is mapped onto a bitrate bucket.
pub fn parse_true_bitrate_output(stdout: &str) -> Option<u32> {
    let from_kbps = stdout
        .lines()
        .filter(|line| line.to_lowercase().contains("kbps"))
        .find_map(|line| {
            KBPS_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        });
    if from_kbps.is_some() {
        return from_kbps;
    }

    stdout
        .lines()
        .filter(|line| line.to_lowercase().contains("khz"))
        .find_map(|line| {
            KHZ_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
        })
        .map(kbps_for_cutoff_khz)
}

/// Typical encoder bitrate for a given lowpass cutoff.
pub fn kbps_for_cutoff_khz(khz: f64) -> u32 {
    if khz <= 11.0 {
        64
    } else if khz <= 13.0 {
        96
    } else if khz <= 15.0 {
        128
    } else if khz <= 17.0 {
        192
    } else if khz <= 19.0 {
        256
    } else {
        320
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kbps_line() {
        let out = "Analyzing song.mp3\nEstimated bitrate: 128 kbps\n";
        assert_eq!(parse_true_bitrate_output(out), Some(128));
    }

    #[test]
    fn test_kbps_case_insensitive() {
        assert_eq!(parse_true_bitrate_output("True bitrate 256KBPS"), Some(256));
    }

    #[test]
    fn test_kbps_beats_khz() {
        let out = "Cutoff: 16.0 kHz\nBitrate: 320kbps\n";
        assert_eq!(parse_true_bitrate_output(out), Some(320));
    }

    #[test]
    fn test_khz_fallback() {
        assert_eq!(parse_true_bitrate_output("Frequency cutoff: 16.5 kHz"), Some(192));
        assert_eq!(parse_true_bitrate_output("cutoff 20khz"), Some(320));
    }

    #[test]
    fn test_kbps_line_without_number_falls_through() {
        let out = "kbps: unknown\nlowpass at 15 kHz\n";
        assert_eq!(parse_true_bitrate_output(out), Some(128));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(parse_true_bitrate_output("nothing useful here"), None);
        assert_eq!(parse_true_bitrate_output(""), None);
    }

    #[test]
    fn test_cutoff_staircase() {
        assert_eq!(kbps_for_cutoff_khz(8.0), 64);
        assert_eq!(kbps_for_cutoff_khz(11.0), 64);
        assert_eq!(kbps_for_cutoff_khz(11.025), 96);
        assert_eq!(kbps_for_cutoff_khz(13.0), 96);
        assert_eq!(kbps_for_cutoff_khz(15.0), 128);
        assert_eq!(kbps_for_cutoff_khz(17.0), 192);
        assert_eq!(kbps_for_cutoff_khz(19.0), 256);
        assert_eq!(kbps_for_cutoff_khz(19.5), 320);
        assert_eq!(kbps_for_cutoff_khz(22.05), 320);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_is_non_zero_exit() {
        use crate::models::CheckStatus;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("true-bitrate");
        std::fs::write(&tool, "#!/bin/sh\necho '128 kbps'\necho 'decoder crashed' >&2\nexit 4\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let song = dir.path().join("song.mp3");
        std::fs::write(&song, b"x").unwrap();

        let err = TrueBitrateTool::new(&tool, Duration::from_secs(5))
            .measure(&song)
            .unwrap_err();
        assert!(matches!(
            err,
            CheckError::ToolNonZeroExit { ref code, ref stderr, .. }
                if code == "exit code 4" && stderr == "decoder crashed"
        ));

        let result = err.into_result();
        assert_eq!(result.status, CheckStatus::Error);
        assert!(result.reason.contains("true-bitrate exited with exit code 4"));
    }
}
