use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::format::{format_console_line, format_sidecar_line};
use crate::models::{CheckResult, CheckStatus};

const SIDECAR_SUFFIX: &str = " - spectro_check.log";

/// Reports check results on the console and in sidecar logs next to the music.
///
/// Files directly inside the music root get a sidecar of their own, named
/// after the file; files inside any deeper folder share one sidecar named
/// after that folder.
#[derive(Debug, Clone)]
pub struct ResultLogger {
    music_root: Option<PathBuf>,
    write_sidecars: bool,
}

impl ResultLogger {
    pub fn new(music_root: Option<PathBuf>, write_sidecars: bool) -> Self {
        Self {
            music_root: music_root.map(|root| normalize(&root)),
            write_sidecars,
        }
    }

    /// Where the sidecar line for `file` goes.
    pub fn sidecar_path(&self, file: &Path) -> Option<PathBuf> {
        let dir = file.parent()?;
        let in_root = self
            .music_root
            .as_ref()
            .map(|root| normalize(dir) == *root)
            .unwrap_or(false);

        let name = if in_root {
            file.file_stem()?.to_string_lossy().to_string()
        } else {
            dir.file_name()?.to_string_lossy().to_string()
        };
        Some(dir.join(format!("{}{}", name, SIDECAR_SUFFIX)))
    }

    /// Log the console line for `file` and append to its sidecar when enabled.
    /// Returns the console line.
    pub fn emit(&self, file: &Path, result: &CheckResult) -> String {
        let line = format_console_line(file, result);
        info!("{}", line);

        if self.write_sidecars && result.status != CheckStatus::Skipped {
            if let Some(sidecar) = self.sidecar_path(file) {
                if let Err(e) = append_line(&sidecar, &format_sidecar_line(file, result)) {
                    warn!("Failed to write sidecar log {}: {}", sidecar.display(), e);
                }
            }
        }
        line
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.components().collect())
}
