use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::models::CheckResult;

/// Last result per absolute file path, optionally backed by a JSON file.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<String, CheckResult>,
    path: Option<PathBuf>,
}

impl ResultCache {
    /// A cache that never touches the disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache stored at `path`. A missing or unreadable file yields an
    /// empty cache that will still be written back to `path`.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<HashMap<String, CheckResult>>(&data) {
                Ok(entries) => {
                    info!("Loaded {} cached check results", entries.len());
                    entries
                }
                Err(e) => {
                    warn!("Error loading cache {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Error loading cache {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        Self {
            entries,
            path: Some(path.to_path_buf()),
        }
    }

    /// Open the persistent cache at `path`, creating its directory. Falls back
    /// to an in-memory cache if the location cannot be prepared.
    pub fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(
                    "Could not initialize cache file {}: {}; results will not be persisted",
                    path.display(),
                    e
                );
                return Self::in_memory();
            }
        }
        Self::load(path)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, file: &Path) -> Option<&CheckResult> {
        self.entries.get(&key(file))
    }

    /// Store the result for `file`, replacing any earlier one.
    pub fn insert(&mut self, file: &Path, result: CheckResult) {
        self.entries.insert(key(file), result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by path.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CheckResult)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }

    /// Fold another cache into this one; for a path present in both, the
    /// result with the later timestamp wins.
    pub fn merge(&mut self, other: ResultCache) {
        for (path, result) in other.entries {
            match self.entries.get(&path) {
                Some(existing) if existing.timestamp > result.timestamp => {}
                _ => {
                    self.entries.insert(path, result);
                }
            }
        }
    }

    /// Write the whole cache as pretty-printed JSON. The new content goes to a
    /// sibling temp file that is then renamed over the old one, so readers
    /// never see a half-written file. No-op for in-memory caches.
    pub fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }
}

fn key(file: &Path) -> String {
    file.to_string_lossy().to_string()
}
