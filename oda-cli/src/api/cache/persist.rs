//! JSON snapshot of a [`QueryCache`] on disk
//!
//! Only entries still valid at save time are written; entries that expired
//! while on disk are dropped on load.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::api::error::{OdaError, Result};

use super::clock::Clock;
use super::entry::CacheEntry;
use super::store::QueryCache;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

impl QueryCache {
    /// Load a cache saved with [`QueryCache::save`]; a missing file gives an empty cache
    pub fn load(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let cache = Self::new(clock);
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache file at {}", path.display());
                return Ok(cache);
            }
            Err(e) => return Err(file_error(path, e)),
        };

        let file: CacheFile = serde_json::from_slice(&bytes).map_err(|e| file_error(path, e))?;
        if file.version != FORMAT_VERSION {
            warn!(
                "Ignoring cache file {} with format version {}",
                path.display(),
                file.version
            );
            return Ok(cache);
        }

        let now = cache.now();
        let total = file.entries.len();
        let mut loaded = 0;
        for (key, entry) in file.entries {
            if entry.is_valid(now) {
                cache.insert_entry(key, entry);
                loaded += 1;
            }
        }
        debug!(
            "Loaded {} of {} cached result(s) from {}",
            loaded,
            total,
            path.display()
        );
        Ok(cache)
    }

    /// Write all valid entries to `path`, replacing it atomically; returns how many were written
    pub fn save(&self, path: &Path) -> Result<usize> {
        let now = self.now();
        let entries: BTreeMap<String, CacheEntry> = self
            .entries()
            .into_iter()
            .filter(|(_, entry)| entry.is_valid(now))
            .collect();
        let written = entries.len();
        let bytes = serde_json::to_vec(&CacheFile {
            version: FORMAT_VERSION,
            entries,
        })
        .map_err(|e| file_error(path, e))?;

        write_atomic(path, &bytes).map_err(|e| file_error(path, e))?;
        debug!("Saved {} cached result(s) to {}", written, path.display());
        Ok(written)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

fn file_error(path: &Path, error: impl std::fmt::Display) -> OdaError {
    OdaError::CacheFile {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
