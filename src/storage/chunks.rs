//! Local index of recorded segments (`<root>/<day>/camNN/<11 hex digits>.ts`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use super::assignments::CameraId;
use super::day::Day;
use super::layout::DataLayout;

static CHUNK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{11})\.ts$").expect("valid chunk regex"));

/// Extract the chunk id from a segment file name.
pub fn chunk_id(file_name: &str) -> Option<&str> {
    CHUNK_NAME
        .captures(file_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Per-directory listing cache, invalidated when the directory mtime moves.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    cache: HashMap<PathBuf, (SystemTime, Vec<String>)>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted chunk ids for a camera on a day; empty when nothing was recorded.
    pub fn list(&mut self, layout: &DataLayout, day: Day, camera_id: CameraId) -> Vec<String> {
        let dir = layout.camera_dir(day, camera_id);
        let mtime = match std::fs::metadata(&dir).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => {
                self.cache.remove(&dir);
                return Vec::new();
            }
        };

        if let Some((cached_at, ids)) = self.cache.get(&dir) {
            if *cached_at == mtime {
                return ids.clone();
            }
        }

        let mut ids: Vec<String> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().and_then(chunk_id).map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to scan {}: {}", dir.display(), e);
                Vec::new()
            }
        };
        ids.sort();

        self.cache.insert(dir, (mtime, ids.clone()));
        ids
    }

    /// Drop cached listings under a day (used when the day is deleted).
    pub fn forget_day(&mut self, layout: &DataLayout, day: Day) {
        let prefix = layout.day_dir(day);
        self.cache.retain(|path, _| !path.starts_with(&prefix));
    }
}
