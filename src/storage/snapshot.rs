//! Durable JSON snapshots.
//!
//! Every write goes to a sibling temp file first, is synced to disk and is
//! then renamed over the previous snapshot, so readers only ever observe a
//! complete file. When a backup is requested the previous snapshot is kept as
//! `<file>_<unix millis>`, with a `_<n>` suffix if that name is taken.

use serde::{de::DeserializeOwned, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CamError, CamResult};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("_");
    PathBuf::from(name)
}

/// First unused backup name for `path` at the given time.
fn backup_path(path: &Path, unix_millis: i64) -> PathBuf {
    let mut seq = 0u32;
    loop {
        let mut name = path.as_os_str().to_owned();
        name.push(format!("_{}", unix_millis));
        if seq > 0 {
            name.push(format!("_{}", seq));
        }
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            return candidate;
        }
        seq += 1;
    }
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Make a rename inside `dir` durable.
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!("Failed to sync {}: {}", dir.display(), e);
    }
}

/// Atomically replace `path` with the pretty-printed JSON of `value`.
pub fn write_snapshot<T: Serialize>(path: &Path, value: &T, backup: bool) -> CamResult<()> {
    let persist = |e: std::io::Error| CamError::PersistError(format!("{}: {}", path.display(), e));

    let dir = path.parent();
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir).map_err(persist)?;
    }

    let tmp = temp_path(path);
    let data = serde_json::to_vec_pretty(value)?;
    write_synced(&tmp, &data).map_err(persist)?;

    if backup && path.exists() {
        let saved = backup_path(path, chrono::Utc::now().timestamp_millis());
        std::fs::rename(path, &saved).map_err(persist)?;
    }

    std::fs::rename(&tmp, path).map_err(persist)?;
    if let Some(dir) = dir {
        sync_dir(dir);
    }
    Ok(())
}

/// Read a snapshot. A missing file is `None`; a malformed one is logged and
/// also treated as `None` so startup never aborts on a bad file.
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Failed to read snapshot {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_slice(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Malformed snapshot {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("2024-10-09").join("cam.cfg");

        let mut table = BTreeMap::new();
        table.insert(7u32, "mat1".to_string());
        write_snapshot(&path, &table, false).unwrap();

        let back: BTreeMap<u32, String> = read_snapshot(&path).unwrap();
        assert_eq!(back, table);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_backup_keeps_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cam.cfg");

        write_snapshot(&path, &vec![1], false).unwrap();
        write_snapshot(&path, &vec![2], true).unwrap();

        let backups: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("cam.cfg_"))
            .collect();
        assert_eq!(backups.len(), 1);

        let current: Vec<i32> = read_snapshot(&path).unwrap();
        assert_eq!(current, vec![2]);
    }

    #[test]
    fn test_backups_in_quick_succession_are_all_kept() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cam.cfg");

        write_snapshot(&path, &vec![1], false).unwrap();
        for n in 2..=4 {
            write_snapshot(&path, &vec![n], true).unwrap();
        }

        let mut kept: Vec<Vec<i32>> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("cam.cfg_"))
            .map(|e| read_snapshot(&e.path()).unwrap())
            .collect();
        kept.sort();
        assert_eq!(kept, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_backup_name_skips_taken_names() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cam.cfg");

        let first = backup_path(&path, 1_700_000_000_123);
        assert_eq!(first, tmp.path().join("cam.cfg_1700000000123"));
        std::fs::write(&first, b"[]").unwrap();
        assert_eq!(
            backup_path(&path, 1_700_000_000_123),
            tmp.path().join("cam.cfg_1700000000123_1")
        );
    }

    #[test]
    fn test_leftover_temp_file_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cam.cfg");
        write_snapshot(&path, &vec![1], false).unwrap();

        // an interrupted earlier write left a truncated temp file behind
        std::fs::write(temp_path(&path), b"[1, 2").unwrap();
        write_snapshot(&path, &vec![1, 2, 3], false).unwrap();

        let current: Vec<i32> = read_snapshot(&path).unwrap();
        assert_eq!(current, vec![1, 2, 3]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_missing_and_malformed_are_none() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.cfg");
        assert!(read_snapshot::<Vec<i32>>(&missing).is_none());

        let broken = tmp.path().join("broken.cfg");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(read_snapshot::<Vec<i32>>(&broken).is_none());
    }
}
