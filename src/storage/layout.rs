use std::path::PathBuf;

use super::day::Day;

const ASSIGNMENTS_FILE: &str = "cam.cfg";
const MATS_FILE: &str = "mats.cfg";
const PLAYERS_FILE: &str = "players.cfg";
const RECORDING_SENTINEL: &str = "RECORDING";

/// On-disk layout of a node's share: `<root>/<day>/{cam.cfg,mats.cfg,players.cfg,RECORDING,camNN/}`.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn day_dir(&self, day: Day) -> PathBuf {
        self.root.join(day.to_string())
    }

    pub fn assignments_file(&self, day: Day) -> PathBuf {
        self.day_dir(day).join(ASSIGNMENTS_FILE)
    }

    pub fn mats_file(&self, day: Day) -> PathBuf {
        self.day_dir(day).join(MATS_FILE)
    }

    pub fn players_file(&self, day: Day) -> PathBuf {
        self.day_dir(day).join(PLAYERS_FILE)
    }

    pub fn recording_sentinel(&self, day: Day) -> PathBuf {
        self.day_dir(day).join(RECORDING_SENTINEL)
    }

    pub fn camera_dir_name(camera_id: u32) -> String {
        format!("cam{:02}", camera_id)
    }

    pub fn camera_dir(&self, day: Day, camera_id: u32) -> PathBuf {
        self.day_dir(day).join(Self::camera_dir_name(camera_id))
    }

    /// Days that have an assignment snapshot on disk.
    pub fn days_with_assignments(&self) -> Vec<Day> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut days: Vec<Day> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(Day::parse))
            .filter(|day| self.assignments_file(*day).exists())
            .collect();
        days.sort();
        days
    }

    /// Camera ids that have a capture directory for the day.
    pub fn camera_ids(&self, day: Day) -> Vec<u32> {
        let entries = match std::fs::read_dir(self.day_dir(day)) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut ids: Vec<u32> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                let digits = name.strip_prefix("cam")?;
                if digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()) {
                    digits.parse().ok()
                } else {
                    None
                }
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let layout = DataLayout::new("/share/srv2");
        let day = Day::parse("2024-10-09").unwrap();
        assert_eq!(layout.assignments_file(day), PathBuf::from("/share/srv2/2024-10-09/cam.cfg"));
        assert_eq!(layout.camera_dir(day, 7), PathBuf::from("/share/srv2/2024-10-09/cam07"));
        assert_eq!(layout.recording_sentinel(day), PathBuf::from("/share/srv2/2024-10-09/RECORDING"));
    }

    #[test]
    fn test_days_with_assignments_ignores_noise() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());

        let with_cfg = Day::parse("2024-10-09").unwrap();
        let without_cfg = Day::parse("2024-10-10").unwrap();
        std::fs::create_dir_all(layout.day_dir(with_cfg)).unwrap();
        std::fs::write(layout.assignments_file(with_cfg), "{}").unwrap();
        std::fs::create_dir_all(layout.day_dir(without_cfg)).unwrap();
        std::fs::create_dir_all(tmp.path().join("lost+found")).unwrap();

        assert_eq!(layout.days_with_assignments(), vec![with_cfg]);
    }

    #[test]
    fn test_camera_ids() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        let day = Day::parse("2024-10-09").unwrap();

        std::fs::create_dir_all(layout.camera_dir(day, 3)).unwrap();
        std::fs::create_dir_all(layout.camera_dir(day, 12)).unwrap();
        std::fs::create_dir_all(layout.day_dir(day).join("cam1")).unwrap();
        std::fs::write(layout.assignments_file(day), "{}").unwrap();

        assert_eq!(layout.camera_ids(day), vec![3, 12]);
    }
}
