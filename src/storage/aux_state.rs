//! Last-writer-wins tables for mats (bookmarks / medical notes, per day) and
//! player registrations (not day-scoped).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::assignments::{CameraId, MAX_MAT};
use super::day::Day;

pub type MatId = u8;
pub type PlayerId = String;

/// Bookmark and medical markers are produced by the scoring clients and are
/// stored verbatim.
pub type Marker = serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mat {
    #[serde(default)]
    pub bookmarks: Vec<Marker>,
    #[serde(default)]
    pub medicals: Vec<Marker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medicals: Option<Vec<Marker>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<Vec<Marker>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

pub type DayMats = BTreeMap<MatId, Mat>;
pub type MatTable = BTreeMap<Day, DayMats>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub camid: CameraId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

pub type PlayerTable = BTreeMap<PlayerId, Player>;

/// Empty mats 1..=MAX_MAT.
pub fn default_mats() -> DayMats {
    (1..=MAX_MAT).map(|id| (id, Mat::default())).collect()
}

/// Make sure every mat id exists for the day, keeping whatever is there.
pub fn fill_default_mats(mats: &mut DayMats) {
    for id in 1..=MAX_MAT {
        mats.entry(id).or_default();
    }
}

pub fn is_valid_mat(mat_id: MatId) -> bool {
    (1..=MAX_MAT).contains(&mat_id)
}

/// Apply whichever lists the patch carries and stamp the mat.
pub fn apply_patch(mat: &mut Mat, patch: MatPatch, ts: i64) {
    if let Some(bookmarks) = patch.bookmarks {
        mat.bookmarks = bookmarks;
    }
    if let Some(medicals) = patch.medicals {
        mat.medicals = medicals;
    }
    mat.ts = Some(ts);
}

fn strictly_newer(theirs: Option<i64>, ours: Option<i64>) -> bool {
    match (theirs, ours) {
        (Some(t), Some(o)) => t > o,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Merge a peer's mats for one day; strictly newer timestamps win.
pub fn merge_mats(local: &mut DayMats, remote: &DayMats) -> usize {
    let mut changed = 0;
    for (mat_id, theirs) in remote {
        if !is_valid_mat(*mat_id) {
            continue;
        }
        let ours = local.entry(*mat_id).or_default();
        if strictly_newer(theirs.ts, ours.ts) {
            *ours = theirs.clone();
            changed += 1;
        }
    }
    changed
}

/// Merge every peer's mat tables. Returns the days that changed.
pub fn reconcile_mats(local: &mut MatTable, remotes: &[MatTable]) -> BTreeSet<Day> {
    let mut changed = BTreeSet::new();
    for remote in remotes {
        for (day, theirs) in remote {
            let ours = local.entry(*day).or_insert_with(default_mats);
            if merge_mats(ours, theirs) > 0 {
                changed.insert(*day);
            }
        }
    }
    changed
}

/// Merge every peer's player registrations; newer timestamps win, unknown
/// players are adopted. Returns whether anything changed.
pub fn reconcile_players(local: &mut PlayerTable, remotes: &[PlayerTable]) -> bool {
    let mut changed = false;
    for remote in remotes {
        for (player_id, theirs) in remote {
            match local.get(player_id) {
                None => {
                    local.insert(player_id.clone(), *theirs);
                    changed = true;
                }
                Some(ours) if ours != theirs && strictly_newer(theirs.ts, ours.ts) => {
                    local.insert(player_id.clone(), *theirs);
                    changed = true;
                }
                Some(_) => {}
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day() -> Day {
        Day::parse("2024-10-09").unwrap()
    }

    #[test]
    fn test_default_mats_cover_fixed_range() {
        let mats = default_mats();
        assert_eq!(mats.len(), MAX_MAT as usize);
        assert!(mats.contains_key(&1));
        assert!(mats.contains_key(&MAX_MAT));
        assert!(!mats.contains_key(&0));
    }

    #[test]
    fn test_apply_patch_only_touches_supplied_lists() {
        let mut mat = Mat {
            bookmarks: vec![json!({"t": 1})],
            medicals: vec![json!({"t": 2})],
            ts: Some(1),
        };
        let patch = MatPatch {
            bookmarks: Some(vec![json!({"t": 3})]),
            ..Default::default()
        };
        apply_patch(&mut mat, patch, 5);

        assert_eq!(mat.bookmarks, vec![json!({"t": 3})]);
        assert_eq!(mat.medicals, vec![json!({"t": 2})]);
        assert_eq!(mat.ts, Some(5));
    }

    #[test]
    fn test_merge_mats_newer_wins() {
        let mut local = default_mats();
        local.get_mut(&1).unwrap().ts = Some(10);

        let mut remote = default_mats();
        remote.insert(1, Mat { bookmarks: vec![json!("a")], medicals: vec![], ts: Some(9) });
        remote.insert(2, Mat { bookmarks: vec![json!("b")], medicals: vec![], ts: Some(3) });

        assert_eq!(merge_mats(&mut local, &remote), 1);
        assert!(local[&1].bookmarks.is_empty());
        assert_eq!(local[&2].bookmarks, vec![json!("b")]);
    }

    #[test]
    fn test_merge_mats_ignores_out_of_range_ids() {
        let mut local = default_mats();
        let mut remote = DayMats::new();
        remote.insert(42, Mat { ts: Some(1), ..Default::default() });
        assert_eq!(merge_mats(&mut local, &remote), 0);
        assert!(!local.contains_key(&42));
    }

    #[test]
    fn test_reconcile_mats_creates_unknown_day() {
        let mut local = MatTable::new();
        let mut remote_day = default_mats();
        remote_day.get_mut(&4).unwrap().ts = Some(7);
        let remote = MatTable::from([(day(), remote_day)]);

        let changed = reconcile_mats(&mut local, &[remote]);
        assert!(changed.contains(&day()));
        assert_eq!(local[&day()].len(), MAX_MAT as usize);
        assert_eq!(local[&day()][&4].ts, Some(7));
    }

    #[test]
    fn test_reconcile_players() {
        let mut local = PlayerTable::new();
        local.insert("p1".into(), Player { camid: 1, ts: Some(10) });
        local.insert("p2".into(), Player { camid: 2, ts: Some(10) });

        let mut remote = PlayerTable::new();
        remote.insert("p1".into(), Player { camid: 5, ts: Some(11) });
        remote.insert("p2".into(), Player { camid: 6, ts: Some(9) });
        remote.insert("p3".into(), Player { camid: 7, ts: None });

        assert!(reconcile_players(&mut local, &[remote.clone()]));
        assert_eq!(local["p1"].camid, 5);
        assert_eq!(local["p2"].camid, 2);
        assert_eq!(local["p3"].camid, 7);

        // second pass is a no-op
        assert!(!reconcile_players(&mut local, &[remote]));
    }
}
