//! Day-indexed camera → (mat, position) assignment tables.
//!
//! The functions here are pure: they take tables by reference and report what
//! changed. Locking, persistence and replication live in the cluster layer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::day::Day;
use crate::error::{CamError, CamResult};

pub type CameraId = u32;

pub const MAX_MAT: u8 = 8;
pub const MAX_POS: u8 = 4;

/// Where a camera is recording for a day. `(0, 0)` means unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraAssignment {
    pub mat: u8,
    pub position: u8,
    /// Unix seconds of the last explicit assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl CameraAssignment {
    pub fn new(mat: u8, position: u8, ts: Option<i64>) -> Self {
        Self { mat, position, ts }
    }

    pub fn unassigned() -> Self {
        Self::new(0, 0, None)
    }

    pub fn is_assigned(&self) -> bool {
        self.mat != 0 && self.position != 0
    }

    pub fn slot(&self) -> (u8, u8) {
        (self.mat, self.position)
    }

    fn same_slot(&self, other: &CameraAssignment) -> bool {
        self.slot() == other.slot()
    }
}

pub type DayAssignments = BTreeMap<CameraId, CameraAssignment>;
pub type AssignmentTable = BTreeMap<Day, DayAssignments>;

/// Reject slots outside the fixed mat/position grid.
pub fn validate_slot(mat: u8, position: u8) -> CamResult<()> {
    if mat > MAX_MAT {
        return Err(CamError::BadRequest(format!("mat {} out of range 0..={}", mat, MAX_MAT)));
    }
    if position > MAX_POS {
        return Err(CamError::BadRequest(format!(
            "position {} out of range 0..={}",
            position, MAX_POS
        )));
    }
    if (mat == 0) != (position == 0) {
        return Err(CamError::BadRequest(
            "mat and position must both be zero to unassign".to_string(),
        ));
    }
    Ok(())
}

/// Merge one peer's table for a day into the local one.
///
/// Unknown cameras are adopted as-is. A camera present on both sides whose
/// slot differs is replaced only when the remote timestamp is strictly newer.
/// Returns the number of entries adopted or replaced.
pub fn merge_remote(day: Day, local: &mut DayAssignments, remote: &DayAssignments) -> usize {
    let mut changed = 0;

    for (camera_id, theirs) in remote {
        match local.get(camera_id) {
            None => {
                local.insert(*camera_id, *theirs);
                changed += 1;
            }
            Some(ours) if !ours.same_slot(theirs) => {
                let remote_newer = match (theirs.ts, ours.ts) {
                    (Some(t), Some(o)) => t > o,
                    (Some(_), None) => true,
                    _ => false,
                };
                if remote_newer {
                    tracing::info!(
                        "[CFG] {} cam{:02} replaced {:?} -> {:?} (newer remote)",
                        day, camera_id, ours, theirs
                    );
                    local.insert(*camera_id, *theirs);
                    changed += 1;
                } else {
                    tracing::warn!(
                        "[CFG] {} cam{:02} differs, keeping local {:?} over {:?}",
                        day, camera_id, ours, theirs
                    );
                }
            }
            Some(_) => {}
        }
    }

    changed
}

/// Unassign every camera that shares a nonzero slot with a newer assignment.
///
/// The newest timestamp keeps the slot; a missing timestamp is the oldest;
/// equal timestamps keep the lowest camera id. Returns the reset cameras in
/// ascending order.
pub fn resolve_collisions(day: Day, table: &mut DayAssignments) -> Vec<CameraId> {
    let mut by_slot: BTreeMap<(u8, u8), Vec<CameraId>> = BTreeMap::new();
    for (camera_id, assignment) in table.iter() {
        if assignment.is_assigned() {
            by_slot.entry(assignment.slot()).or_default().push(*camera_id);
        }
    }

    let mut losers = Vec::new();
    for (slot, cameras) in by_slot.into_iter().filter(|(_, c)| c.len() > 1) {
        let keeper = cameras
            .iter()
            .copied()
            .max_by(|a, b| {
                let ta = table[a].ts;
                let tb = table[b].ts;
                // equal timestamps favour the lowest id
                ta.cmp(&tb).then(b.cmp(a))
            })
            .unwrap_or(cameras[0]);

        for camera_id in cameras.into_iter().filter(|c| *c != keeper) {
            tracing::warn!(
                "[CFG] {} collision on mat {} position {}: cam{:02} yields to cam{:02}",
                day, slot.0, slot.1, camera_id, keeper
            );
            losers.push(camera_id);
        }
    }

    losers.sort_unstable();
    for camera_id in &losers {
        table.insert(*camera_id, CameraAssignment::unassigned());
    }
    losers
}

/// First slot in row-major order (mat outer, position inner) that no camera
/// other than `camera_id` currently holds.
pub fn first_free_slot(table: &DayAssignments, camera_id: CameraId) -> Option<(u8, u8)> {
    let used: BTreeSet<(u8, u8)> = table
        .iter()
        .filter(|(id, a)| **id != camera_id && a.is_assigned())
        .map(|(_, a)| a.slot())
        .collect();

    (1..=MAX_MAT)
        .flat_map(|m| (1..=MAX_POS).map(move |p| (m, p)))
        .find(|slot| !used.contains(slot))
}

/// Give each queued camera the first free slot. Cameras that find the grid
/// full stay unassigned.
pub fn reassign(day: Day, table: &mut DayAssignments, queued: &[CameraId]) {
    for camera_id in queued {
        match first_free_slot(table, *camera_id) {
            Some((mat, position)) => {
                tracing::info!(
                    "[CFG] {} cam{:02} reassigned to mat {} position {}",
                    day, camera_id, mat, position
                );
                table.insert(*camera_id, CameraAssignment::new(mat, position, None));
            }
            None => {
                tracing::warn!("[CFG] {} no free slot left for cam{:02}", day, camera_id);
                table.insert(*camera_id, CameraAssignment::unassigned());
            }
        }
    }
}

/// Assign `camera_id` to a slot, swapping with the camera that held it.
///
/// The displaced camera takes over the requester's previous slot, or becomes
/// unassigned if the requester had none. Both entries are stamped with `ts`.
/// Returns the displaced camera, if any.
pub fn assign(
    table: &mut DayAssignments,
    camera_id: CameraId,
    mat: u8,
    position: u8,
    ts: i64,
) -> Option<CameraId> {
    let requested = CameraAssignment::new(mat, position, Some(ts));

    let displaced = if requested.is_assigned() {
        table
            .iter()
            .find(|(id, a)| **id != camera_id && a.same_slot(&requested))
            .map(|(id, _)| *id)
    } else {
        None
    };

    if let Some(other) = displaced {
        let previous = table
            .get(&camera_id)
            .map(|a| CameraAssignment::new(a.mat, a.position, Some(ts)))
            .unwrap_or_else(|| CameraAssignment::new(0, 0, Some(ts)));
        table.insert(other, previous);
    }

    table.insert(camera_id, requested);
    displaced
}

/// Reconcile the whole local table against peer tables.
///
/// Each peer's days are merged in, then every day gets a collision pass and
/// reassignment. Returns the days whose table ended up different.
pub fn reconcile(local: &mut AssignmentTable, remotes: &[AssignmentTable]) -> BTreeSet<Day> {
    let before = local.clone();

    for remote in remotes {
        for (day, theirs) in remote {
            let ours = local.entry(*day).or_default();
            merge_remote(*day, ours, theirs);
        }
    }

    for (day, table) in local.iter_mut() {
        let queued = resolve_collisions(*day, table);
        if !queued.is_empty() {
            reassign(*day, table, &queued);
        }
    }

    local
        .iter()
        .filter(|(day, table)| before.get(day) != Some(table))
        .map(|(day, _)| *day)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> Day {
        Day::parse("2024-10-09").unwrap()
    }

    fn entry(mat: u8, position: u8, ts: Option<i64>) -> CameraAssignment {
        CameraAssignment::new(mat, position, ts)
    }

    fn has_unique_slots(table: &DayAssignments) -> bool {
        let assigned: Vec<_> = table.values().filter(|a| a.is_assigned()).map(|a| a.slot()).collect();
        let unique: BTreeSet<_> = assigned.iter().collect();
        unique.len() == assigned.len()
    }

    #[test]
    fn test_validate_slot() {
        assert!(validate_slot(0, 0).is_ok());
        assert!(validate_slot(8, 4).is_ok());
        assert!(validate_slot(9, 1).is_err());
        assert!(validate_slot(1, 5).is_err());
        assert!(validate_slot(0, 2).is_err());
    }

    #[test]
    fn test_merge_adopts_unknown_camera() {
        let mut local = DayAssignments::new();
        let mut remote = DayAssignments::new();
        remote.insert(3, entry(1, 2, Some(10)));

        assert_eq!(merge_remote(day(), &mut local, &remote), 1);
        assert_eq!(local[&3], entry(1, 2, Some(10)));
    }

    #[test]
    fn test_merge_strictly_newer_remote_wins() {
        let mut local = DayAssignments::new();
        local.insert(3, entry(1, 1, Some(10)));

        let mut remote = DayAssignments::new();
        remote.insert(3, entry(2, 2, Some(10)));
        assert_eq!(merge_remote(day(), &mut local, &remote), 0);
        assert_eq!(local[&3].slot(), (1, 1));

        remote.insert(3, entry(2, 2, Some(11)));
        assert_eq!(merge_remote(day(), &mut local, &remote), 1);
        assert_eq!(local[&3].slot(), (2, 2));
    }

    #[test]
    fn test_merge_keeps_local_when_remote_has_no_ts() {
        let mut local = DayAssignments::new();
        local.insert(3, entry(1, 1, None));
        let mut remote = DayAssignments::new();
        remote.insert(3, entry(2, 2, None));

        assert_eq!(merge_remote(day(), &mut local, &remote), 0);
        assert_eq!(local[&3].slot(), (1, 1));
    }

    #[test]
    fn test_collision_older_loses() {
        let mut table = DayAssignments::new();
        table.insert(1, entry(1, 1, Some(100)));
        table.insert(2, entry(1, 1, Some(200)));
        table.insert(3, entry(1, 2, None));

        let losers = resolve_collisions(day(), &mut table);
        assert_eq!(losers, vec![1]);
        assert_eq!(table[&1], CameraAssignment::unassigned());
        assert_eq!(table[&2].slot(), (1, 1));
    }

    #[test]
    fn test_collision_missing_ts_is_oldest() {
        let mut table = DayAssignments::new();
        table.insert(4, entry(2, 3, Some(5)));
        table.insert(9, entry(2, 3, None));

        assert_eq!(resolve_collisions(day(), &mut table), vec![9]);
    }

    #[test]
    fn test_collision_tie_keeps_lowest_camera() {
        let mut table = DayAssignments::new();
        table.insert(5, entry(3, 1, None));
        table.insert(6, entry(3, 1, None));
        table.insert(7, entry(3, 1, None));

        assert_eq!(resolve_collisions(day(), &mut table), vec![6, 7]);
        assert_eq!(table[&5].slot(), (3, 1));
    }

    #[test]
    fn test_first_free_slot_row_major() {
        let mut table = DayAssignments::new();
        assert_eq!(first_free_slot(&table, 1), Some((1, 1)));

        table.insert(1, entry(1, 1, None));
        table.insert(2, entry(1, 2, None));
        assert_eq!(first_free_slot(&table, 3), Some((1, 3)));
        // a camera's own slot counts as free for itself
        assert_eq!(first_free_slot(&table, 1), Some((1, 1)));
    }

    #[test]
    fn test_first_free_slot_full_grid() {
        let mut table = DayAssignments::new();
        let mut id = 1;
        for m in 1..=MAX_MAT {
            for p in 1..=MAX_POS {
                table.insert(id, entry(m, p, None));
                id += 1;
            }
        }
        assert_eq!(first_free_slot(&table, 99), None);
    }

    #[test]
    fn test_assign_swaps_with_holder() {
        let mut table = DayAssignments::new();
        table.insert(1, entry(1, 1, Some(1)));
        table.insert(2, entry(2, 2, Some(1)));

        let displaced = assign(&mut table, 1, 2, 2, 50);
        assert_eq!(displaced, Some(2));
        assert_eq!(table[&1], entry(2, 2, Some(50)));
        assert_eq!(table[&2], entry(1, 1, Some(50)));
    }

    #[test]
    fn test_assign_unassigns_holder_when_requester_new() {
        let mut table = DayAssignments::new();
        table.insert(2, entry(2, 2, Some(1)));

        assign(&mut table, 7, 2, 2, 60);
        assert_eq!(table[&7], entry(2, 2, Some(60)));
        assert_eq!(table[&2].slot(), (0, 0));
        assert!(has_unique_slots(&table));
    }

    #[test]
    fn test_assign_same_slot_is_not_a_swap() {
        let mut table = DayAssignments::new();
        table.insert(1, entry(1, 1, Some(1)));
        assert_eq!(assign(&mut table, 1, 1, 1, 2), None);
        assert_eq!(table[&1], entry(1, 1, Some(2)));
    }

    #[test]
    fn test_reconcile_identical_is_idempotent() {
        let mut local = AssignmentTable::new();
        let mut t = DayAssignments::new();
        t.insert(1, entry(1, 1, Some(10)));
        t.insert(2, entry(1, 2, None));
        local.insert(day(), t);

        let remote = local.clone();
        let changed = reconcile(&mut local, &[remote.clone()]);
        assert!(changed.is_empty());
        assert_eq!(local, remote);
    }

    #[test]
    fn test_reconcile_resolves_cross_peer_collision() {
        let mut local = AssignmentTable::new();
        let mut ours = DayAssignments::new();
        ours.insert(1, entry(1, 1, Some(100)));
        local.insert(day(), ours);

        let mut remote = AssignmentTable::new();
        let mut theirs = DayAssignments::new();
        theirs.insert(2, entry(1, 1, Some(200)));
        remote.insert(day(), theirs);

        let changed = reconcile(&mut local, &[remote]);
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec![day()]);

        let table = &local[&day()];
        assert_eq!(table[&2].slot(), (1, 1));
        assert_eq!(table[&1].slot(), (1, 2));
        assert!(has_unique_slots(table));
    }

    #[test]
    fn test_reconcile_adopts_unknown_day() {
        let mut local = AssignmentTable::new();
        let other = Day::parse("2024-10-08").unwrap();
        let mut remote = AssignmentTable::new();
        remote.insert(other, DayAssignments::from([(4, entry(2, 1, None))]));

        let changed = reconcile(&mut local, &[remote]);
        assert!(changed.contains(&other));
        assert_eq!(local[&other][&4].slot(), (2, 1));
    }

    #[test]
    fn test_reconcile_many_peers_keeps_uniqueness() {
        let mut local = AssignmentTable::new();
        let mut remotes = Vec::new();
        for peer in 0..4i64 {
            let mut t = DayAssignments::new();
            for cam in 1..=6u32 {
                let slot = ((cam as i64 + peer) % 3) as u8 + 1;
                t.insert(cam + peer as u32, entry(1, slot, Some(peer * 10 + cam as i64)));
            }
            remotes.push(AssignmentTable::from([(day(), t)]));
        }

        reconcile(&mut local, &remotes);
        assert!(has_unique_slots(&local[&day()]));
    }
}
