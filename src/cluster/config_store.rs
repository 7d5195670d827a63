use std::collections::BTreeSet;
use std::time::Duration;

use super::coordinator::Coordinator;
use super::node::{NodeId, Origin};
use super::transport::{PeerError, PeerRequest};
use crate::error::{CamError, CamResult};
use crate::storage::assignments::{self, first_free_slot, validate_slot};
use crate::storage::snapshot::{read_snapshot, write_snapshot};
use crate::storage::{AssignmentTable, CameraAssignment, CameraId, Day, DayAssignments};

/// Day-indexed camera → (mat, position) assignments.
pub struct ConfigStore<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> ConfigStore<'a> {
    pub(crate) fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    pub fn days(&self) -> Vec<Day> {
        self.coordinator.tables().assignments.keys().copied().collect()
    }

    pub fn day(&self, day: Day) -> CamResult<DayAssignments> {
        self.coordinator
            .tables()
            .assignments
            .get(&day)
            .cloned()
            .ok_or_else(|| CamError::DayNotFound(day.to_string()))
    }

    pub fn entry(&self, day: Day, camera_id: CameraId) -> CamResult<CameraAssignment> {
        self.day(day)?
            .get(&camera_id)
            .copied()
            .ok_or(CamError::CameraNotFound(camera_id))
    }

    async fn fetch_peer_table(&self, peer_id: NodeId, timeout: Duration) -> Result<AssignmentTable, PeerError> {
        let replication = self.coordinator.replication();
        let days = replication
            .call_one(peer_id, PeerRequest::ListDays, timeout)
            .await?
            .into_days()?;

        let mut table = AssignmentTable::new();
        for day in days {
            let entries = replication
                .call_one(peer_id, PeerRequest::GetAssignments { day }, timeout)
                .await?
                .into_assignments()?;
            table.insert(day, entries);
        }
        Ok(table)
    }

    /// Rebuild the table from local snapshots merged with every known peer.
    ///
    /// Today and every day that changed are persisted before the in-memory
    /// table is replaced. Returns the changed days.
    pub async fn load(&self) -> CamResult<BTreeSet<Day>> {
        let timeout = self.coordinator.config().call_timeout();
        let peer_ids = self.coordinator.tables().active_peer_ids();

        let mut remotes = Vec::with_capacity(peer_ids.len());
        for peer_id in peer_ids {
            match self.fetch_peer_table(peer_id, timeout).await {
                Ok(table) => remotes.push(table),
                Err(e) => tracing::warn!("[CFG] Skipping srv{} during load: {}", peer_id, e),
            }
        }

        let layout = self.coordinator.layout();
        let mut tables = self.coordinator.tables();
        let today = tables.today;

        if let Some(deleting) = tables.deleting.filter(|d| *d != today) {
            for remote in &mut remotes {
                remote.remove(&deleting);
            }
        }

        let mut table = AssignmentTable::new();
        for day in layout.days_with_assignments() {
            let entries: DayAssignments = read_snapshot(&layout.assignments_file(day)).unwrap_or_default();
            table.insert(day, entries);
        }
        table.entry(today).or_default();

        let mut changed = assignments::reconcile(&mut table, &remotes);
        changed.insert(today);

        for day in &changed {
            if let Err(e) = write_snapshot(&layout.assignments_file(*day), &table[day], false) {
                tracing::error!("[CFG] Failed to persist {}: {}", day, e);
                return Err(e);
            }
        }

        tables.assignments = table;
        tracing::debug!("[CFG] Loaded {} days from {} peers", tables.assignments.len(), remotes.len());
        Ok(changed)
    }

    /// Put a camera on a slot for today, swapping with the camera holding it.
    pub async fn assign(
        &self,
        day: Day,
        camera_id: CameraId,
        body: CameraAssignment,
        origin: Origin,
    ) -> CamResult<()> {
        validate_slot(body.mat, body.position)?;
        let max_cameras = self.coordinator.config().max_cameras;
        if camera_id == 0 || camera_id > max_cameras {
            return Err(CamError::BadRequest(format!(
                "camera {} out of range 1..={}",
                camera_id, max_cameras
            )));
        }

        let ts = match origin {
            Origin::Peer(_) => body.ts.unwrap_or_else(now_secs),
            Origin::External => now_secs(),
        };

        {
            let mut tables = self.coordinator.tables();
            if day != tables.today {
                return Err(CamError::BadRequest(format!(
                    "assignments can only change for today ({})",
                    tables.today
                )));
            }

            let before = tables.assignments.get(&day).cloned().unwrap_or_default();
            let mut table = before.clone();
            let displaced =
                assignments::assign(&mut table, camera_id, body.mat, body.position, ts);

            write_snapshot(&self.coordinator.layout().assignments_file(day), &table, true)?;

            for moved in std::iter::once(camera_id).chain(displaced) {
                let old_slot = before.get(&moved).map(CameraAssignment::slot);
                let new_slot = table.get(&moved).map(CameraAssignment::slot);
                if old_slot != new_slot {
                    tables.stop_capture(moved);
                }
            }

            match displaced {
                Some(other) => tracing::info!(
                    "[CFG] cam{:02} -> mat {} position {}, swapped with cam{:02}",
                    camera_id, body.mat, body.position, other
                ),
                None => tracing::info!(
                    "[CFG] cam{:02} -> mat {} position {}",
                    camera_id, body.mat, body.position
                ),
            }
            tables.assignments.insert(day, table);
        }

        if origin.is_external() {
            let body = CameraAssignment::new(body.mat, body.position, Some(ts));
            self.coordinator
                .replication()
                .fan_out(PeerRequest::PostAssignment { day, camera_id, body })
                .await;
        }
        Ok(())
    }

    /// Today's slot for a camera, picking the first free one when it has none.
    /// Returns `None` when the grid is full.
    pub async fn ensure_slot(&self, camera_id: CameraId) -> CamResult<Option<(u8, u8)>> {
        let assigned = self.today_slot(camera_id);
        if assigned.is_some() {
            return Ok(assigned);
        }

        // a reload cannot help while the grid is full
        let full = {
            let tables = self.coordinator.tables();
            tables
                .assignments
                .get(&tables.today)
                .map_or(false, |table| first_free_slot(table, camera_id).is_none())
        };
        if full {
            tracing::debug!("[CFG] Grid full, cam{:02} stays unassigned", camera_id);
            return Ok(None);
        }

        self.load().await?;

        let mut tables = self.coordinator.tables();
        let today = tables.today;
        let mut table = tables.assignments.get(&today).cloned().unwrap_or_default();
        if let Some(current) = table.get(&camera_id).filter(|a| a.is_assigned()) {
            return Ok(Some(current.slot()));
        }

        match first_free_slot(&table, camera_id) {
            Some((mat, position)) => {
                table.insert(camera_id, CameraAssignment::new(mat, position, None));
                write_snapshot(&self.coordinator.layout().assignments_file(today), &table, false)?;
                tables.assignments.insert(today, table);
                tracing::info!(
                    "[CFG] cam{:02} configured on mat {} position {}",
                    camera_id, mat, position
                );
                Ok(Some((mat, position)))
            }
            None => {
                tracing::warn!("[CFG] No free slot for cam{:02}", camera_id);
                Ok(None)
            }
        }
    }

    fn today_slot(&self, camera_id: CameraId) -> Option<(u8, u8)> {
        let tables = self.coordinator.tables();
        tables
            .assignments
            .get(&tables.today)
            .and_then(|day| day.get(&camera_id))
            .filter(|a| a.is_assigned())
            .map(CameraAssignment::slot)
    }
}

pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
