use std::collections::BTreeSet;
use std::time::Duration;

use super::config_store::now_secs;
use super::coordinator::Coordinator;
use super::node::{NodeId, Origin};
use super::transport::{PeerError, PeerRequest};
use crate::error::{CamError, CamResult};
use crate::storage::aux_state::{
    apply_patch, default_mats, fill_default_mats, is_valid_mat, reconcile_mats, reconcile_players,
};
use crate::storage::snapshot::{read_snapshot, write_snapshot};
use crate::storage::{DayMats, Mat, MatId, MatPatch, MatTable, Player, PlayerId, PlayerTable};
use crate::storage::{DataLayout, Day};

/// What one peer holds for the last-writer-wins tables.
struct PeerAuxState {
    mats: MatTable,
    players: PlayerTable,
}

/// Mats (bookmarks, medical notes) per day and player registrations.
pub struct AuxStateStore<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> AuxStateStore<'a> {
    pub(crate) fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    /// Mats for a day. A day with assignments but no mats yet reads as empty mats.
    pub fn mats(&self, day: Day) -> CamResult<DayMats> {
        let tables = self.coordinator.tables();
        match tables.mats.get(&day) {
            Some(mats) => Ok(mats.clone()),
            None if tables.assignments.contains_key(&day) => Ok(default_mats()),
            None => Err(CamError::DayNotFound(day.to_string())),
        }
    }

    pub fn mat(&self, day: Day, mat_id: MatId) -> CamResult<Mat> {
        self.mats(day)?
            .get(&mat_id)
            .cloned()
            .ok_or(CamError::MatNotFound(mat_id))
    }

    pub async fn patch_mat(
        &self,
        day: Day,
        mat_id: MatId,
        patch: MatPatch,
        origin: Origin,
    ) -> CamResult<()> {
        if !is_valid_mat(mat_id) {
            return Err(CamError::MatNotFound(mat_id));
        }

        let ts = match origin {
            Origin::Peer(_) => patch.ts.unwrap_or_else(now_secs),
            Origin::External => now_secs(),
        };

        {
            let mut tables = self.coordinator.tables();
            let mut mats = match tables.mats.get(&day) {
                Some(mats) => mats.clone(),
                None if tables.assignments.contains_key(&day) => default_mats(),
                None => return Err(CamError::DayNotFound(day.to_string())),
            };

            apply_patch(mats.entry(mat_id).or_default(), patch.clone(), ts);
            write_snapshot(&self.coordinator.layout().mats_file(day), &mats, false)?;
            tables.mats.insert(day, mats);
            tracing::info!("[AUX] {} mat {} updated", day, mat_id);
        }

        if origin.is_external() {
            let patch = MatPatch { ts: Some(ts), ..patch };
            self.coordinator
                .replication()
                .fan_out(PeerRequest::PatchMat { day, mat_id, patch })
                .await;
        }
        Ok(())
    }

    pub fn players(&self) -> PlayerTable {
        self.coordinator.tables().players.clone()
    }

    pub fn player(&self, player_id: &str) -> CamResult<Player> {
        self.coordinator
            .tables()
            .players
            .get(player_id)
            .copied()
            .ok_or_else(|| CamError::PlayerNotFound(player_id.to_string()))
    }

    pub async fn register_player(
        &self,
        player_id: PlayerId,
        body: Player,
        origin: Origin,
    ) -> CamResult<()> {
        if player_id.is_empty() {
            return Err(CamError::BadRequest("empty player id".to_string()));
        }
        let max_cameras = self.coordinator.config().max_cameras;
        if body.camid > max_cameras {
            return Err(CamError::BadRequest(format!(
                "camera {} out of range 0..={}",
                body.camid, max_cameras
            )));
        }

        let ts = match origin {
            Origin::Peer(_) => body.ts.unwrap_or_else(now_secs),
            Origin::External => now_secs(),
        };
        let player = Player { camid: body.camid, ts: Some(ts) };

        {
            let mut tables = self.coordinator.tables();
            let mut players = tables.players.clone();
            players.insert(player_id.clone(), player);
            write_snapshot(&self.coordinator.layout().players_file(tables.today), &players, false)?;
            tables.players = players;
            tracing::info!("[AUX] Player {} on cam{:02}", player_id, player.camid);
        }

        if origin.is_external() {
            self.coordinator
                .replication()
                .fan_out(PeerRequest::PostPlayer { player_id, body: player })
                .await;
        }
        Ok(())
    }

    async fn fetch_peer_state(&self, peer_id: NodeId, timeout: Duration) -> Result<PeerAuxState, PeerError> {
        let replication = self.coordinator.replication();
        let days = replication
            .call_one(peer_id, PeerRequest::ListDays, timeout)
            .await?
            .into_days()?;

        let mut mats = MatTable::new();
        for day in days {
            let day_mats = replication
                .call_one(peer_id, PeerRequest::GetMats { day }, timeout)
                .await?
                .into_mats()?;
            mats.insert(day, day_mats);
        }

        let players = replication
            .call_one(peer_id, PeerRequest::ListPlayers, timeout)
            .await?
            .into_players()?;

        Ok(PeerAuxState { mats, players })
    }

    /// Rebuild mats and players from local snapshots merged with every known
    /// peer. Returns the days whose mats changed.
    pub async fn load(&self) -> CamResult<BTreeSet<Day>> {
        let timeout = self.coordinator.config().call_timeout();
        let peer_ids = self.coordinator.tables().active_peer_ids();

        let mut remote_mats = Vec::with_capacity(peer_ids.len());
        let mut remote_players = Vec::with_capacity(peer_ids.len());
        for peer_id in peer_ids {
            match self.fetch_peer_state(peer_id, timeout).await {
                Ok(state) => {
                    remote_mats.push(state.mats);
                    remote_players.push(state.players);
                }
                Err(e) => tracing::warn!("[AUX] Skipping srv{} during load: {}", peer_id, e),
            }
        }

        let layout = self.coordinator.layout();
        let mut tables = self.coordinator.tables();
        let today = tables.today;

        let mut days: BTreeSet<Day> = tables.assignments.keys().copied().collect();
        days.insert(today);

        let mut mats = MatTable::new();
        for day in &days {
            let mut day_mats: DayMats = read_snapshot(&layout.mats_file(*day)).unwrap_or_default();
            fill_default_mats(&mut day_mats);
            mats.insert(*day, day_mats);
        }
        let mut players = load_players(layout, today);

        let mut changed = reconcile_mats(&mut mats, &remote_mats);
        for day in &days {
            if !layout.mats_file(*day).exists() {
                changed.insert(*day);
            }
        }
        let players_changed = reconcile_players(&mut players, &remote_players);

        for day in &changed {
            if let Err(e) = write_snapshot(&layout.mats_file(*day), &mats[day], false) {
                tracing::error!("[AUX] Failed to persist mats for {}: {}", day, e);
                return Err(e);
            }
        }
        if players_changed || !layout.players_file(today).exists() {
            if let Err(e) = write_snapshot(&layout.players_file(today), &players, false) {
                tracing::error!("[AUX] Failed to persist players: {}", e);
                return Err(e);
            }
        }

        tables.mats = mats;
        tables.players = players;
        Ok(changed)
    }
}

/// Today's player snapshot, or the most recent earlier one.
fn load_players(layout: &DataLayout, today: Day) -> PlayerTable {
    if let Some(players) = read_snapshot(&layout.players_file(today)) {
        return players;
    }
    layout
        .days_with_assignments()
        .into_iter()
        .rev()
        .filter(|day| *day < today)
        .find_map(|day| read_snapshot(&layout.players_file(day)))
        .unwrap_or_default()
}
