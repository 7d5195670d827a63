use serde::{Deserialize, Serialize};

use super::coordinator::Coordinator;
use super::node::{ClaimTs, NodeId, Origin};
use super::state::{ArbiterPhase, CameraOwnership};
use super::transport::{ChunkListing, PeerRequest, PeerResponse};
use crate::error::{CamError, CamResult};
use crate::storage::snapshot::write_snapshot;
use crate::storage::{CameraAssignment, CameraId, Day};

impl Coordinator {
    /// Execute one operation of the API surface.
    ///
    /// Writes from `Origin::External` are replicated to every known peer;
    /// writes from a peer never are.
    pub async fn handle(&self, request: PeerRequest, origin: Origin) -> CamResult<PeerResponse> {
        match request {
            PeerRequest::GetRecording => Ok(PeerResponse::Recording(self.recording().get())),
            PeerRequest::PutRecording { recording } => {
                self.recording().set(recording, origin).await?;
                Ok(PeerResponse::Done)
            }
            PeerRequest::GetClaim { camera_id } => Ok(PeerResponse::Claim(self.arbiter().claim(camera_id))),
            PeerRequest::PutClaim { camera_id, claim } => {
                if let Some(srvid) = claim.srvid {
                    self.peers().add_peer(srvid).await;
                }
                self.arbiter().accept_claim(camera_id, claim);
                Ok(PeerResponse::Done)
            }
            PeerRequest::ListDays => Ok(PeerResponse::Days(self.config_store().days())),
            PeerRequest::GetAssignments { day } => {
                Ok(PeerResponse::Assignments(self.config_store().day(day)?))
            }
            PeerRequest::GetAssignment { day, camera_id } => {
                Ok(PeerResponse::Assignment(self.config_store().entry(day, camera_id)?))
            }
            PeerRequest::PostAssignment { day, camera_id, body } => {
                self.config_store().assign(day, camera_id, body, origin).await?;
                Ok(PeerResponse::Done)
            }
            PeerRequest::GetChunks { day, camera_id } => {
                Ok(PeerResponse::Chunks(self.list_chunks(day, camera_id, origin).await?))
            }
            PeerRequest::DeleteChunks { day } => {
                self.delete_day(day, origin).await?;
                Ok(PeerResponse::Done)
            }
            PeerRequest::ListPlayers => Ok(PeerResponse::Players(self.aux_state().players())),
            PeerRequest::GetPlayer { player_id } => {
                Ok(PeerResponse::Player(self.aux_state().player(&player_id)?))
            }
            PeerRequest::PostPlayer { player_id, body } => {
                self.aux_state().register_player(player_id, body, origin).await?;
                Ok(PeerResponse::Done)
            }
            PeerRequest::GetMats { day } => Ok(PeerResponse::Mats(self.aux_state().mats(day)?)),
            PeerRequest::GetMat { day, mat_id } => Ok(PeerResponse::Mat(self.aux_state().mat(day, mat_id)?)),
            PeerRequest::PatchMat { day, mat_id, patch } => {
                self.aux_state().patch_mat(day, mat_id, patch, origin).await?;
                Ok(PeerResponse::Done)
            }
        }
    }

    /// Chunk ids per camera for a day. External callers also get every
    /// peer's listing; past days come from the per-peer cache when possible.
    pub async fn list_chunks(
        &self,
        day: Day,
        camera_id: Option<CameraId>,
        origin: Origin,
    ) -> CamResult<Vec<ChunkListing>> {
        let local_id = self.node_id();
        let (today, mut listing) = {
            let mut tables = self.tables();
            if tables.deleting == Some(day) {
                return Ok(Vec::new());
            }
            if !tables.assignments.contains_key(&day) {
                return Err(CamError::DayNotFound(day.to_string()));
            }

            let layout = self.layout();
            let camera_ids = match camera_id {
                Some(camera_id) => vec![camera_id],
                None => layout.camera_ids(day),
            };
            let listing: Vec<ChunkListing> = camera_ids
                .into_iter()
                .map(|camid| ChunkListing {
                    srvid: local_id,
                    camid,
                    ts: tables.chunks.list(layout, day, camid),
                })
                .collect();
            (tables.today, listing)
        };

        if !origin.is_external() {
            return Ok(listing);
        }

        let plan: Vec<(NodeId, Option<Vec<ChunkListing>>)> = {
            let tables = self.tables();
            tables
                .peers
                .values()
                .filter(|peer| !peer.retry)
                .map(|peer| {
                    let cached: Option<Vec<ChunkListing>> = peer
                        .chunk_cache
                        .get(&day)
                        .filter(|cams| day != today && !cams.is_empty())
                        .filter(|cams| camera_id.map_or(true, |c| cams.contains_key(&c)))
                        .map(|cams| {
                            cams.iter()
                                .filter(|(camid, _)| camera_id.map_or(true, |c| c == **camid))
                                .map(|(camid, ts)| ChunkListing {
                                    srvid: peer.id,
                                    camid: *camid,
                                    ts: ts.clone(),
                                })
                                .collect()
                        });
                    (peer.id, cached)
                })
                .collect()
        };

        let timeout = self.config().call_timeout();
        for (peer_id, cached) in plan {
            if let Some(rows) = cached {
                listing.extend(rows);
                continue;
            }

            let rows = match self
                .replication()
                .call_one(peer_id, PeerRequest::GetChunks { day, camera_id }, timeout)
                .await
                .and_then(|r| r.into_chunks())
            {
                Ok(rows) => rows,
                Err(_) => continue,
            };

            {
                let mut tables = self.tables();
                if let Some(peer) = tables.peers.get_mut(&peer_id) {
                    let cache = peer.chunk_cache.entry(day).or_default();
                    for row in &rows {
                        if row.srvid != peer_id {
                            tracing::warn!(
                                "[CHUNKS] srv{} answered for srv{} cam{:02}",
                                peer_id,
                                row.srvid,
                                row.camid
                            );
                        }
                        cache.insert(row.camid, row.ts.clone());
                    }
                }
            }
            listing.extend(rows);
        }

        Ok(listing)
    }

    /// Remove every recording of a day, here and (for external callers) on
    /// every peer. Deleting today keeps its configuration.
    pub async fn delete_day(&self, day: Day, origin: Origin) -> CamResult<()> {
        let today = {
            let mut tables = self.tables();
            if !tables.assignments.contains_key(&day) {
                return Err(CamError::DayNotFound(day.to_string()));
            }
            tables.deleting = Some(day);

            let today = tables.today;
            if day == today {
                let camera_ids: Vec<CameraId> = tables.ownership.keys().copied().collect();
                for camera_id in camera_ids {
                    tables.stop_capture(camera_id);
                    // block restart until the directory is gone
                    tables.ownership.insert(camera_id, CameraOwnership::blocked());
                }
            } else {
                tables.assignments.remove(&day);
                tables.mats.remove(&day);
            }
            tables.chunks.forget_day(self.layout(), day);
            for peer in tables.peers.values_mut() {
                peer.chunk_cache.remove(&day);
            }
            today
        };

        tracing::info!("[CHUNKS] Deleting {}", day);
        let dir = self.layout().day_dir(day);
        match tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&dir)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Ok(Err(e)) => tracing::warn!("[CHUNKS] Failed to remove {}: {}", day, e),
            Err(e) => tracing::warn!("[CHUNKS] Removal of {} did not finish: {}", day, e),
        }

        let restored = if day == today { self.restore_today() } else { Ok(()) };

        if origin.is_external() {
            let timeout = self.config().delete_timeout();
            self.replication()
                .fan_out_with_timeout(PeerRequest::DeleteChunks { day }, timeout)
                .await;
        }

        self.tables().deleting = None;
        restored
    }

    /// Rewrite today's snapshots and sentinel after its directory was removed.
    fn restore_today(&self) -> CamResult<()> {
        let mut tables = self.tables();
        tables.ownership.clear();

        let today = tables.today;
        let layout = self.layout();
        let assignments = tables.assignments.get(&today).cloned().unwrap_or_default();
        write_snapshot(&layout.assignments_file(today), &assignments, false)?;
        if let Some(mats) = tables.mats.get(&today) {
            write_snapshot(&layout.mats_file(today), mats, false)?;
        }
        write_snapshot(&layout.players_file(today), &tables.players, false)?;

        if tables.recording {
            std::fs::File::create(layout.recording_sentinel(today)).map_err(|e| {
                CamError::PersistError(format!("recording sentinel for {}: {}", today, e))
            })?;
        }
        Ok(())
    }

    pub fn status(&self) -> ClusterStatus {
        let local_id = self.node_id();
        let now = chrono::Utc::now().timestamp();
        let tables = self.tables();
        let today_table = tables.assignments.get(&tables.today);

        ClusterStatus {
            node_id: local_id,
            today: tables.today,
            recording: tables.recording,
            deleting: tables.deleting,
            peers: tables
                .peers
                .values()
                .map(|peer| PeerStatus {
                    node_id: peer.id,
                    retry: peer.retry,
                    joined_secs_ago: now.saturating_sub(peer.joined_at).max(0) as u64,
                })
                .collect(),
            cameras: tables
                .ownership
                .iter()
                .map(|(camera_id, entry)| CameraStatus {
                    camera_id: *camera_id,
                    owner: entry.owner,
                    ts: entry.ts,
                    checker: entry.checker,
                    phase: entry.phase(local_id),
                    pid: entry.process.as_ref().and_then(|p| p.pid()),
                    assignment: today_table.and_then(|t| t.get(camera_id)).copied(),
                })
                .collect(),
            stopping: tables.stopping.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub node_id: NodeId,
    pub today: Day,
    pub recording: bool,
    pub deleting: Option<Day>,
    pub peers: Vec<PeerStatus>,
    pub cameras: Vec<CameraStatus>,
    pub stopping: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerStatus {
    pub node_id: NodeId,
    pub retry: bool,
    pub joined_secs_ago: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatus {
    pub camera_id: CameraId,
    pub owner: Option<NodeId>,
    pub ts: ClaimTs,
    pub checker: u8,
    pub phase: ArbiterPhase,
    pub pid: Option<u32>,
    pub assignment: Option<CameraAssignment>,
}
