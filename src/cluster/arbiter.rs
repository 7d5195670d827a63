use super::coordinator::Coordinator;
use super::node::{synthesize_claim_ts, Claim, ClaimTs};
use super::state::{ArbiterPhase, CameraOwnership};
use super::transport::PeerRequest;
use crate::capture::CaptureJob;
use crate::storage::CameraId;

/// Per-camera leader arbitration and capture control.
///
/// Lowest claim timestamp wins. A fresh self-claim must survive
/// `probation_ticks` re-verifications against every peer before the capture
/// process may start.
pub struct CameraArbiter<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> CameraArbiter<'a> {
    pub(crate) fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    pub fn claim(&self, camera_id: CameraId) -> Claim {
        self.coordinator.tables().claim_of(camera_id)
    }

    pub fn phase(&self, camera_id: CameraId) -> Option<ArbiterPhase> {
        let local_id = self.coordinator.node_id();
        self.coordinator
            .tables()
            .ownership
            .get(&camera_id)
            .map(|entry| entry.phase(local_id))
    }

    /// Apply a claim received from a peer. It replaces the local entry only
    /// when its timestamp is strictly lower; a capture running under the old
    /// claim is stopped. Returns whether the claim was taken.
    pub fn accept_claim(&self, camera_id: CameraId, claim: Claim) -> bool {
        let Some(owner) = claim.srvid else {
            return false;
        };

        let mut tables = self.coordinator.tables();
        let current = tables.ownership.get(&camera_id).map(|entry| entry.ts);
        if current.map_or(false, |ts| claim.ts >= ts) {
            return false;
        }

        tables.stop_capture(camera_id);
        tables
            .ownership
            .insert(camera_id, CameraOwnership::adopted(owner, claim.ts));
        tracing::info!("[ARB] Winner put srv{} cam{:02} (ts {})", owner, camera_id, claim.ts);
        true
    }

    /// One arbitration step for a camera: probe, discover or validate the
    /// owner, make sure it has a slot, then start or stop capture.
    pub async fn visit(&self, camera_id: CameraId) {
        let host = self.coordinator.config().camera_host(camera_id);
        if !self.coordinator.prober().probe(&host).await {
            let mut tables = self.coordinator.tables();
            if tables.drop_ownership(camera_id).is_some() {
                tracing::info!("[CAM] DELETE cam{:02}", camera_id);
            }
            return;
        }

        let known = self.coordinator.tables().ownership.contains_key(&camera_id);
        if !known {
            self.discover(camera_id).await;
        }

        self.validate(camera_id).await;

        match self.coordinator.config_store().ensure_slot(camera_id).await {
            Ok(slot) => self.drive_capture(camera_id, slot),
            Err(e) => tracing::error!("[CAM] No configuration for cam{:02}: {}", camera_id, e),
        }
    }

    /// Adopt the lowest claim any peer reports, or claim the camera ourselves.
    async fn discover(&self, camera_id: CameraId) {
        tracing::info!("[CAM] ADD cam{:02}", camera_id);
        let replication = self.coordinator.replication();
        let timeout = self.coordinator.config().call_timeout();

        let winner = replication
            .call_all(PeerRequest::GetClaim { camera_id }, timeout)
            .await
            .into_iter()
            .filter_map(|(_, result)| result.and_then(|r| r.into_claim()).ok())
            .filter(|claim| claim.srvid.is_some())
            .min_by_key(|claim| claim.ts);

        if let Some(claim) = winner {
            self.accept_claim(camera_id, claim);
            return;
        }

        let local_id = self.coordinator.node_id();
        let ts = synthesize_claim_ts(local_id);
        let claimed = {
            let mut tables = self.coordinator.tables();
            if tables.ownership.contains_key(&camera_id) {
                false
            } else {
                let probation = self.coordinator.config().probation_ticks;
                tables
                    .ownership
                    .insert(camera_id, CameraOwnership::local(local_id, ts, probation));
                true
            }
        };

        if claimed {
            tracing::info!("[ARB] srv{} claims cam{:02} (ts {})", local_id, camera_id, ts);
            replication
                .call_all(
                    PeerRequest::PutClaim { camera_id, claim: Claim::new(local_id, ts) },
                    timeout,
                )
                .await;
        }
    }

    /// Probation step for a local claim; remote owners skip probation.
    async fn validate(&self, camera_id: CameraId) {
        let local_id = self.coordinator.node_id();
        let entry = {
            let mut tables = self.coordinator.tables();
            match tables.ownership.get_mut(&camera_id) {
                Some(entry) if entry.checker > 0 => {
                    if entry.owner != Some(local_id) {
                        entry.checker = 0;
                        tracing::info!(
                            "[ARB] Arbitration remote winner srv{:?} cam{:02}",
                            entry.owner,
                            camera_id
                        );
                        None
                    } else {
                        entry.checker -= 1;
                        Some((entry.ts, entry.checker))
                    }
                }
                _ => None,
            }
        };
        let Some((ts, checker)) = entry else {
            return;
        };

        let replication = self.coordinator.replication();
        let timeout = self.coordinator.config().call_timeout();
        let ours = Claim::new(local_id, ts);
        let peer_ids = self.coordinator.tables().active_peer_ids();

        for peer_id in peer_ids {
            let theirs = match replication
                .call_one(peer_id, PeerRequest::GetClaim { camera_id }, timeout)
                .await
                .and_then(|r| r.into_claim())
            {
                Ok(claim) => claim,
                Err(_) => continue,
            };

            match theirs.srvid {
                Some(other) if other != local_id && theirs.ts <= ts => {
                    tracing::warn!(
                        "[ARB] Arbitration collision on srv{}: cam{:02} is srv{}",
                        peer_id,
                        camera_id,
                        other
                    );
                    self.abdicate(camera_id, ts);
                    return;
                }
                Some(other) if other == local_id && theirs.ts == ts => {}
                _ => {
                    // the peer has no view or holds a later claim; ours wins there
                    let _ = replication
                        .call_one(peer_id, PeerRequest::PutClaim { camera_id, claim: ours }, timeout)
                        .await;
                }
            }
        }

        if checker == 0 {
            tracing::info!("[ARB] Arbitration winner srv{} cam{:02}", local_id, camera_id);
        }
    }

    fn abdicate(&self, camera_id: CameraId, ts: ClaimTs) {
        let local_id = self.coordinator.node_id();
        let mut tables = self.coordinator.tables();
        let still_ours = tables
            .ownership
            .get(&camera_id)
            .map_or(false, |entry| entry.owner == Some(local_id) && entry.ts == ts);
        if still_ours {
            tables.drop_ownership(camera_id);
        }
    }

    /// Start capture for a stable local claim while recording; stop it
    /// otherwise.
    fn drive_capture(&self, camera_id: CameraId, slot: Option<(u8, u8)>) {
        let local_id = self.coordinator.node_id();
        let mut tables = self.coordinator.tables();

        if !tables.recording {
            let running = tables
                .ownership
                .get(&camera_id)
                .map_or(false, |entry| entry.process.is_some());
            if running {
                tables.stop_capture(camera_id);
            }
            return;
        }

        let today = tables.today;
        if tables.deleting == Some(today) || tables.is_stopping(camera_id) {
            return;
        }

        let Some(entry) = tables.ownership.get_mut(&camera_id) else {
            return;
        };
        if entry.owner != Some(local_id) || entry.checker > 0 {
            return;
        }
        let running = match entry.process.as_mut() {
            Some(process) => !process.has_exited(),
            None => false,
        };
        if running {
            return;
        }

        let Some((mat, position)) = slot else {
            return;
        };
        let job = CaptureJob {
            day_dir: self.coordinator.layout().day_dir(today),
            camera_id,
            mat,
            position,
        };
        match self.coordinator.launcher().launch(&job) {
            Ok(process) => {
                tracing::info!(
                    "[CAM] START cam{:02} mat {} position {} (pid {:?})",
                    camera_id,
                    mat,
                    position,
                    process.pid()
                );
                entry.process = Some(process);
            }
            Err(e) => tracing::error!("[CAM] Failed to start capture for cam{:02}: {}", camera_id, e),
        }
    }
}
