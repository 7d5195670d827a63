use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::node::{Claim, ClaimTs, NodeId, Peer, MAX_TS};
use crate::capture::CaptureHandle;
use crate::storage::{AssignmentTable, CameraId, ChunkIndex, Day, MatTable, PlayerTable};

/// Where a camera stands in arbitration, as seen from this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterPhase {
    /// Placeholder entry while today's data is being deleted
    Blocked,
    ClaimedRemote,
    ClaimedLocalProbation,
    ClaimedLocalStable,
}

/// Live ownership of a reachable camera. Never persisted.
pub struct CameraOwnership {
    pub owner: Option<NodeId>,
    pub ts: ClaimTs,
    /// Probation ticks left before a local claim may record
    pub checker: u8,
    pub process: Option<Box<dyn CaptureHandle>>,
}

impl CameraOwnership {
    pub fn adopted(owner: NodeId, ts: ClaimTs) -> Self {
        Self {
            owner: Some(owner),
            ts,
            checker: 0,
            process: None,
        }
    }

    pub fn local(owner: NodeId, ts: ClaimTs, checker: u8) -> Self {
        Self {
            owner: Some(owner),
            ts,
            checker,
            process: None,
        }
    }

    pub fn blocked() -> Self {
        Self {
            owner: None,
            ts: MAX_TS,
            checker: 0,
            process: None,
        }
    }

    pub fn claim(&self) -> Claim {
        Claim {
            srvid: self.owner,
            ts: self.ts,
        }
    }

    pub fn phase(&self, local_id: NodeId) -> ArbiterPhase {
        match self.owner {
            None => ArbiterPhase::Blocked,
            Some(owner) if owner != local_id => ArbiterPhase::ClaimedRemote,
            Some(_) if self.checker > 0 => ArbiterPhase::ClaimedLocalProbation,
            Some(_) => ArbiterPhase::ClaimedLocalStable,
        }
    }
}

impl std::fmt::Debug for CameraOwnership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraOwnership")
            .field("owner", &self.owner)
            .field("ts", &self.ts)
            .field("checker", &self.checker)
            .field("pid", &self.process.as_ref().and_then(|p| p.pid()))
            .finish()
    }
}

/// Every mutable table of a node. Lives behind the coordinator's single lock.
pub struct Tables {
    pub today: Day,
    pub recording: bool,
    /// Day whose data is currently being removed
    pub deleting: Option<Day>,
    pub peers: BTreeMap<NodeId, Peer>,
    pub assignments: AssignmentTable,
    pub mats: MatTable,
    pub players: PlayerTable,
    pub ownership: BTreeMap<CameraId, CameraOwnership>,
    /// Capture processes asked to stop that have not exited yet
    pub stopping: Vec<(CameraId, Box<dyn CaptureHandle>)>,
    pub chunks: ChunkIndex,
}

impl Tables {
    pub fn new(today: Day) -> Self {
        Self {
            today,
            recording: false,
            deleting: None,
            peers: BTreeMap::new(),
            assignments: AssignmentTable::new(),
            mats: MatTable::new(),
            players: PlayerTable::new(),
            ownership: BTreeMap::new(),
            stopping: Vec::new(),
            chunks: ChunkIndex::new(),
        }
    }

    pub fn claim_of(&self, camera_id: CameraId) -> Claim {
        self.ownership
            .get(&camera_id)
            .map(CameraOwnership::claim)
            .unwrap_or_else(Claim::unclaimed)
    }

    /// Known peers that are not waiting for a re-handshake.
    pub fn active_peer_ids(&self) -> Vec<NodeId> {
        self.peers
            .values()
            .filter(|p| !p.retry)
            .map(|p| p.id)
            .collect()
    }

    pub fn is_stopping(&self, camera_id: CameraId) -> bool {
        self.stopping.iter().any(|(id, _)| *id == camera_id)
    }

    /// Signal the camera's capture process, if any, and park it until it exits.
    pub fn stop_capture(&mut self, camera_id: CameraId) {
        let process = self
            .ownership
            .get_mut(&camera_id)
            .and_then(|entry| entry.process.take());
        if let Some(mut process) = process {
            tracing::info!("[CAM] STOP cam{:02} (pid {:?})", camera_id, process.pid());
            process.request_stop();
            self.stopping.push((camera_id, process));
        }
    }

    /// Forget the camera's ownership, stopping its capture first.
    pub fn drop_ownership(&mut self, camera_id: CameraId) -> Option<CameraOwnership> {
        self.stop_capture(camera_id);
        self.ownership.remove(&camera_id)
    }

    pub fn stop_all_captures(&mut self) {
        let ids: Vec<CameraId> = self.ownership.keys().copied().collect();
        for camera_id in ids {
            self.stop_capture(camera_id);
        }
    }

    /// Drop handles whose process has exited.
    pub fn reap_stopping(&mut self) {
        self.stopping.retain_mut(|(camera_id, process)| {
            if process.has_exited() {
                tracing::debug!("[CAM] cam{:02} capture exited", camera_id);
                false
            } else {
                true
            }
        });
    }
}
