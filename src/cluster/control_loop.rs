use tokio::sync::watch;

use super::coordinator::Coordinator;
use super::node::NodeId;
use crate::storage::{CameraId, Day};

/// The background loop that drives liveness and arbitration.
///
/// Each cycle rolls the day over if needed, visits every other node id and
/// then every camera id, pausing one tick between steps.
pub struct CoordinationLoop {
    coordinator: Coordinator,
    shutdown: watch::Receiver<bool>,
}

impl CoordinationLoop {
    pub fn new(coordinator: Coordinator, shutdown: watch::Receiver<bool>) -> Self {
        Self { coordinator, shutdown }
    }

    pub async fn run(mut self) {
        tracing::info!("Coordination loop started for srv{}", self.coordinator.node_id());

        while self.cycle().await {}

        self.coordinator.stop_all_captures();
        tracing::info!("Coordination loop stopped");
    }

    /// One full pass. Returns `false` once shutdown was requested.
    pub async fn cycle(&mut self) -> bool {
        if let Err(e) = self.coordinator.roll_over(Day::today()).await {
            tracing::error!("[DAY] Rollover failed: {}", e);
        }

        let peer_ids: Vec<NodeId> = self.coordinator.config().peer_ids().collect();
        for peer_id in peer_ids {
            self.coordinator.peers().visit(peer_id).await;
            if !self.pause().await {
                return false;
            }
        }

        let camera_ids: Vec<CameraId> = self.coordinator.config().camera_ids().collect();
        for camera_id in camera_ids {
            self.coordinator.arbiter().visit(camera_id).await;
            if !self.pause().await {
                return false;
            }
        }
        true
    }

    async fn pause(&mut self) -> bool {
        self.coordinator.reap_captures();
        if *self.shutdown.borrow() {
            return false;
        }

        let tick = self.coordinator.config().tick();
        tokio::select! {
            _ = tokio::time::sleep(tick) => true,
            _ = self.shutdown.changed() => false,
        }
    }
}
