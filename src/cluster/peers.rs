use super::coordinator::Coordinator;
use super::node::{NodeId, Peer};
use super::transport::PeerRequest;

/// Which of the fixed node ids are currently reachable peers.
pub struct PeerRegistry<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> PeerRegistry<'a> {
    pub(crate) fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    pub fn is_known(&self, node_id: NodeId) -> bool {
        self.coordinator.tables().peers.contains_key(&node_id)
    }

    pub fn mark_retry(&self, node_id: NodeId) {
        if let Some(peer) = self.coordinator.tables().peers.get_mut(&node_id) {
            peer.retry = true;
        }
    }

    fn is_valid_peer(&self, node_id: NodeId) -> bool {
        let config = self.coordinator.config();
        node_id != config.node_id && (1..=config.max_nodes).contains(&node_id)
    }

    pub async fn probe_reachable(&self, node_id: NodeId) -> bool {
        let host = self.coordinator.config().node_host(node_id);
        self.coordinator.prober().probe(&host).await
    }

    /// Register a peer after a recording-flag handshake.
    ///
    /// No-op for a known peer that is not marked for retry. A disagreement on
    /// the recording flag is settled towards `true`. Handshake failures leave
    /// the peer absent; a join whose flag push failed is evicted again.
    pub async fn add_peer(&self, node_id: NodeId) {
        if !self.is_valid_peer(node_id) {
            return;
        }

        let needs_handshake = {
            let tables = self.coordinator.tables();
            tables.peers.get(&node_id).map_or(true, |p| p.retry)
        };
        if !needs_handshake {
            return;
        }

        let replication = self.coordinator.replication();
        let timeout = self.coordinator.config().call_timeout();

        let remote = match replication
            .call_one(node_id, PeerRequest::GetRecording, timeout)
            .await
            .and_then(|r| r.into_recording())
        {
            Ok(recording) => recording,
            Err(e) => {
                tracing::debug!("[PEER] Handshake with srv{} failed: {}", node_id, e);
                return;
            }
        };

        let local = self.coordinator.recording().get();
        let mut retry = false;
        if remote && !local {
            tracing::info!("[PEER] srv{} is recording, switching recording on", node_id);
            if let Err(e) = self.coordinator.recording().apply(true) {
                tracing::error!("[PEER] Failed to switch recording on: {}", e);
            }
        } else if local && !remote {
            tracing::info!("[PEER] srv{} is idle, switching its recording on", node_id);
            let pushed = replication
                .call_one(node_id, PeerRequest::PutRecording { recording: true }, timeout)
                .await;
            retry = pushed.is_err();
        }

        {
            let mut tables = self.coordinator.tables();
            let peer = tables.peers.entry(node_id).or_insert_with(|| Peer::new(node_id));
            peer.retry = retry;
        }
        tracing::info!("[PEER] ADDING srv{}", node_id);

        self.coordinator.reconcile().await;

        let failed = {
            let tables = self.coordinator.tables();
            tables.peers.get(&node_id).map_or(false, |p| p.retry)
        };
        if failed {
            tracing::warn!("[PEER] srv{} failed to join", node_id);
            self.remove_peer(node_id).await;
        }
    }

    /// Evict a peer together with the cameras it owned, then reconcile.
    pub async fn remove_peer(&self, node_id: NodeId) {
        let removed = {
            let mut tables = self.coordinator.tables();
            let removed = tables.peers.remove(&node_id).is_some();
            tables.ownership.retain(|_, entry| entry.owner != Some(node_id));
            removed
        };

        if removed {
            tracing::info!("[PEER] DELETING srv{}", node_id);
            self.coordinator.reconcile().await;
        }
    }

    /// One liveness step: join if reachable, evict if a known peer stops
    /// answering.
    pub async fn visit(&self, node_id: NodeId) {
        if !self.is_valid_peer(node_id) {
            return;
        }

        if self.probe_reachable(node_id).await {
            self.add_peer(node_id).await;
        }

        if self.is_known(node_id) {
            let timeout = self.coordinator.config().call_timeout();
            let check = self
                .coordinator
                .replication()
                .call_one(node_id, PeerRequest::ListDays, timeout)
                .await;
            if check.is_err() {
                self.remove_peer(node_id).await;
            }
        }
    }
}
