use std::time::Duration;

use super::coordinator::Coordinator;
use super::node::NodeId;
use super::transport::{PeerError, PeerRequest, PeerResponse};

/// Typed calls to one or all known peers.
///
/// A call the peer failed to answer marks it for retry, which keeps it out
/// of fan-outs until the next liveness check re-handshakes or evicts it.
pub struct ReplicationClient<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> ReplicationClient<'a> {
    pub(crate) fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    pub async fn call_one(
        &self,
        to: NodeId,
        request: PeerRequest,
        timeout: Duration,
    ) -> Result<PeerResponse, PeerError> {
        let path = request.path();
        let result = self.coordinator.transport().call(to, request, timeout).await;
        match &result {
            Err(e) if e.is_peer_failure() => {
                tracing::warn!("[PEER] Call to srv{} failed: {}", to, e);
                self.coordinator.peers().mark_retry(to);
            }
            Err(e) => tracing::info!("[PEER] srv{} rejected {}: {}", to, path, e),
            Ok(_) => {}
        }
        result
    }

    /// Call every known peer in turn. The peer list is a snapshot taken under
    /// the lock; the calls happen outside it.
    pub async fn call_all(
        &self,
        request: PeerRequest,
        timeout: Duration,
    ) -> Vec<(NodeId, Result<PeerResponse, PeerError>)> {
        let peer_ids = self.coordinator.tables().active_peer_ids();

        let mut results = Vec::with_capacity(peer_ids.len());
        for peer_id in peer_ids {
            let result = self.call_one(peer_id, request.clone(), timeout).await;
            results.push((peer_id, result));
        }
        results
    }

    /// Best-effort replication of a locally originated write.
    pub async fn fan_out(&self, request: PeerRequest) {
        self.fan_out_with_timeout(request, self.coordinator.config().call_timeout())
            .await
    }

    pub async fn fan_out_with_timeout(&self, request: PeerRequest, timeout: Duration) {
        let path = request.path();
        let results = self.call_all(request, timeout).await;
        let delivered = results.iter().filter(|(_, r)| r.is_ok()).count();
        tracing::debug!(
            "[REPL] {} delivered to {}/{} peers",
            path,
            delivered,
            results.len()
        );
    }
}
