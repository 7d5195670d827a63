use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::storage::{CameraId, Day};

/// Identifier for a node in the cluster (`srvN` → N).
pub type NodeId = u8;

/// Ownership-claim timestamp: wall-clock milliseconds × 10 + node id.
pub type ClaimTs = u64;

/// Timestamp reported for a camera nobody claims. Any real claim is lower.
pub const MAX_TS: ClaimTs = 999_999_999_999_999;

/// Wire form of an ownership claim (`{srvid, ts}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub srvid: Option<NodeId>,
    pub ts: ClaimTs,
}

impl Claim {
    pub fn new(srvid: NodeId, ts: ClaimTs) -> Self {
        Self { srvid: Some(srvid), ts }
    }

    pub fn unclaimed() -> Self {
        Self { srvid: None, ts: MAX_TS }
    }
}

/// Fresh claim timestamp for this node.
///
/// The node id sits in the lowest decimal digit so two nodes claiming in the
/// same millisecond still produce distinct values. This assumes single-digit
/// node ids.
pub fn synthesize_claim_ts(node_id: NodeId) -> ClaimTs {
    let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    now_ms * 10 + u64::from(node_id % 10)
}

/// Where an inbound write came from. Only external writes fan out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    External,
    Peer(NodeId),
}

impl Origin {
    pub fn is_external(&self) -> bool {
        matches!(self, Origin::External)
    }
}

/// Chunk ids a peer reported, per day and camera.
pub type PeerChunkCache = HashMap<Day, BTreeMap<CameraId, Vec<String>>>;

/// A reachable peer.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: NodeId,
    /// Set when a call to the peer failed; suppresses fan-out until the next
    /// liveness check re-handshakes or evicts it.
    pub retry: bool,
    pub joined_at: i64,
    pub chunk_cache: PeerChunkCache,
}

impl Peer {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            retry: false,
            joined_at: chrono::Utc::now().timestamp(),
            chunk_cache: HashMap::new(),
        }
    }
}
