pub mod arbiter;
pub mod aux_store;
pub mod config;
pub mod config_store;
pub mod control_loop;
pub mod coordinator;
pub mod health;
pub mod node;
pub mod peers;
pub mod recording;
pub mod replication;
pub mod service;
pub mod state;
pub mod transport;

pub use arbiter::CameraArbiter;
pub use aux_store::AuxStateStore;
pub use config::ClusterConfig;
pub use config_store::ConfigStore;
pub use control_loop::CoordinationLoop;
pub use coordinator::Coordinator;
pub use health::{PingProber, Prober};
pub use node::{Claim, ClaimTs, NodeId, Origin, MAX_TS};
pub use peers::PeerRegistry;
pub use recording::RecordingFlag;
pub use replication::ReplicationClient;
pub use service::{CameraStatus, ClusterStatus, PeerStatus};
pub use state::ArbiterPhase;
pub use transport::{
    ChunkListing, HttpTransport, PeerError, PeerRequest, PeerResponse, PeerTransport,
    PEER_ORIGIN_HEADER,
};
