pub mod capture;
pub mod cluster;
pub mod error;
pub mod server;
pub mod storage;

pub use cluster::{ClusterConfig, CoordinationLoop, Coordinator};
pub use error::{CamError, CamResult};
pub use server::create_router;
pub use storage::{CameraAssignment, CameraId, Day, DataLayout, Mat, MatId, Player, PlayerId};
