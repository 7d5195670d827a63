pub mod assignments;
pub mod aux_state;
pub mod chunks;
pub mod day;
pub mod layout;
pub mod snapshot;

pub use assignments::{AssignmentTable, CameraAssignment, CameraId, DayAssignments, MAX_MAT, MAX_POS};
pub use aux_state::{DayMats, Mat, MatId, MatPatch, MatTable, Player, PlayerId, PlayerTable};
pub use chunks::ChunkIndex;
pub use day::Day;
pub use layout::DataLayout;
