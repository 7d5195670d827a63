pub mod cams;
pub mod chunks;
pub mod mats;
pub mod players;
pub mod recording;
pub mod system;

pub use cams::*;
pub use chunks::*;
pub use mats::*;
pub use players::*;
pub use recording::*;
pub use system::*;
