use super::coordinator::Coordinator;
use super::node::Origin;
use super::transport::PeerRequest;
use crate::error::{CamError, CamResult};

/// The cluster-wide recording switch, persisted as the presence of today's
/// `RECORDING` sentinel.
pub struct RecordingFlag<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> RecordingFlag<'a> {
    pub(crate) fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }

    pub fn get(&self) -> bool {
        self.coordinator.tables().recording
    }

    pub async fn set(&self, recording: bool, origin: Origin) -> CamResult<()> {
        self.apply(recording)?;

        if origin.is_external() {
            self.coordinator
                .replication()
                .fan_out(PeerRequest::PutRecording { recording })
                .await;
        }
        Ok(())
    }

    /// Change the flag on this node only. Switching off signals every local
    /// capture right away.
    pub fn apply(&self, recording: bool) -> CamResult<()> {
        let mut tables = self.coordinator.tables();
        let sentinel = self.coordinator.layout().recording_sentinel(tables.today);
        let persist = |e: std::io::Error| {
            CamError::PersistError(format!("{}: {}", sentinel.display(), e))
        };

        if recording {
            if let Some(dir) = sentinel.parent() {
                std::fs::create_dir_all(dir).map_err(persist)?;
            }
            if !sentinel.exists() {
                std::fs::File::create(&sentinel).map_err(persist)?;
            }
        } else {
            match std::fs::remove_file(&sentinel) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(persist(e)),
            }
            tables.stop_all_captures();
        }

        if tables.recording != recording {
            tracing::info!("[REC] Recording {}", if recording { "ON" } else { "OFF" });
        }
        tables.recording = recording;
        Ok(())
    }
}
