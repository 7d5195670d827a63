use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

use super::arbiter::CameraArbiter;
use super::aux_store::AuxStateStore;
use super::config::ClusterConfig;
use super::config_store::ConfigStore;
use super::health::{PingProber, Prober};
use super::node::NodeId;
use super::peers::PeerRegistry;
use super::recording::RecordingFlag;
use super::replication::ReplicationClient;
use super::state::Tables;
use super::transport::{HttpTransport, PeerTransport};
use crate::capture::{CaptureLauncher, ProcessLauncher};
use crate::error::{CamError, CamResult};
use crate::storage::aux_state::default_mats;
use crate::storage::snapshot::write_snapshot;
use crate::storage::{DataLayout, Day};

/// One node's coordination engine.
///
/// Owns every table behind a single lock and hands out the component views
/// (`peers()`, `arbiter()`, ...) that operate on them. The lock is never held
/// across a peer call.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClusterConfig,
    layout: DataLayout,
    transport: Arc<dyn PeerTransport>,
    prober: Arc<dyn Prober>,
    launcher: Arc<dyn CaptureLauncher>,
    tables: Mutex<Tables>,
}

impl Coordinator {
    pub fn new(
        config: ClusterConfig,
        transport: Arc<dyn PeerTransport>,
        prober: Arc<dyn Prober>,
        launcher: Arc<dyn CaptureLauncher>,
    ) -> Self {
        let layout = DataLayout::new(&config.data_root);
        Self {
            inner: Arc::new(Inner {
                config,
                layout,
                transport,
                prober,
                launcher,
                tables: Mutex::new(Tables::new(Day::today())),
            }),
        }
    }

    /// Production wiring: HTTP peers, `ping` probes, real capture processes.
    pub fn from_config(config: ClusterConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.node_id, config.peer_url_template.clone()));
        let prober = Arc::new(PingProber::new(config.probe_timeout()));
        let launcher = Arc::new(ProcessLauncher::new(config.capture_exec.clone()));
        Self::new(config, transport, prober, launcher)
    }

    /// Read the recording sentinel and today's state, then persist today.
    pub async fn init(&self) -> CamResult<()> {
        {
            let mut tables = self.tables();
            let sentinel = self.layout().recording_sentinel(tables.today);
            tables.recording = sentinel.exists();
            tracing::info!(
                "srv{} starting on {} (recording: {})",
                self.node_id(),
                tables.today,
                tables.recording
            );
        }
        self.config_store().load().await?;
        self.aux_state().load().await?;
        Ok(())
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.config.node_id
    }

    pub fn layout(&self) -> &DataLayout {
        &self.inner.layout
    }

    pub fn today(&self) -> Day {
        self.tables().today
    }

    pub(crate) fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.tables.lock()
    }

    pub(crate) fn transport(&self) -> &dyn PeerTransport {
        self.inner.transport.as_ref()
    }

    pub(crate) fn prober(&self) -> &dyn Prober {
        self.inner.prober.as_ref()
    }

    pub(crate) fn launcher(&self) -> &dyn CaptureLauncher {
        self.inner.launcher.as_ref()
    }

    pub fn peers(&self) -> PeerRegistry<'_> {
        PeerRegistry::new(self)
    }

    pub fn replication(&self) -> ReplicationClient<'_> {
        ReplicationClient::new(self)
    }

    pub fn config_store(&self) -> ConfigStore<'_> {
        ConfigStore::new(self)
    }

    pub fn aux_state(&self) -> AuxStateStore<'_> {
        AuxStateStore::new(self)
    }

    pub fn recording(&self) -> RecordingFlag<'_> {
        RecordingFlag::new(self)
    }

    pub fn arbiter(&self) -> CameraArbiter<'_> {
        CameraArbiter::new(self)
    }

    /// Full reconciliation against every known peer. Failures are logged.
    pub async fn reconcile(&self) {
        if let Err(e) = self.config_store().load().await {
            tracing::error!("[CFG] Reconciliation failed: {}", e);
        }
        if let Err(e) = self.aux_state().load().await {
            tracing::error!("[AUX] Reconciliation failed: {}", e);
        }
    }

    /// Advance "today" when the calendar day changes. Ownership is dropped so
    /// capture restarts into the new day's directory.
    pub async fn roll_over(&self, day: Day) -> CamResult<bool> {
        {
            let mut tables = self.tables();
            if tables.today == day {
                return Ok(false);
            }

            let previous = tables.today;
            tables.stop_all_captures();
            tables.ownership.clear();
            tables.today = day;

            let assignments = tables.assignments.entry(day).or_default().clone();
            let mats = tables.mats.entry(day).or_insert_with(default_mats).clone();
            let layout = self.layout();
            write_snapshot(&layout.assignments_file(day), &assignments, false)?;
            write_snapshot(&layout.mats_file(day), &mats, false)?;
            write_snapshot(&layout.players_file(day), &tables.players, false)?;

            // recording carries over into the new day
            if tables.recording {
                let sentinel = layout.recording_sentinel(day);
                std::fs::File::create(&sentinel).map_err(|e| {
                    CamError::PersistError(format!("{}: {}", sentinel.display(), e))
                })?;
            }
            tracing::info!(
                "[DAY] {} -> {} (recording: {})",
                previous,
                day,
                tables.recording
            );
        }

        self.reconcile().await;
        Ok(true)
    }

    /// Forget capture processes that finished exiting.
    pub fn reap_captures(&self) {
        self.tables().reap_stopping();
    }

    /// Signal every local capture process.
    pub fn stop_all_captures(&self) {
        self.tables().stop_all_captures();
    }
}
