//! Common test utilities for multi-node tests
//!
//! Provides an in-process cluster:
//! - `Mesh`: every node's transport and prober, with network partitions
//! - `FakeLauncher`: records capture launches instead of spawning processes
//! - `TestNode`: a coordinator on a temporary data root

#![allow(dead_code)]

use async_trait::async_trait;
use matcam::capture::{CaptureHandle, CaptureJob, CaptureLauncher};
use matcam::cluster::{
    ClusterConfig, Coordinator, NodeId, Origin, PeerError, PeerRequest, PeerResponse,
    PeerTransport, Prober,
};
use matcam::storage::CameraId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Nodes wired together in memory. Calls go straight into the target's
/// `Coordinator::handle` with the caller as peer origin.
#[derive(Default)]
pub struct Mesh {
    nodes: Mutex<BTreeMap<NodeId, Coordinator>>,
    /// Directed links that drop every call and probe
    cuts: Mutex<HashSet<(NodeId, NodeId)>>,
    /// (node, camera) pairs where the camera answers probes
    cameras: Mutex<HashSet<(NodeId, CameraId)>>,
}

impl Mesh {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn spawn_node(self: &Arc<Self>, id: NodeId) -> TestNode {
        let dir = TempDir::new().expect("Failed to create temp dir");
        self.spawn_node_in(id, dir).await
    }

    /// Start a node on a data root prepared by the test.
    pub async fn spawn_node_in(self: &Arc<Self>, id: NodeId, dir: TempDir) -> TestNode {
        let config = test_config(id, dir.path());
        let link = Arc::new(MeshLink {
            local_id: id,
            mesh: Arc::clone(self),
        });
        let launcher = Arc::new(FakeLauncher::default());
        let coordinator = Coordinator::new(config, link.clone(), link, launcher.clone());
        coordinator.init().await.expect("Failed to initialise node");

        self.nodes.lock().insert(id, coordinator.clone());
        TestNode {
            id,
            coordinator,
            launcher,
            dir,
        }
    }

    /// Cut every link between the two groups, both ways.
    pub fn partition(&self, left: &[NodeId], right: &[NodeId]) {
        let mut cuts = self.cuts.lock();
        for a in left {
            for b in right {
                cuts.insert((*a, *b));
                cuts.insert((*b, *a));
            }
        }
    }

    pub fn heal(&self) {
        self.cuts.lock().clear();
    }

    pub fn connect_camera(&self, node: NodeId, camera_id: CameraId) {
        self.cameras.lock().insert((node, camera_id));
    }

    pub fn disconnect_camera(&self, node: NodeId, camera_id: CameraId) {
        self.cameras.lock().remove(&(node, camera_id));
    }

    fn reachable(&self, from: NodeId, to: NodeId) -> bool {
        self.nodes.lock().contains_key(&to) && !self.cuts.lock().contains(&(from, to))
    }

    fn node(&self, id: NodeId) -> Option<Coordinator> {
        self.nodes.lock().get(&id).cloned()
    }
}

/// One node's view of the mesh.
struct MeshLink {
    local_id: NodeId,
    mesh: Arc<Mesh>,
}

#[async_trait]
impl PeerTransport for MeshLink {
    async fn call(
        &self,
        to: NodeId,
        request: PeerRequest,
        _timeout: Duration,
    ) -> Result<PeerResponse, PeerError> {
        if !self.mesh.reachable(self.local_id, to) {
            return Err(PeerError::Unreachable(to, "partitioned".to_string()));
        }
        let node = self
            .mesh
            .node(to)
            .ok_or_else(|| PeerError::Unreachable(to, "no such node".to_string()))?;

        node.handle(request, Origin::Peer(self.local_id))
            .await
            .map_err(|e| PeerError::Status(to, e.status().as_u16()))
    }
}

#[async_trait]
impl Prober for MeshLink {
    async fn probe(&self, host: &str) -> bool {
        if let Some(id) = host.strip_prefix("srv").and_then(|s| s.parse::<NodeId>().ok()) {
            return self.mesh.reachable(self.local_id, id);
        }
        if let Some(id) = host.strip_prefix("cam").and_then(|s| s.parse::<CameraId>().ok()) {
            return self.mesh.cameras.lock().contains(&(self.local_id, id));
        }
        false
    }
}

/// A capture "process" that exits as soon as it is asked to stop.
struct FakeCapture {
    pid: u32,
    stopped: Arc<AtomicBool>,
}

impl CaptureHandle for FakeCapture {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn request_stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn has_exited(&mut self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    launched: Mutex<Vec<(CaptureJob, Arc<AtomicBool>)>>,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    /// Every job launched for the camera, oldest first.
    pub fn jobs(&self, camera_id: CameraId) -> Vec<CaptureJob> {
        self.launched
            .lock()
            .iter()
            .filter(|(job, _)| job.camera_id == camera_id)
            .map(|(job, _)| job.clone())
            .collect()
    }

    /// Launched captures for the camera that were not asked to stop.
    pub fn running(&self, camera_id: CameraId) -> usize {
        self.launched
            .lock()
            .iter()
            .filter(|(job, stopped)| job.camera_id == camera_id && !stopped.load(Ordering::SeqCst))
            .count()
    }
}

impl CaptureLauncher for FakeLauncher {
    fn launch(&self, job: &CaptureJob) -> std::io::Result<Box<dyn CaptureHandle>> {
        let stopped = Arc::new(AtomicBool::new(false));
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.launched.lock().push((job.clone(), stopped.clone()));
        Ok(Box::new(FakeCapture { pid, stopped }))
    }
}

pub struct TestNode {
    pub id: NodeId,
    pub coordinator: Coordinator,
    pub launcher: Arc<FakeLauncher>,
    pub dir: TempDir,
}

impl TestNode {
    /// Run the camera step `n` times, reaping stopped captures in between
    /// the way the coordination loop does.
    pub async fn visit_camera(&self, camera_id: CameraId, n: usize) {
        for _ in 0..n {
            self.coordinator.arbiter().visit(camera_id).await;
            self.coordinator.reap_captures();
        }
    }
}

pub fn test_config(id: NodeId, root: &Path) -> ClusterConfig {
    ClusterConfig {
        node_id: id,
        hostname: format!("srv{}", id),
        data_root: root.to_path_buf(),
        max_nodes: 3,
        max_cameras: 16,
        tick_ms: 1,
        ..Default::default()
    }
}

/// Every node visits every other node once, in id order.
pub async fn join_all(nodes: &[&TestNode]) {
    for a in nodes {
        for b in nodes {
            if a.id != b.id {
                a.coordinator.peers().visit(b.id).await;
            }
        }
    }
}

/// Write a day directory the way a previous run would have left it.
pub fn seed_day(root: &Path, day: &str, assignments: serde_json::Value, chunks: &[(CameraId, &str)]) {
    let dir = root.join(day);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("cam.cfg"), assignments.to_string()).unwrap();
    for (camera_id, name) in chunks {
        let cam_dir = dir.join(format!("cam{:02}", camera_id));
        std::fs::create_dir_all(&cam_dir).unwrap();
        std::fs::write(cam_dir.join(name), b"").unwrap();
    }
}
