use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::node::NodeId;
use crate::storage::CameraId;

/// Configuration for a cluster node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// This node's id (last digit of `srvN`)
    pub node_id: NodeId,

    /// Hostname the share directory is named after
    pub hostname: String,

    /// Root of this node's share (`/share/<hostname>`)
    pub data_root: PathBuf,

    /// Port the HTTP API listens on
    pub listen_port: u16,

    /// Base URL of a peer's API; `{id}` is replaced by the node id
    pub peer_url_template: String,

    /// Liveness probe host names: `<prefix><id>` for nodes, `<prefix><id:02>` for cameras
    pub node_host_prefix: String,
    pub camera_host_prefix: String,

    /// Capture executable started per owned camera
    pub capture_exec: PathBuf,

    /// Node ids 1..=max_nodes form the cluster
    pub max_nodes: NodeId,

    /// Camera ids 1..=max_cameras are probed
    pub max_cameras: CameraId,

    /// Re-verification ticks a fresh self-claim must survive
    pub probation_ticks: u8,

    pub tick_ms: u64,
    pub call_timeout_ms: u64,
    pub delete_timeout_ms: u64,
    pub probe_timeout_ms: u64,
}

impl ClusterConfig {
    /// Create a configuration for this host. The node id defaults to the last
    /// digit of the hostname.
    pub fn new(node_id: Option<NodeId>, data_root: Option<PathBuf>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let node_id = node_id.or_else(|| node_id_from_hostname(&hostname)).unwrap_or_else(|| {
            tracing::warn!("Hostname '{}' carries no node digit, using node id 0", hostname);
            0
        });

        let data_root = data_root.unwrap_or_else(|| PathBuf::from("/share").join(&hostname));

        Self {
            node_id,
            hostname,
            data_root,
            ..Default::default()
        }
    }

    /// Load a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClusterConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn node_host(&self, node_id: NodeId) -> String {
        format!("{}{}", self.node_host_prefix, node_id)
    }

    pub fn camera_host(&self, camera_id: CameraId) -> String {
        format!("{}{:02}", self.camera_host_prefix, camera_id)
    }

    /// Peer ids other than ourselves.
    pub fn peer_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (1..=self.max_nodes).filter(move |id| *id != self.node_id)
    }

    pub fn camera_ids(&self) -> impl Iterator<Item = CameraId> {
        1..=self.max_cameras
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_millis(self.delete_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.listen_port)
    }
}

/// `srv3` → 3
pub fn node_id_from_hostname(hostname: &str) -> Option<NodeId> {
    let short = hostname.split('.').next().unwrap_or(hostname);
    short
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as NodeId)
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            hostname: "localhost".to_string(),
            data_root: PathBuf::from("/share/localhost"),
            listen_port: 5000,
            peer_url_template: "http://srv{id}:5000/api/v1".to_string(),
            node_host_prefix: "srv".to_string(),
            camera_host_prefix: "cam".to_string(),
            capture_exec: PathBuf::from("/root/jc-cam"),
            max_nodes: 8,
            max_cameras: 32,
            probation_ticks: 3,
            tick_ms: 100,
            call_timeout_ms: 1_000,
            delete_timeout_ms: 90_000,
            probe_timeout_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_from_hostname() {
        assert_eq!(node_id_from_hostname("srv3"), Some(3));
        assert_eq!(node_id_from_hostname("srv7.arena.local"), Some(7));
        assert_eq!(node_id_from_hostname("laptop"), None);
    }

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.max_nodes, 8);
        assert_eq!(config.max_cameras, 32);
        assert_eq!(config.probation_ticks, 3);
        assert_eq!(config.tick(), Duration::from_millis(100));
        assert_eq!(config.call_timeout(), Duration::from_secs(1));
        assert_eq!(config.delete_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_hosts_and_urls() {
        let config = ClusterConfig { node_id: 2, ..Default::default() };
        assert_eq!(config.node_host(5), "srv5");
        assert_eq!(config.camera_host(7), "cam07");
        assert_eq!(config.peer_ids().collect::<Vec<_>>(), vec![1, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_new_with_explicit_values() {
        let config = ClusterConfig::new(Some(4), Some(PathBuf::from("/tmp/share")));
        assert_eq!(config.node_id, 4);
        assert_eq!(config.data_root, PathBuf::from("/tmp/share"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClusterConfig = toml::from_str("node_id = 6\ntick_ms = 50\n").unwrap();
        assert_eq!(config.node_id, 6);
        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.max_cameras, 32);
    }
}
