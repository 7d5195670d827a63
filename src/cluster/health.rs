use std::process::Stdio;
use std::time::Duration;

/// Reachability check for nodes and cameras.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str) -> bool;
}

/// ICMP echo through the system `ping` binary (`ping -c 1 -W <secs> <host>`).
pub struct PingProber {
    timeout: Duration,
}

impl PingProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn args(&self, host: &str) -> Vec<String> {
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            format!("{}", self.timeout.as_secs_f64()),
            host.to_string(),
        ]
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait::async_trait]
impl Prober for PingProber {
    async fn probe(&self, host: &str) -> bool {
        let status = tokio::process::Command::new("ping")
            .args(self.args(host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::warn!("Failed to run ping for {}: {}", host, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_args() {
        let prober = PingProber::default();
        assert_eq!(prober.args("cam07"), vec!["-c", "1", "-W", "0.1", "cam07"]);
    }

    #[test]
    fn test_ping_args_custom_timeout() {
        let prober = PingProber::new(Duration::from_secs(2));
        assert_eq!(prober.args("srv3")[3], "2");
    }
}
