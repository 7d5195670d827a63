//! External capture process management.
//!
//! A capture process records one camera into the day directory. It is owned
//! 1:1 by the camera's ownership entry; stopping is a graceful SIGTERM
//! followed by polling for exit.

use std::path::PathBuf;

use crate::storage::{CameraId, DataLayout};

/// Arguments for one capture run: `<exec> <day dir>/ camNN <mat> <position>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureJob {
    pub day_dir: PathBuf,
    pub camera_id: CameraId,
    pub mat: u8,
    pub position: u8,
}

impl CaptureJob {
    pub fn args(&self) -> Vec<String> {
        let mut day_dir = self.day_dir.to_string_lossy().to_string();
        if !day_dir.ends_with('/') {
            day_dir.push('/');
        }
        vec![
            day_dir,
            DataLayout::camera_dir_name(self.camera_id),
            self.mat.to_string(),
            self.position.to_string(),
        ]
    }
}

/// A running (or exiting) capture process.
pub trait CaptureHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Ask the process to stop. Never kills ungracefully.
    fn request_stop(&mut self);

    /// Non-blocking exit poll.
    fn has_exited(&mut self) -> bool;
}

pub trait CaptureLauncher: Send + Sync {
    fn launch(&self, job: &CaptureJob) -> std::io::Result<Box<dyn CaptureHandle>>;
}

/// Launches the capture executable as a child process.
pub struct ProcessLauncher {
    exec: PathBuf,
}

impl ProcessLauncher {
    pub fn new(exec: impl Into<PathBuf>) -> Self {
        Self { exec: exec.into() }
    }
}

impl CaptureLauncher for ProcessLauncher {
    fn launch(&self, job: &CaptureJob) -> std::io::Result<Box<dyn CaptureHandle>> {
        let child = tokio::process::Command::new(&self.exec)
            .args(job.args())
            .kill_on_drop(false)
            .spawn()?;
        Ok(Box::new(ChildCapture {
            camera_id: job.camera_id,
            child,
        }))
    }
}

struct ChildCapture {
    camera_id: CameraId,
    child: tokio::process::Child,
}

impl CaptureHandle for ChildCapture {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn request_stop(&mut self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: plain signal delivery to our own child; the pid is still ours
            // because the child has not been reaped yet (id() is None after reaping).
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                tracing::warn!(
                    "Failed to signal capture cam{:02} (pid {}): {}",
                    self.camera_id,
                    pid,
                    std::io::Error::last_os_error()
                );
            }
        }
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("Capture cam{:02} exited with {}", self.camera_id, status);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Capture cam{:02} wait failed: {}", self.camera_id, e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_args() {
        let job = CaptureJob {
            day_dir: PathBuf::from("/share/srv2/2024-10-09"),
            camera_id: 7,
            mat: 2,
            position: 3,
        };
        assert_eq!(job.args(), vec!["/share/srv2/2024-10-09/", "cam07", "2", "3"]);
    }
}
