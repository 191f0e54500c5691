//! Real process table implementation
//!
//! Spawns relays detached in their own process group with output appended
//! to a per-process log file, and signals them through nix.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use std::fs::OpenOptions;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::core::command::RelayInvocation;
use crate::traits::ProcessTable;
use shared::{component_debug, component_warn, ComponentId};

/// Upper bound on the pattern-matched kill sweep
const DEFAULT_SWEEP_TIMEOUT: Duration = Duration::from_secs(5);

fn to_pid(pid: u32) -> io::Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid} out of range")))
}

/// Process table backed by the operating system
pub struct RealProcessTable {
    sweep_timeout: Duration,
}

impl RealProcessTable {
    pub fn new() -> Self {
        Self {
            sweep_timeout: DEFAULT_SWEEP_TIMEOUT,
        }
    }

    /// Configure the pattern sweep timeout (fluent API)
    pub fn with_sweep_timeout(mut self, sweep_timeout: Duration) -> Self {
        self.sweep_timeout = sweep_timeout;
        self
    }
}

impl Default for RealProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessTable for RealProcessTable {
    async fn spawn(&self, invocation: &RelayInvocation) -> io::Result<u32> {
        if let Some(dir) = invocation.log_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(dir) = invocation.stats_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let log = OpenOptions::new().create(true).append(true).open(&invocation.log_path)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0);

        // The child handle is dropped here; the runtime reaps the process
        // when it exits so a crashed relay does not linger as a zombie.
        let child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "relay exited before its pid was read"))?;

        component_debug!(
            ComponentId::current(),
            "🚀 Spawned {} (PID: {}) logging to {}",
            invocation.program(),
            pid,
            invocation.log_path.display()
        );
        Ok(pid)
    }

    fn exists(&self, pid: u32) -> bool {
        let Ok(pid) = to_pid(pid) else {
            return false;
        };
        match signal::kill(pid, None) {
            Ok(()) => true,
            // Alive but owned by someone else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    async fn kill_group(&self, pid: u32) -> io::Result<()> {
        let pgid = unistd::getpgid(Some(to_pid(pid)?))?;
        signal::killpg(pgid, Signal::SIGTERM)?;
        component_debug!(ComponentId::current(), "🛑 Sent SIGTERM to process group {}", pgid);
        Ok(())
    }

    async fn kill_pid(&self, pid: u32) -> io::Result<()> {
        signal::kill(to_pid(pid)?, Signal::SIGTERM)?;
        component_debug!(ComponentId::current(), "🛑 Sent SIGTERM to PID {}", pid);
        Ok(())
    }

    async fn kill_matching(&self, pattern: &str) -> bool {
        let sweep = Command::new("pkill")
            .arg("-f")
            .arg(pattern)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.sweep_timeout, sweep).await {
            // pkill exits 0 when at least one process matched
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                component_warn!(ComponentId::current(), "⚠️ pkill -f '{}' failed: {}", pattern, e);
                false
            }
            Err(_) => {
                component_warn!(
                    ComponentId::current(),
                    "⚠️ pkill -f '{}' timed out after {:?}",
                    pattern,
                    self.sweep_timeout
                );
                false
            }
        }
    }
}
