//! ffprobe-backed media prober
//!
//! Runs ffprobe against a channel's input with a hard timeout. Concurrent
//! probes are bounded by a semaphore so a fleet refresh never launches
//! more than a handful of ffprobe processes at once.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;

use shared::{component_debug, Channel, ComponentId};

use crate::core::probe::{probe_args, probe_url, ProbeReport, ProbeStatus};
use crate::traits::MediaProber;

pub const DEFAULT_PROBE_PROGRAM: &str = "ffprobe";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(12);
pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

pub struct FfprobeMediaProber {
    program: String,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl FfprobeMediaProber {
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROBE_PROGRAM.to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            permits: Arc::new(Semaphore::new(DEFAULT_PROBE_CONCURRENCY)),
        }
    }

    /// Configure probe program path (fluent API)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Configure per-probe timeout (fluent API)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the number of probes allowed to run at once (fluent API)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(concurrency.max(1)));
        self
    }
}

impl Default for FfprobeMediaProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProber for FfprobeMediaProber {
    async fn probe(&self, channel: &Channel) -> ProbeReport {
        let name = channel.channel_name.as_str();
        if !channel.is_running() {
            return ProbeReport::offline(name, "Channel not running");
        }

        let url = probe_url(channel);
        let Ok(_permit) = self.permits.acquire().await else {
            return ProbeReport::failed(name, ProbeStatus::Error, Some(url), "prober shut down");
        };

        component_debug!(ComponentId::current(), "🔍 Probing '{}'", name);
        let run = Command::new(&self.program)
            .args(probe_args(&url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => ProbeReport::failed(name, ProbeStatus::Timeout, Some(url), "Analysis timeout"),
            Ok(Err(e)) => ProbeReport::failed(name, ProbeStatus::Error, Some(url), e.to_string()),
            Ok(Ok(output)) if !output.status.success() => {
                ProbeReport::failed(name, ProbeStatus::Error, Some(url), "Probe failed")
            }
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                ProbeReport::from_ffprobe(name, &url, &stdout).unwrap_or_else(|e| {
                    ProbeReport::failed(name, ProbeStatus::Error, Some(url.clone()), format!("unreadable probe output: {e}"))
                })
            }
        }
    }
}
