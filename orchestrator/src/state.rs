//! Shared runtime state
//!
//! Holds the media probe cache: the latest report per channel, shared by
//! the channel service (reads, forced probes) and the monitor (periodic
//! refresh). The cache survives restarts through a JSON snapshot.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tokio::sync::RwLock;

use shared::{component_debug, component_warn, ComponentId};

use crate::core::probe::ProbeReport;
use crate::error::OrchestratorResult;

pub const DEFAULT_PROBE_CACHE_FILE: &str = "stream_info_cache.json";

pub struct RuntimeState {
    probes: RwLock<BTreeMap<String, ProbeReport>>,
    cache_path: Option<PathBuf>,
}

impl RuntimeState {
    /// State persisted to `cache_path`
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            probes: RwLock::new(BTreeMap::new()),
            cache_path: Some(cache_path.into()),
        }
    }

    /// State that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            probes: RwLock::new(BTreeMap::new()),
            cache_path: None,
        }
    }

    /// Restore the probe cache snapshot; a missing or unreadable snapshot
    /// leaves the cache empty
    pub async fn load(&self) {
        let Some(path) = &self.cache_path else { return };
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(_) => return,
        };
        match serde_json::from_str::<BTreeMap<String, ProbeReport>>(&raw) {
            Ok(snapshot) => {
                component_debug!(
                    ComponentId::current(),
                    "📂 Restored {} probe report(s) from {}",
                    snapshot.len(),
                    path.display()
                );
                *self.probes.write().await = snapshot;
            }
            Err(e) => {
                component_warn!(
                    ComponentId::current(),
                    "⚠️ Ignoring unreadable probe cache {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    /// Write the probe cache snapshot
    pub async fn save(&self) -> OrchestratorResult<()> {
        let Some(path) = &self.cache_path else { return Ok(()) };
        let body = serde_json::to_string_pretty(&*self.probes.read().await)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub async fn probe(&self, channel_name: &str) -> Option<ProbeReport> {
        self.probes.read().await.get(channel_name).cloned()
    }

    pub async fn all_probes(&self) -> BTreeMap<String, ProbeReport> {
        self.probes.read().await.clone()
    }

    pub async fn record_probe(&self, report: ProbeReport) {
        self.probes.write().await.insert(report.channel_name.clone(), report);
    }

    pub async fn forget_probe(&self, channel_name: &str) {
        self.probes.write().await.remove(channel_name);
    }

    /// Flag every cached report whose channel is not running as offline
    pub async fn mark_offline_except(&self, running: &HashSet<String>) {
        let mut probes = self.probes.write().await;
        for (name, report) in probes.iter_mut() {
            if !running.contains(name) {
                report.mark_offline();
            }
        }
    }
}
