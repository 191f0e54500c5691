//! Telemetry and log file access
//!
//! Reads the files relay processes write and shapes them for the request
//! layer. Paths are always derived from the file layout and the channel
//! name, never taken from the stored record.

use chrono::Local;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use shared::{component_debug, Channel, ChannelStatus, ComponentId, Protocol, SrtMode};

use crate::core::layout::FileLayout;
use crate::core::telemetry::{
    connections_from_log, parse_telemetry, FleetSummary, PeerConnection, QuickStats, StatsSeries, TelemetryRead,
    TelemetryRecord, TimeWindow,
};
use crate::error::OrchestratorResult;

/// Default number of trailing log lines returned per process
pub const DEFAULT_LOG_LINES: usize = 100;

/// Windowed telemetry of one channel in the fleet view
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub channel_name: String,
    pub status: ChannelStatus,
    pub stats: Vec<TelemetryRecord>,
    pub latest: Option<TelemetryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllStats {
    pub channels: Vec<ChannelStats>,
    pub summary: FleetSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub process_idx: usize,
    pub text: String,
    pub timestamp: String,
}

/// Output side of one relay process, for labelling its log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub idx: usize,
    pub protocol: Protocol,
    pub mode: SrtMode,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogsView {
    pub logs: Vec<LogLine>,
    pub processes: Vec<ProcessInfo>,
    pub has_multiple_processes: bool,
    pub total_logs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct StatsAggregator {
    layout: FileLayout,
}

impl StatsAggregator {
    pub fn new(layout: FileLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Read one telemetry file; a missing or empty file is not an error
    pub async fn read(&self, path: &Path) -> TelemetryRead {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => parse_telemetry(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => TelemetryRead::Missing,
            Err(e) => TelemetryRead::Failed(e.to_string()),
        }
    }

    /// Telemetry file of the channel's first process
    pub fn primary_stats_path(&self, channel: &Channel) -> OrchestratorResult<PathBuf> {
        let index = FileLayout::process_indices(channel).into_iter().next().flatten();
        Ok(self.layout.stats_path(&channel.channel_name, index)?)
    }

    pub async fn read_primary(&self, channel: &Channel) -> OrchestratorResult<TelemetryRead> {
        let path = self.primary_stats_path(channel)?;
        let read = self.read(&path).await;
        if let TelemetryRead::Failed(reason) = &read {
            component_debug!(
                ComponentId::current(),
                "Telemetry for '{}' unreadable: {}",
                channel.channel_name,
                reason
            );
        }
        Ok(read)
    }

    pub async fn channel_series(&self, channel: &Channel, window: TimeWindow) -> OrchestratorResult<StatsSeries> {
        let read = self.read_primary(channel).await?;
        Ok(StatsSeries::from_read(&read, window))
    }

    /// Latest sample of a running channel
    pub async fn quick_stats(&self, channel: &Channel) -> OrchestratorResult<Option<QuickStats>> {
        if !channel.is_running() {
            return Ok(None);
        }
        let read = self.read_primary(channel).await?;
        Ok(read.latest().map(QuickStats::from))
    }

    /// Windowed series for every channel plus the fleet summary
    pub async fn all_stats(&self, channels: &[Channel], window: TimeWindow) -> OrchestratorResult<AllStats> {
        let mut entries = Vec::with_capacity(channels.len());
        for channel in channels {
            let series = self.channel_series(channel, window).await?;
            entries.push(ChannelStats {
                channel_name: channel.channel_name.clone(),
                status: channel.status,
                latest: series.latest().cloned(),
                message: series.message,
                stats: series.data,
            });
        }
        let summary = FleetSummary::from_latest(entries.iter().filter_map(|entry| entry.latest.as_ref()));
        Ok(AllStats {
            channels: entries,
            summary,
        })
    }

    /// Trailing `lines` of each process log
    ///
    /// `process_idx` narrows a fan-out channel to one destination.
    pub async fn read_logs(
        &self,
        channel: &Channel,
        lines: usize,
        process_idx: Option<usize>,
    ) -> OrchestratorResult<LogsView> {
        let indices: Vec<Option<usize>> = FileLayout::process_indices(channel)
            .into_iter()
            .filter(|index| match (process_idx, index) {
                (Some(wanted), Some(i)) => wanted == *i,
                _ => true,
            })
            .collect();

        let mut view = LogsView::default();
        let mut found = 0;
        for index in indices {
            let path = self.layout.log_path(&channel.channel_name, index)?;
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            found += 1;

            let idx = index.unwrap_or(0);
            let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
            let all: Vec<&str> = text.lines().collect();
            let start = all.len().saturating_sub(lines);
            view.logs.extend(
                all[start..]
                    .iter()
                    .map(|line| line.trim())
                    .filter(|line| !line.is_empty())
                    .map(|line| LogLine {
                        process_idx: idx,
                        text: line.to_string(),
                        timestamp: timestamp.clone(),
                    }),
            );
            view.processes.push(process_info(channel, index));
        }

        if found == 0 {
            view.message = Some("No logs available".to_string());
        }
        view.has_multiple_processes = found > 1;
        view.total_logs = view.logs.len();
        Ok(view)
    }

    /// Peers connected to the channel's first process, per its log
    pub async fn connections(&self, channel: &Channel) -> OrchestratorResult<Vec<PeerConnection>> {
        let index = FileLayout::process_indices(channel).into_iter().next().flatten();
        let path = self.layout.log_path(&channel.channel_name, index)?;
        let local_port = match index.and_then(|i| channel.destinations().get(i)) {
            Some(destination) => destination.port,
            None => channel.output_port,
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(connections_from_log(&text, local_port)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn process_info(channel: &Channel, index: Option<usize>) -> ProcessInfo {
    match index.and_then(|i| channel.destinations().get(i).map(|d| (i, d))) {
        Some((idx, destination)) => ProcessInfo {
            idx,
            protocol: destination.protocol,
            mode: destination.mode,
            host: destination.host.clone(),
            port: destination.port,
        },
        None => ProcessInfo {
            idx: 0,
            protocol: channel.output_protocol,
            mode: channel.mode,
            host: channel.destination_host.clone(),
            port: channel.output_port,
        },
    }
}
