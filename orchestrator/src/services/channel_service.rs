//! Channel service
//!
//! The operations the request layer calls. Every mutation runs under one
//! async mutex: load the channel list, change it through the supervisor,
//! persist it, announce it on the event bus.

use chrono::Local;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use shared::{component_info, Channel, ChannelStatus, ChannelUpdate, ComponentId, Destination, Protocol, SrtMode};

use crate::core::probe::{AudioTrack, ProbeReport, VideoTrack};
use crate::core::telemetry::{AnalyticsTotals, PeerConnection, QuickStats, StatsSeries, TimeWindow};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::aggregator::{AllStats, LogsView, StatsAggregator};
use crate::services::supervisor::Supervisor;
use crate::state::RuntimeState;
use crate::traits::{ChannelStore, MediaProber, ProcessTable};

const EVENT_CAPACITY: usize = 64;

/// Change notifications for subscribers such as a WebSocket layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    ChannelCreated(Channel),
    ChannelUpdated(Channel),
    ChannelDeleted { channel_name: String },
    ChannelStarted(Channel),
    ChannelStopped(Channel),
}

impl ChannelEvent {
    pub fn channel_name(&self) -> &str {
        match self {
            Self::ChannelCreated(c) | Self::ChannelUpdated(c) | Self::ChannelStarted(c) | Self::ChannelStopped(c) => {
                &c.channel_name
            }
            Self::ChannelDeleted { channel_name } => channel_name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InputInfo {
    pub protocol: Protocol,
    pub ip: String,
    pub port: u16,
    pub mode: SrtMode,
    pub latency: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputInfo {
    pub protocol: Protocol,
    pub port: u16,
    pub mode: SrtMode,
    pub latency: u32,
    pub destinations: Vec<Destination>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub format: Option<String>,
    pub total_bitrate_mbps: Option<f64>,
    pub resolution: Option<String>,
    pub video_streams: Vec<VideoTrack>,
    pub audio_streams: Vec<AudioTrack>,
}

impl MediaInfo {
    fn from_report(report: &ProbeReport) -> Option<Self> {
        report.success.then(|| Self {
            format: report.format.clone(),
            total_bitrate_mbps: report.total_bitrate_mbps,
            resolution: report.resolution().map(str::to_string),
            video_streams: report.video_streams.clone(),
            audio_streams: report.audio_streams.clone(),
        })
    }
}

/// Configuration, process and live state of one channel
#[derive(Debug, Clone, Serialize)]
pub struct FullInfo {
    pub channel_name: String,
    pub status: ChannelStatus,
    pub pid: Option<u32>,
    pub pids: Option<Vec<u32>>,
    pub start_date: String,
    pub timestamp: String,
    pub input: InputInfo,
    pub output: OutputInfo,
    pub srt_stats: Option<QuickStats>,
    pub media_info: Option<MediaInfo>,
    pub connections: Vec<PeerConnection>,
}

/// Per-channel row of the analytics summary
#[derive(Debug, Clone, Serialize)]
pub struct ChannelOverview {
    pub name: String,
    pub status: ChannelStatus,
    pub pid: Option<u32>,
    pub pids: Option<Vec<u32>>,
    pub start_date: String,
    pub srt_stats: Option<QuickStats>,
    pub packets_lost: u64,
    pub media_info: Option<MediaInfo>,
    pub connections: Vec<PeerConnection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    #[serde(flatten)]
    pub totals: AnalyticsTotals,
    pub channels: Vec<ChannelOverview>,
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Start,
    Stop,
    Restart,
}

fn position(channels: &[Channel], name: &str) -> OrchestratorResult<usize> {
    channels
        .iter()
        .position(|c| c.channel_name == name)
        .ok_or_else(|| OrchestratorError::not_found(name))
}

pub struct ChannelService<P, S, M>
where
    P: ProcessTable + 'static,
    S: ChannelStore + 'static,
    M: MediaProber + 'static,
{
    store: S,
    supervisor: Supervisor<P>,
    aggregator: StatsAggregator,
    prober: M,
    state: Arc<RuntimeState>,
    mutations: Mutex<()>,
    events: broadcast::Sender<ChannelEvent>,
}

impl<P, S, M> ChannelService<P, S, M>
where
    P: ProcessTable + 'static,
    S: ChannelStore + 'static,
    M: MediaProber + 'static,
{
    pub fn new(store: S, supervisor: Supervisor<P>, prober: M, state: Arc<RuntimeState>) -> Self {
        let aggregator = StatsAggregator::new(supervisor.builder().layout().clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            supervisor,
            aggregator,
            prober,
            state,
            mutations: Mutex::new(()),
            events,
        }
    }

    pub fn state(&self) -> &Arc<RuntimeState> {
        &self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ChannelEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Startup pass: restore the probe cache and settle every channel's
    /// status against the live process table
    pub async fn initialize(&self) -> OrchestratorResult<usize> {
        self.state.load().await;
        let _guard = self.mutations.lock().await;
        let mut channels = self.store.load().await?;
        let changed = channels
            .iter_mut()
            .map(|channel| self.supervisor.reconcile_startup(channel))
            .filter(|changed| *changed)
            .count();
        if changed > 0 {
            self.store.save(&channels).await?;
        }
        component_info!(
            ComponentId::current(),
            "🔄 Startup reconciliation: {} channel(s), {} corrected",
            channels.len(),
            changed
        );
        Ok(changed)
    }

    /// Reconcile every channel; returns the number corrected
    pub async fn reconcile_all(&self) -> OrchestratorResult<usize> {
        let _guard = self.mutations.lock().await;
        let (_, changed) = self.load_reconciled().await?;
        Ok(changed)
    }

    async fn load_reconciled(&self) -> OrchestratorResult<(Vec<Channel>, usize)> {
        let mut channels = self.store.load().await?;
        let mut stopped = Vec::new();
        for channel in channels.iter_mut() {
            let was_running = channel.is_running();
            if self.supervisor.reconcile(channel) && was_running {
                stopped.push(channel.clone());
            }
        }
        let changed = stopped.len();
        if changed > 0 {
            self.store.save(&channels).await?;
            for channel in stopped {
                self.emit(ChannelEvent::ChannelStopped(channel));
            }
        }
        Ok((channels, changed))
    }

    pub async fn list(&self) -> OrchestratorResult<Vec<Channel>> {
        let _guard = self.mutations.lock().await;
        Ok(self.load_reconciled().await?.0)
    }

    pub async fn get(&self, name: &str) -> OrchestratorResult<Channel> {
        let channels = self.list().await?;
        let index = position(&channels, name)?;
        Ok(channels[index].clone())
    }

    pub async fn create(&self, mut channel: Channel) -> OrchestratorResult<Channel> {
        channel.normalize();
        channel.validate()?;
        // Runtime fields are never taken from the caller
        let defaults = Channel::new(channel.channel_name.clone());
        channel.status = defaults.status;
        channel.pid = None;
        channel.pids = None;
        channel.start_date = defaults.start_date;
        channel.stats_file = String::new();
        channel.stats_files = Vec::new();
        channel.error_message = String::new();

        let _guard = self.mutations.lock().await;
        let mut channels = self.store.load().await?;
        if channels.iter().any(|c| c.channel_name == channel.channel_name) {
            return Err(OrchestratorError::ChannelExists {
                name: channel.channel_name,
            });
        }
        channels.push(channel.clone());
        self.store.save(&channels).await?;

        component_info!(ComponentId::current(), "➕ Channel '{}' created", channel.channel_name);
        self.emit(ChannelEvent::ChannelCreated(channel.clone()));
        Ok(channel)
    }

    pub async fn update(&self, name: &str, update: &ChannelUpdate) -> OrchestratorResult<Channel> {
        let _guard = self.mutations.lock().await;
        let mut channels = self.store.load().await?;
        let index = position(&channels, name)?;
        if channels[index].is_running() {
            return Err(OrchestratorError::ChannelRunning { name: name.to_string() });
        }

        let mut channel = channels[index].clone();
        channel.apply(update);
        channel.normalize();
        channel.validate()?;
        channels[index] = channel.clone();
        self.store.save(&channels).await?;

        self.emit(ChannelEvent::ChannelUpdated(channel.clone()));
        Ok(channel)
    }

    /// Stop the channel's processes, then remove it
    pub async fn delete(&self, name: &str) -> OrchestratorResult<()> {
        let _guard = self.mutations.lock().await;
        let mut channels = self.store.load().await?;
        let index = position(&channels, name)?;

        let mut channel = channels.remove(index);
        self.supervisor.stop(&mut channel).await?;
        self.store.save(&channels).await?;
        self.state.forget_probe(name).await;

        component_info!(ComponentId::current(), "🗑️ Channel '{}' deleted", name);
        self.emit(ChannelEvent::ChannelDeleted {
            channel_name: name.to_string(),
        });
        Ok(())
    }

    /// Drive one channel through a lifecycle transition and persist the
    /// result whether or not it succeeded, so a failed start still records
    /// its error state
    async fn transition(&self, name: &str, transition: Transition) -> OrchestratorResult<Channel> {
        let _guard = self.mutations.lock().await;
        let mut channels = self.store.load().await?;
        let index = position(&channels, name)?;

        let mut channel = channels[index].clone();
        let before = channel.clone();
        let outcome = match transition {
            Transition::Start => self.supervisor.start(&mut channel).await,
            Transition::Stop if !channel.is_running() && channel.tracked_pids().is_empty() => {
                Err(OrchestratorError::NotRunning { name: name.to_string() })
            }
            Transition::Stop => self.supervisor.stop(&mut channel).await,
            Transition::Restart => self.supervisor.restart(&mut channel).await,
        };
        if channel != before {
            channels[index] = channel.clone();
            self.store.save(&channels).await?;
        }
        // A restart whose start phase failed has still taken the channel down
        let went_down = before.is_running() && !channel.is_running();
        if matches!(transition, Transition::Restart) && outcome.is_err() && went_down {
            self.emit(ChannelEvent::ChannelStopped(channel.clone()));
        }
        outcome.map(|()| channel)
    }

    pub async fn start(&self, name: &str) -> OrchestratorResult<Channel> {
        let channel = self.transition(name, Transition::Start).await?;
        self.emit(ChannelEvent::ChannelStarted(channel.clone()));
        Ok(channel)
    }

    /// Stop a channel; stopping one with nothing to stop is a request error
    pub async fn stop(&self, name: &str) -> OrchestratorResult<Channel> {
        let channel = self.transition(name, Transition::Stop).await?;
        self.emit(ChannelEvent::ChannelStopped(channel.clone()));
        Ok(channel)
    }

    pub async fn restart(&self, name: &str) -> OrchestratorResult<Channel> {
        let channel = self.transition(name, Transition::Restart).await?;
        self.emit(ChannelEvent::ChannelStarted(channel.clone()));
        Ok(channel)
    }

    async fn find(&self, name: &str) -> OrchestratorResult<Channel> {
        let channels = self.store.load().await?;
        let index = position(&channels, name)?;
        Ok(channels[index].clone())
    }

    pub async fn get_stats(&self, name: &str, window: TimeWindow) -> OrchestratorResult<StatsSeries> {
        let channel = self.find(name).await?;
        self.aggregator.channel_series(&channel, window).await
    }

    pub async fn get_logs(&self, name: &str, lines: usize, process_idx: Option<usize>) -> OrchestratorResult<LogsView> {
        let channel = self.find(name).await?;
        self.aggregator.read_logs(&channel, lines, process_idx).await
    }

    pub async fn get_all_stats(&self, window: TimeWindow) -> OrchestratorResult<AllStats> {
        let channels = self.store.load().await?;
        self.aggregator.all_stats(&channels, window).await
    }

    pub async fn get_full_info(&self, name: &str) -> OrchestratorResult<FullInfo> {
        let channel = self.get(name).await?;
        let mut info = FullInfo {
            channel_name: channel.channel_name.clone(),
            status: channel.status,
            pid: channel.pid,
            pids: channel.pids.clone(),
            start_date: channel.start_date.clone(),
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            input: InputInfo {
                protocol: channel.input_protocol,
                ip: channel.input_ip.clone(),
                port: channel.input_port,
                mode: channel.input_mode,
                latency: channel.input_latency,
            },
            output: OutputInfo {
                protocol: channel.output_protocol,
                port: channel.output_port,
                mode: channel.mode,
                latency: channel.output_latency,
                destinations: channel.destinations().to_vec(),
            },
            srt_stats: None,
            media_info: None,
            connections: Vec::new(),
        };
        if !channel.is_running() {
            return Ok(info);
        }

        info.srt_stats = self.aggregator.quick_stats(&channel).await?;
        info.media_info = self
            .state
            .probe(name)
            .await
            .as_ref()
            .and_then(MediaInfo::from_report);
        info.connections = self.aggregator.connections(&channel).await?;
        Ok(info)
    }

    /// Dashboard totals plus one overview row per channel
    pub async fn analytics_summary(&self) -> OrchestratorResult<AnalyticsSummary> {
        let channels = self.list().await?;
        let mut rows = Vec::with_capacity(channels.len());
        for channel in &channels {
            let mut row = ChannelOverview {
                name: channel.channel_name.clone(),
                status: channel.status,
                pid: channel.pid,
                pids: channel.pids.clone(),
                start_date: channel.start_date.clone(),
                srt_stats: None,
                packets_lost: 0,
                media_info: None,
                connections: Vec::new(),
            };
            if channel.is_running() {
                row.srt_stats = self.aggregator.quick_stats(channel).await?;
                row.packets_lost = row.srt_stats.as_ref().map(QuickStats::packets_lost).unwrap_or(0);
                row.media_info = self
                    .state
                    .probe(&channel.channel_name)
                    .await
                    .as_ref()
                    .and_then(MediaInfo::from_report);
                row.connections = self.aggregator.connections(channel).await?;
            }
            rows.push(row);
        }

        let totals = AnalyticsTotals::collect(rows.iter().map(|row| (row.status == ChannelStatus::Running, row.srt_stats.as_ref())));
        Ok(AnalyticsSummary { totals, channels: rows })
    }

    /// Media report for one channel, from cache unless `force` is set
    pub async fn stream_info(&self, name: &str, force: bool) -> OrchestratorResult<ProbeReport> {
        let channel = self.find(name).await?;
        if !channel.is_running() {
            return Ok(ProbeReport::offline(name, "Channel not running"));
        }
        if !force {
            if let Some(cached) = self.state.probe(name).await {
                return Ok(cached);
            }
        }
        let report = self.prober.probe(&channel).await;
        self.state.record_probe(report.clone()).await;
        Ok(report)
    }

    pub async fn all_stream_info(&self) -> BTreeMap<String, ProbeReport> {
        self.state.all_probes().await
    }

    /// Probe every running channel and mark the rest offline
    pub async fn refresh_probes(&self) -> OrchestratorResult<usize> {
        let channels = self.list().await?;
        let running: Vec<&Channel> = channels.iter().filter(|c| c.is_running()).collect();
        for channel in &running {
            let report = self.prober.probe(channel).await;
            self.state.record_probe(report).await;
        }
        let names: HashSet<String> = running.iter().map(|c| c.channel_name.clone()).collect();
        self.state.mark_offline_except(&names).await;
        self.state.save().await?;
        Ok(running.len())
    }
}
