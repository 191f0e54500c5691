//! Relay process supervisor
//!
//! Owns the lifecycle of the processes behind a channel:
//! `stopped -> running -> stopped`, with `error` reachable only from a
//! failed start. The supervisor mutates the channel record it is given;
//! persisting it is the caller's business.

use std::sync::Arc;
use std::time::Duration;

use shared::{component_debug, component_info, component_warn, Channel, ChannelStatus, ComponentId};

use crate::core::command::CommandBuilder;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::ProcessTable;

/// Pause between stop and start on restart
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

pub struct Supervisor<P>
where
    P: ProcessTable + 'static,
{
    table: Arc<P>,
    builder: CommandBuilder,
    settle_delay: Duration,
}

impl<P> Supervisor<P>
where
    P: ProcessTable + 'static,
{
    pub fn new(table: Arc<P>, builder: CommandBuilder) -> Self {
        Self {
            table,
            builder,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Configure restart settle delay (fluent API)
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }

    pub fn table(&self) -> &P {
        &self.table
    }

    /// Spawn every relay process of `channel`
    ///
    /// All invocations are built before anything is spawned, so a bad
    /// configuration never leaves half a channel running. If a spawn
    /// fails, the siblings that did start stay tracked on the channel so
    /// a later stop can reach them.
    pub async fn start(&self, channel: &mut Channel) -> OrchestratorResult<()> {
        if channel.is_running() {
            return Err(OrchestratorError::AlreadyRunning {
                name: channel.channel_name.clone(),
            });
        }

        let invocations = self.builder.build_all(channel)?;
        if !channel.tracked_pids().is_empty() {
            // Survivors of an earlier failed start
            self.stop(channel).await?;
        }
        self.builder.layout().ensure_dirs()?;

        let mut pids = Vec::with_capacity(invocations.len());
        let mut stats_files = Vec::with_capacity(invocations.len());
        for invocation in &invocations {
            match self.table.spawn(invocation).await {
                Ok(pid) => {
                    pids.push(pid);
                    stats_files.push(invocation.stats_path.display().to_string());
                }
                Err(e) => {
                    let message = match invocation.index {
                        Some(i) => format!("destination {i}: {e}"),
                        None => e.to_string(),
                    };
                    component_warn!(
                        ComponentId::current(),
                        "❌ Failed to start '{}': {} ({} sibling process(es) running)",
                        channel.channel_name,
                        message,
                        pids.len()
                    );
                    channel.mark_error(message.clone(), pids, stats_files);
                    return Err(OrchestratorError::Spawn {
                        channel: channel.channel_name.clone(),
                        message,
                    });
                }
            }
        }

        component_info!(
            ComponentId::current(),
            "✅ Channel '{}' started with PIDs {:?}",
            channel.channel_name,
            pids
        );
        channel.mark_running(pids, stats_files);
        Ok(())
    }

    /// Terminate every process of `channel`
    ///
    /// Idempotent: a channel with nothing tracked and not running is left
    /// alone. Each pid gets a group SIGTERM, falling back to a single-pid
    /// SIGTERM; a pattern sweep then catches anything that escaped.
    pub async fn stop(&self, channel: &mut Channel) -> OrchestratorResult<()> {
        let pids = channel.tracked_pids();
        if pids.is_empty() && !channel.is_running() {
            return Ok(());
        }

        for pid in &pids {
            if let Err(group_err) = self.table.kill_group(*pid).await {
                component_debug!(
                    ComponentId::current(),
                    "Group kill of {} failed ({}), signalling the process",
                    pid,
                    group_err
                );
                if let Err(e) = self.table.kill_pid(*pid).await {
                    component_debug!(ComponentId::current(), "PID {} already gone: {}", pid, e);
                }
            }
        }

        let pattern = self.builder.kill_pattern(&channel.channel_name)?;
        if self.table.kill_matching(&pattern).await {
            component_debug!(ComponentId::current(), "🧹 Sweep '{}' matched stray processes", pattern);
        }

        component_info!(ComponentId::current(), "🛑 Channel '{}' stopped", channel.channel_name);
        channel.mark_stopped();
        Ok(())
    }

    /// Bring the declared status in line with the process table
    ///
    /// A running channel whose primary process is gone becomes stopped;
    /// a stopped channel drops any stale pid. Returns whether anything
    /// changed.
    pub fn reconcile(&self, channel: &mut Channel) -> bool {
        match channel.status {
            ChannelStatus::Running => {
                let alive = channel.pid.is_some_and(|pid| self.table.exists(pid));
                if alive {
                    return false;
                }
                component_debug!(
                    ComponentId::current(),
                    "Process {:?} of '{}' vanished, marking stopped",
                    channel.pid,
                    channel.channel_name
                );
                channel.mark_stopped();
                true
            }
            ChannelStatus::Stopped if channel.pid.is_some() || channel.pids.is_some() => {
                channel.mark_stopped();
                true
            }
            _ => false,
        }
    }

    /// Startup pass: a channel whose recorded process still lives is
    /// running, anything else is stopped
    pub fn reconcile_startup(&self, channel: &mut Channel) -> bool {
        if channel.status == ChannelStatus::Error {
            // Siblings of a failed start stay tracked while any survive
            if channel.tracked_pids().iter().any(|pid| self.table.exists(*pid)) {
                return false;
            }
        } else if channel.pid.is_some_and(|pid| self.table.exists(pid)) {
            let changed = channel.status != ChannelStatus::Running;
            channel.status = ChannelStatus::Running;
            return changed;
        }
        let changed = channel.status != ChannelStatus::Stopped || channel.pid.is_some() || channel.pids.is_some();
        if changed {
            channel.mark_stopped();
        }
        changed
    }

    /// Stop, wait for the settle delay, start
    pub async fn restart(&self, channel: &mut Channel) -> OrchestratorResult<()> {
        self.stop(channel).await?;
        tokio::time::sleep(self.settle_delay).await;
        self.start(channel).await
    }
}
