//! Periodic status monitor
//!
//! Every interval: reconcile declared status against the process table,
//! then refresh media probes of running channels. A pass never overlaps
//! the previous one; a tick that finds a pass in flight is skipped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};

use shared::{component_debug, component_error, component_info, ComponentId};

use crate::error::OrchestratorResult;
use crate::services::channel_service::ChannelService;
use crate::traits::{ChannelStore, MediaProber, ProcessTable};

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// What one monitor pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub reconciled: usize,
    pub probed: usize,
}

pub struct Monitor<P, S, M>
where
    P: ProcessTable + 'static,
    S: ChannelStore + 'static,
    M: MediaProber + 'static,
{
    service: Arc<ChannelService<P, S, M>>,
    period: Duration,
    probing: bool,
    in_flight: Mutex<()>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<P, S, M> Monitor<P, S, M>
where
    P: ProcessTable + 'static,
    S: ChannelStore + 'static,
    M: MediaProber + 'static,
{
    pub fn new(service: Arc<ChannelService<P, S, M>>) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            service,
            period: DEFAULT_MONITOR_INTERVAL,
            probing: true,
            in_flight: Mutex::new(()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Configure pass interval (fluent API)
    pub fn with_interval(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Enable or disable media probing on each pass (fluent API)
    pub fn with_probing(mut self, probing: bool) -> Self {
        self.probing = probing;
        self
    }

    /// Get shutdown sender for external shutdown requests
    pub fn get_shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run one pass; `None` when another pass is still in flight
    pub async fn pass(&self) -> OrchestratorResult<Option<PassReport>> {
        run_pass(&*self.service, self.probing, &self.in_flight).await
    }

    /// Loop until a shutdown request arrives
    pub async fn run(&mut self) -> OrchestratorResult<()> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A shutdown request abandons the pass in flight
                    tokio::select! {
                        result = run_pass(&*self.service, self.probing, &self.in_flight) => {
                            if let Err(e) = result {
                                component_error!(ComponentId::current(), "⚠️ Monitor pass failed: {}. Will retry on next interval.", e);
                            }
                        },
                        Some(_) = self.shutdown_rx.recv() => {
                            component_debug!(ComponentId::current(), "🛑 Monitor shutting down mid-pass");
                            break;
                        }
                    }
                },

                Some(_) = self.shutdown_rx.recv() => {
                    component_debug!(ComponentId::current(), "🛑 Monitor shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn run_pass<P, S, M>(
    service: &ChannelService<P, S, M>,
    probing: bool,
    in_flight: &Mutex<()>,
) -> OrchestratorResult<Option<PassReport>>
where
    P: ProcessTable + 'static,
    S: ChannelStore + 'static,
    M: MediaProber + 'static,
{
    let Ok(_guard) = in_flight.try_lock() else {
        component_debug!(ComponentId::current(), "⏭️ Monitor pass still in flight, skipping tick");
        return Ok(None);
    };

    let reconciled = service.reconcile_all().await?;
    let probed = if probing { service.refresh_probes().await? } else { 0 };
    if reconciled > 0 {
        component_info!(
            ComponentId::current(),
            "🔄 Monitor corrected {} channel(s) whose process exited",
            reconciled
        );
    }
    Ok(Some(PassReport { reconciled, probed }))
}
