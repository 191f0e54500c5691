//! Runtime settings
//!
//! Every setting is a command line flag with an environment fallback;
//! a `.env` file in the working directory is read first so deployments
//! can keep their overrides next to the configuration file.

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::command::{CommandBuilder, DEFAULT_RELAY_PROGRAM, DEFAULT_STATS_INTERVAL_MS};
use crate::core::layout::FileLayout;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::services::channel_store::DEFAULT_CONFIG_FILE;
use crate::services::{ChannelService, FfprobeMediaProber, JsonChannelStore, RealProcessTable, Supervisor};
use crate::state::{RuntimeState, DEFAULT_PROBE_CACHE_FILE};

/// Service stack wired with the real I/O implementations
pub type RealChannelService = ChannelService<RealProcessTable, JsonChannelStore, FfprobeMediaProber>;

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Channel configuration file
    #[arg(long, env = "RELAY_CONFIG_FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Directory for relay telemetry CSV files
    #[arg(long, env = "RELAY_STATS_DIR", default_value = "stats")]
    pub stats_dir: PathBuf,

    /// Directory for relay process logs
    #[arg(long, env = "RELAY_LOGS_DIR", default_value = "logs")]
    pub logs_dir: PathBuf,

    /// Relay executable
    #[arg(long, env = "RELAY_BINARY", default_value = DEFAULT_RELAY_PROGRAM)]
    pub relay_binary: String,

    /// Telemetry report interval passed to each relay, in milliseconds
    #[arg(long, env = "RELAY_STATS_INTERVAL_MS", default_value_t = DEFAULT_STATS_INTERVAL_MS)]
    pub stats_interval_ms: u64,

    /// Seconds between monitor passes
    #[arg(long, env = "RELAY_MONITOR_INTERVAL_SECS", default_value_t = 10)]
    pub monitor_interval_secs: u64,

    /// Media probe executable
    #[arg(long, env = "RELAY_PROBE_BINARY", default_value = "ffprobe")]
    pub probe_binary: String,

    /// Seconds before a media probe is abandoned
    #[arg(long, env = "RELAY_PROBE_TIMEOUT_SECS", default_value_t = 12)]
    pub probe_timeout_secs: u64,

    /// Media probes allowed to run at once
    #[arg(long, env = "RELAY_PROBE_CONCURRENCY", default_value_t = 4)]
    pub probe_concurrency: usize,

    /// Media probe cache snapshot
    #[arg(long, env = "RELAY_PROBE_CACHE", default_value = DEFAULT_PROBE_CACHE_FILE)]
    pub probe_cache: PathBuf,

    /// Pause between stop and start on restart, in milliseconds
    #[arg(long, env = "RELAY_SETTLE_DELAY_MS", default_value_t = 1000)]
    pub settle_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RELAY_LOG", default_value = "info")]
    pub log_level: String,
}

impl Settings {
    /// Load `.env` into the process environment; a missing file is fine
    pub fn load_env() {
        let _ = dotenv::dotenv();
    }

    /// Reject settings no component could run with
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.relay_binary.trim().is_empty() {
            return Err(OrchestratorError::config("relay binary must not be empty"));
        }
        if self.stats_interval_ms == 0 {
            return Err(OrchestratorError::config("stats interval must be positive"));
        }
        if self.monitor_interval_secs == 0 {
            return Err(OrchestratorError::config("monitor interval must be positive"));
        }
        Ok(())
    }

    pub fn layout(&self) -> FileLayout {
        FileLayout::new(&self.stats_dir, &self.logs_dir)
    }

    pub fn command_builder(&self) -> CommandBuilder {
        CommandBuilder::new(&self.relay_binary, self.layout()).with_stats_interval(self.stats_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// Build the channel service over the real process table, config
    /// file and ffprobe
    pub fn channel_service(&self) -> OrchestratorResult<RealChannelService> {
        self.validate()?;
        let supervisor = Supervisor::new(Arc::new(RealProcessTable::new()), self.command_builder())
            .with_settle_delay(Duration::from_millis(self.settle_delay_ms));
        let prober = FfprobeMediaProber::new()
            .with_program(&self.probe_binary)
            .with_timeout(Duration::from_secs(self.probe_timeout_secs))
            .with_concurrency(self.probe_concurrency);
        let state = Arc::new(RuntimeState::new(&self.probe_cache));
        Ok(ChannelService::new(
            JsonChannelStore::new(&self.config_file),
            supervisor,
            prober,
            state,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["relayctl"]).unwrap();
        let settings = cli.settings;
        assert_eq!(settings.config_file, PathBuf::from("config.json"));
        assert_eq!(settings.relay_binary, "srt-live-transmit");
        assert_eq!(settings.stats_interval_ms, 5000);
        assert_eq!(settings.monitor_interval(), Duration::from_secs(10));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let cli = Cli::try_parse_from(["relayctl", "--stats-interval-ms", "0"]).unwrap();
        assert!(matches!(
            cli.settings.validate(),
            Err(OrchestratorError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_builder_uses_layout() {
        let cli = Cli::try_parse_from(["relayctl", "--stats-dir", "/tmp/s", "--relay-binary", "/opt/slt"]).unwrap();
        let builder = cli.settings.command_builder();
        assert_eq!(builder.program(), "/opt/slt");
        assert_eq!(builder.layout().stats_dir(), std::path::Path::new("/tmp/s"));
    }
}
