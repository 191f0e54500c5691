//! Channel configuration model
//!
//! A channel is persisted flat, one JSON object per channel, so that
//! configuration files written by earlier deployments keep loading. Every
//! optional knob carries an explicit default; "is this parameter set" is
//! answered by comparing against that default, never by field presence.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{SharedError, SharedResult};
use crate::types::{ChannelStatus, Protocol, SrtMode};

/// Default SRT latency in milliseconds
pub const DEFAULT_LATENCY_MS: u32 = 120;
/// Default socket buffer size in bytes
pub const DEFAULT_BUFFER_BYTES: u32 = 1_316_000;
/// Default SRT overhead bandwidth in percent
pub const DEFAULT_OHEADBW: u32 = 25;
/// Default SRT max bandwidth (-1 = unlimited)
pub const DEFAULT_MAXBW: i64 = -1;
/// Default encryption key length in bytes
pub const DEFAULT_PBKEYLEN: u32 = 16;
/// Placeholder start date for channels that never ran
pub const NO_START_DATE: &str = "N/A";

fn default_input_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_input_port() -> u16 {
    9000
}
fn default_output_port() -> u16 {
    9100
}
fn default_latency() -> u32 {
    DEFAULT_LATENCY_MS
}
fn default_buffer() -> u32 {
    DEFAULT_BUFFER_BYTES
}
fn default_oheadbw() -> u32 {
    DEFAULT_OHEADBW
}
fn default_maxbw() -> i64 {
    DEFAULT_MAXBW
}
fn default_pbkeylen() -> u32 {
    DEFAULT_PBKEYLEN
}
fn default_true() -> bool {
    true
}
fn default_start_date() -> String {
    NO_START_DATE.to_string()
}
fn default_destination_mode() -> SrtMode {
    SrtMode::Caller
}

/// One receiver in a channel's fan-out list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_destination_mode")]
    pub mode: SrtMode,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_output_port")]
    pub port: u16,
    #[serde(default)]
    pub multicast_ip: String,
    #[serde(default)]
    pub adapter: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub iptos: String,
    #[serde(default)]
    pub mcloop: Option<u8>,
    #[serde(default)]
    pub sndbuf: u32,
    #[serde(default)]
    pub rcvbuf: u32,
    #[serde(default)]
    pub extra_params: String,
    #[serde(default)]
    pub passphrase: String,
    #[serde(default)]
    pub pbkeylen: Option<u32>,
    #[serde(default)]
    pub streamid: String,
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            protocol: Protocol::Srt,
            mode: default_destination_mode(),
            host: String::new(),
            port: default_output_port(),
            multicast_ip: String::new(),
            adapter: String::new(),
            ttl: 0,
            iptos: String::new(),
            mcloop: None,
            sndbuf: 0,
            rcvbuf: 0,
            extra_params: String::new(),
            passphrase: String::new(),
            pbkeylen: None,
            streamid: String::new(),
        }
    }
}

/// Input side of a fan-out process, derived from the channel's input fields
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub protocol: Protocol,
    pub ip: String,
    pub port: u16,
    pub mode: SrtMode,
    pub latency: u32,
    pub interface: String,
    pub extra_params: String,
    pub passphrase: String,
    pub pbkeylen: Option<u32>,
    pub streamid: String,
}

/// A configured relay of one input stream to one or more outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_name: String,

    // Input descriptor
    #[serde(default)]
    pub input_protocol: Protocol,
    #[serde(default = "default_input_ip")]
    pub input_ip: String,
    #[serde(default = "default_input_port")]
    pub input_port: u16,
    #[serde(default)]
    pub input_mode: SrtMode,
    #[serde(default)]
    pub input_interface: String,
    #[serde(default)]
    pub input_extra_params: String,
    #[serde(default = "default_buffer")]
    pub input_rcvbuf: u32,
    #[serde(default = "default_buffer")]
    pub input_sndbuf: u32,
    #[serde(default = "default_latency")]
    pub input_latency: u32,
    #[serde(default)]
    pub input_passphrase: String,
    #[serde(default)]
    pub input_pbkeylen: Option<u32>,

    // Output descriptor
    #[serde(default)]
    pub output_protocol: Protocol,
    #[serde(default)]
    pub mode: SrtMode,
    #[serde(default)]
    pub destination_host: String,
    #[serde(default = "default_output_port")]
    pub output_port: u16,
    #[serde(default)]
    pub output_multicast_ip: String,
    #[serde(default)]
    pub output_adapter: String,
    #[serde(default)]
    pub output_ttl: u32,
    #[serde(default)]
    pub output_iptos: String,
    #[serde(default)]
    pub output_mcloop: Option<u8>,
    #[serde(default)]
    pub output_interface: String,
    #[serde(default)]
    pub output_extra_params: String,
    #[serde(default = "default_buffer")]
    pub output_rcvbuf: u32,
    #[serde(default = "default_buffer")]
    pub output_sndbuf: u32,
    #[serde(default = "default_latency")]
    pub output_latency: u32,
    #[serde(default)]
    pub output_passphrase: String,
    #[serde(default)]
    pub output_pbkeylen: Option<u32>,
    #[serde(default = "default_oheadbw")]
    pub oheadbw: u32,
    #[serde(default = "default_maxbw")]
    pub maxbw: i64,

    // Legacy values shared by input and output
    #[serde(default)]
    pub passphrase: String,
    #[serde(default = "default_pbkeylen")]
    pub pbkeylen: u32,
    #[serde(default)]
    pub streamid: String,

    // Relay flags
    #[serde(default)]
    pub fec_enabled: bool,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub log_level: Option<String>,

    /// Fan-out list; when present and non-empty, one process per entry
    #[serde(default)]
    pub destinations: Option<Vec<Destination>>,

    // Runtime state, written only by the supervisor
    #[serde(default)]
    pub status: ChannelStatus,
    #[serde(default = "default_start_date")]
    pub start_date: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub pids: Option<Vec<u32>>,
    #[serde(default)]
    pub stats_file: String,
    #[serde(default)]
    pub stats_files: Vec<String>,
    #[serde(default)]
    pub error_message: String,
}

impl Channel {
    /// Create a channel with every field at its default
    pub fn new(channel_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            input_protocol: Protocol::Srt,
            input_ip: default_input_ip(),
            input_port: default_input_port(),
            input_mode: SrtMode::Listener,
            input_interface: String::new(),
            input_extra_params: String::new(),
            input_rcvbuf: DEFAULT_BUFFER_BYTES,
            input_sndbuf: DEFAULT_BUFFER_BYTES,
            input_latency: DEFAULT_LATENCY_MS,
            input_passphrase: String::new(),
            input_pbkeylen: None,
            output_protocol: Protocol::Srt,
            mode: SrtMode::Listener,
            destination_host: String::new(),
            output_port: default_output_port(),
            output_multicast_ip: String::new(),
            output_adapter: String::new(),
            output_ttl: 0,
            output_iptos: String::new(),
            output_mcloop: None,
            output_interface: String::new(),
            output_extra_params: String::new(),
            output_rcvbuf: DEFAULT_BUFFER_BYTES,
            output_sndbuf: DEFAULT_BUFFER_BYTES,
            output_latency: DEFAULT_LATENCY_MS,
            output_passphrase: String::new(),
            output_pbkeylen: None,
            oheadbw: DEFAULT_OHEADBW,
            maxbw: DEFAULT_MAXBW,
            passphrase: String::new(),
            pbkeylen: DEFAULT_PBKEYLEN,
            streamid: String::new(),
            fec_enabled: false,
            auto_reconnect: true,
            log_level: None,
            destinations: None,
            status: ChannelStatus::Stopped,
            start_date: default_start_date(),
            pid: None,
            pids: None,
            stats_file: String::new(),
            stats_files: Vec::new(),
            error_message: String::new(),
        }
    }

    /// Fan-out entries, empty when the channel has a single output
    pub fn destinations(&self) -> &[Destination] {
        self.destinations.as_deref().unwrap_or(&[])
    }

    pub fn has_destinations(&self) -> bool {
        !self.destinations().is_empty()
    }

    /// Number of relay processes this channel runs when started
    pub fn process_count(&self) -> usize {
        self.destinations().len().max(1)
    }

    pub fn is_running(&self) -> bool {
        self.status == ChannelStatus::Running
    }

    /// All tracked process ids, primary first
    pub fn tracked_pids(&self) -> Vec<u32> {
        match (&self.pids, self.pid) {
            (Some(pids), _) if !pids.is_empty() => pids.clone(),
            (_, Some(pid)) => vec![pid],
            _ => Vec::new(),
        }
    }

    /// Input side expressed as a fan-out source: the input-specific
    /// passphrase and key length win over the legacy shared ones
    pub fn source(&self) -> Source {
        Source {
            protocol: self.input_protocol,
            ip: self.input_ip.clone(),
            port: self.input_port,
            mode: self.input_mode,
            latency: self.input_latency,
            interface: self.input_interface.clone(),
            extra_params: self.input_extra_params.clone(),
            passphrase: self.input_passphrase.clone(),
            pbkeylen: self.input_pbkeylen,
            streamid: String::new(),
        }
    }

    /// Record a successful start of `pids`
    pub fn mark_running(&mut self, pids: Vec<u32>, stats_files: Vec<String>) {
        self.pid = pids.first().copied();
        self.pids = Some(pids);
        self.stats_file = stats_files.first().cloned().unwrap_or_default();
        self.stats_files = stats_files;
        self.status = ChannelStatus::Running;
        self.start_date = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.error_message.clear();
    }

    /// Record a failed start; `pids` are siblings that did spawn
    pub fn mark_error(&mut self, message: impl Into<String>, pids: Vec<u32>, stats_files: Vec<String>) {
        self.pid = pids.first().copied();
        self.pids = if pids.is_empty() { None } else { Some(pids) };
        self.stats_file = stats_files.first().cloned().unwrap_or_default();
        self.stats_files = stats_files;
        self.status = ChannelStatus::Error;
        self.error_message = message.into();
    }

    /// Forget every tracked process and declare the channel stopped
    pub fn mark_stopped(&mut self) {
        self.pid = None;
        self.pids = None;
        self.status = ChannelStatus::Stopped;
    }

    /// Apply a partial update, field by field
    pub fn apply(&mut self, update: &ChannelUpdate) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &update.$field {
                    self.$field = value.clone();
                })*
            };
        }
        merge!(
            input_protocol,
            input_ip,
            input_port,
            input_mode,
            input_interface,
            input_extra_params,
            input_rcvbuf,
            input_sndbuf,
            input_latency,
            input_passphrase,
            output_protocol,
            mode,
            destination_host,
            output_port,
            output_multicast_ip,
            output_adapter,
            output_ttl,
            output_iptos,
            output_interface,
            output_extra_params,
            output_rcvbuf,
            output_sndbuf,
            output_latency,
            output_passphrase,
            oheadbw,
            maxbw,
            passphrase,
            pbkeylen,
            streamid,
            fec_enabled,
            auto_reconnect,
        );
        if let Some(value) = update.input_pbkeylen {
            self.input_pbkeylen = Some(value);
        }
        if let Some(value) = update.output_pbkeylen {
            self.output_pbkeylen = Some(value);
        }
        if let Some(value) = update.output_mcloop {
            self.output_mcloop = Some(value);
        }
        if let Some(level) = &update.log_level {
            self.log_level = Some(level.clone());
        }
        if let Some(destinations) = &update.destinations {
            self.destinations = Some(destinations.clone());
        }
    }
}

/// Partial channel update; every `Some` field overwrites the channel's
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelUpdate {
    pub input_protocol: Option<Protocol>,
    pub input_ip: Option<String>,
    pub input_port: Option<u16>,
    pub input_mode: Option<SrtMode>,
    pub input_interface: Option<String>,
    pub input_extra_params: Option<String>,
    pub input_rcvbuf: Option<u32>,
    pub input_sndbuf: Option<u32>,
    pub input_latency: Option<u32>,
    pub input_passphrase: Option<String>,
    pub input_pbkeylen: Option<u32>,
    pub output_protocol: Option<Protocol>,
    pub mode: Option<SrtMode>,
    pub destination_host: Option<String>,
    pub output_port: Option<u16>,
    pub output_multicast_ip: Option<String>,
    pub output_adapter: Option<String>,
    pub output_ttl: Option<u32>,
    pub output_iptos: Option<String>,
    pub output_mcloop: Option<u8>,
    pub output_interface: Option<String>,
    pub output_extra_params: Option<String>,
    pub output_rcvbuf: Option<u32>,
    pub output_sndbuf: Option<u32>,
    pub output_latency: Option<u32>,
    pub output_passphrase: Option<String>,
    pub output_pbkeylen: Option<u32>,
    pub oheadbw: Option<u32>,
    pub maxbw: Option<i64>,
    pub passphrase: Option<String>,
    pub pbkeylen: Option<u32>,
    pub streamid: Option<String>,
    pub fec_enabled: Option<bool>,
    pub auto_reconnect: Option<bool>,
    pub log_level: Option<String>,
    pub destinations: Option<Vec<Destination>>,
}

/// On-disk configuration document
///
/// `users` belongs to the authentication layer; it is carried through
/// untouched so saving channels never drops accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub users: Vec<Value>,
}

impl ConfigDocument {
    /// Parse a configuration file body, accepting the legacy bare-array layout
    pub fn parse(raw: &str) -> SharedResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(raw).map_err(|e| SharedError::DeserializationError {
            message: e.to_string(),
        })?;
        let document = match value {
            Value::Array(_) => ConfigDocument {
                channels: serde_json::from_value(value).map_err(|e| SharedError::DeserializationError {
                    message: e.to_string(),
                })?,
                users: Vec::new(),
            },
            other => serde_json::from_value(other).map_err(|e| SharedError::DeserializationError {
                message: e.to_string(),
            })?,
        };
        Ok(document)
    }

    pub fn to_json(&self) -> SharedResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SharedError::SerializationError { message: e.to_string() })
    }
}
