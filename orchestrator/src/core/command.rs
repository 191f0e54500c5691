//! Relay command builder
//!
//! Turns a channel configuration into one argument vector per relay
//! process. The vector is handed to the OS as-is; it is never joined into
//! a shell string. Every endpoint is checked against the relay's URL
//! grammar before it leaves this module and a mismatch fails the whole
//! build.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use shared::channel::{DEFAULT_BUFFER_BYTES, DEFAULT_LATENCY_MS, DEFAULT_MAXBW, DEFAULT_OHEADBW, DEFAULT_PBKEYLEN};
use shared::validation::parse_multicast_ip;
use shared::{Channel, Destination, Protocol, SrtMode};

use crate::core::endpoint::Endpoint;
use crate::core::layout::FileLayout;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Telemetry report interval handed to the relay
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_RELAY_PROGRAM: &str = "srt-live-transmit";

fn endpoint_grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(srt|udp)://[\w\.-]*(:\d+)?(\?[\w=&%\.\-:,]*)?$").expect("valid endpoint grammar")
    })
}

/// Whether `url` is acceptable to the relay
pub fn is_valid_endpoint(url: &str) -> bool {
    endpoint_grammar().is_match(url)
}

/// A fully built relay process: argv plus the files it writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayInvocation {
    /// Fan-out destination index, `None` for a single-output channel
    pub index: Option<usize>,
    /// Program followed by its arguments
    pub args: Vec<String>,
    pub stats_path: PathBuf,
    pub log_path: PathBuf,
}

impl RelayInvocation {
    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    pub fn arguments(&self) -> &[String] {
        self.args.get(1..).unwrap_or_default()
    }
}

/// Resolved encryption and identification for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Security {
    pub passphrase: String,
    pub pbkeylen: u32,
    pub streamid: String,
}

/// One precedence level of security settings
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityTier<'a> {
    pub passphrase: &'a str,
    pub pbkeylen: Option<u32>,
    pub streamid: &'a str,
}

impl Security {
    /// First non-empty value wins per field, most specific tier first;
    /// the key length falls back to the compiled default
    pub fn resolve(tiers: &[SecurityTier<'_>]) -> Self {
        let passphrase = tiers.iter().map(|t| t.passphrase).find(|p| !p.is_empty()).unwrap_or_default();
        let streamid = tiers.iter().map(|t| t.streamid).find(|s| !s.is_empty()).unwrap_or_default();
        let pbkeylen = tiers.iter().find_map(|t| t.pbkeylen).unwrap_or(DEFAULT_PBKEYLEN);
        Self {
            passphrase: passphrase.to_string(),
            pbkeylen,
            streamid: streamid.to_string(),
        }
    }

    /// Input side: input-specific, then legacy shared values
    pub fn for_input(channel: &Channel) -> Self {
        let source = channel.source();
        Self::resolve(&[
            SecurityTier {
                passphrase: &source.passphrase,
                pbkeylen: source.pbkeylen,
                streamid: &source.streamid,
            },
            legacy_tier(channel),
        ])
    }

    /// Single output: output-specific, then legacy shared values
    pub fn for_output(channel: &Channel) -> Self {
        Self::resolve(&[output_tier(channel), legacy_tier(channel)])
    }

    /// Fan-out output: destination, output-specific, then legacy values
    pub fn for_destination(channel: &Channel, destination: &Destination) -> Self {
        Self::resolve(&[
            SecurityTier {
                passphrase: &destination.passphrase,
                pbkeylen: destination.pbkeylen,
                streamid: &destination.streamid,
            },
            output_tier(channel),
            legacy_tier(channel),
        ])
    }

    fn apply(&self, endpoint: Endpoint) -> Endpoint {
        let endpoint = if self.passphrase.is_empty() {
            endpoint
        } else {
            endpoint
                .with_secret("passphrase", &self.passphrase)
                .with_param("pbkeylen", self.pbkeylen)
        };
        endpoint.with_secret("streamid", &self.streamid)
    }
}

fn output_tier(channel: &Channel) -> SecurityTier<'_> {
    SecurityTier {
        passphrase: &channel.output_passphrase,
        pbkeylen: channel.output_pbkeylen,
        streamid: "",
    }
}

fn legacy_tier(channel: &Channel) -> SecurityTier<'_> {
    SecurityTier {
        passphrase: &channel.passphrase,
        pbkeylen: Some(channel.pbkeylen),
        streamid: &channel.streamid,
    }
}

/// Input endpoint, shared by every process of a channel
pub fn input_endpoint(channel: &Channel) -> Endpoint {
    let source = channel.source();
    let endpoint = Endpoint::new(source.protocol, source.ip.as_str(), Some(source.port));
    match source.protocol {
        Protocol::Srt => Security::for_input(channel)
            .apply(
                endpoint
                    .with_param("mode", source.mode)
                    .with_param("latency", source.latency)
                    .with_non_default("rcvbuf", channel.input_rcvbuf, DEFAULT_BUFFER_BYTES)
                    .with_non_default("sndbuf", channel.input_sndbuf, DEFAULT_BUFFER_BYTES),
            )
            .with_extra_params(&source.extra_params),
        Protocol::Udp => endpoint
            .with_text("iface", &source.interface)
            .with_extra_params(&source.extra_params),
    }
}

/// Output endpoint of a single-output channel
pub fn output_endpoint(channel: &Channel) -> OrchestratorResult<Endpoint> {
    match channel.output_protocol {
        Protocol::Srt => {
            let host = match channel.mode {
                SrtMode::Listener => "",
                _ => caller_host(&channel.destination_host, channel.mode)?,
            };
            let target = SrtTarget {
                host,
                port: channel.output_port,
                mode: channel.mode,
                sndbuf: channel.output_sndbuf,
                rcvbuf: channel.output_rcvbuf,
                security: Security::for_output(channel),
                extra_params: &channel.output_extra_params,
            };
            Ok(target.endpoint(channel))
        }
        Protocol::Udp => UdpTarget {
            multicast_ip: &channel.output_multicast_ip,
            host: &channel.destination_host,
            port: channel.output_port,
            adapter: &channel.output_adapter,
            ttl: channel.output_ttl,
            iptos: &channel.output_iptos,
            mcloop: channel.output_mcloop,
            sndbuf: channel.output_sndbuf,
            rcvbuf: channel.output_rcvbuf,
            extra_params: &channel.output_extra_params,
        }
        .endpoint(),
    }
}

/// Output endpoint of fan-out process `destination`
///
/// Channel-level output settings fill whatever the destination leaves
/// unset.
pub fn destination_endpoint(channel: &Channel, destination: &Destination) -> OrchestratorResult<Endpoint> {
    let extra_params = if destination.extra_params.is_empty() {
        &channel.output_extra_params
    } else {
        &destination.extra_params
    };
    let sndbuf = if destination.sndbuf > 0 { destination.sndbuf } else { channel.output_sndbuf };
    let rcvbuf = if destination.rcvbuf > 0 { destination.rcvbuf } else { channel.output_rcvbuf };

    match destination.protocol {
        Protocol::Srt => {
            let host = match destination.mode {
                SrtMode::Listener => "0.0.0.0",
                _ => caller_host(&destination.host, destination.mode)?,
            };
            let target = SrtTarget {
                host,
                port: destination.port,
                mode: destination.mode,
                sndbuf,
                rcvbuf,
                security: Security::for_destination(channel, destination),
                extra_params,
            };
            Ok(target.endpoint(channel))
        }
        Protocol::Udp => UdpTarget {
            multicast_ip: &destination.multicast_ip,
            host: &destination.host,
            port: destination.port,
            adapter: &destination.adapter,
            ttl: destination.ttl,
            iptos: &destination.iptos,
            mcloop: destination.mcloop,
            sndbuf,
            rcvbuf,
            extra_params,
        }
        .endpoint(),
    }
}

fn caller_host(host: &str, mode: SrtMode) -> OrchestratorResult<&str> {
    if host.is_empty() {
        return Err(OrchestratorError::command_build(
            "srt output",
            format!("{mode} mode requires a destination host"),
        ));
    }
    Ok(host)
}

struct SrtTarget<'a> {
    host: &'a str,
    port: u16,
    mode: SrtMode,
    sndbuf: u32,
    rcvbuf: u32,
    security: Security,
    extra_params: &'a str,
}

impl SrtTarget<'_> {
    fn endpoint(self, channel: &Channel) -> Endpoint {
        let endpoint = Endpoint::new(Protocol::Srt, self.host, Some(self.port))
            .with_param("mode", self.mode)
            .with_non_default("latency", channel.output_latency, DEFAULT_LATENCY_MS)
            .with_non_default("oheadbw", channel.oheadbw, DEFAULT_OHEADBW)
            .with_non_default("maxbw", channel.maxbw, DEFAULT_MAXBW)
            .with_non_default("sndbuf", self.sndbuf, DEFAULT_BUFFER_BYTES)
            .with_non_default("rcvbuf", self.rcvbuf, DEFAULT_BUFFER_BYTES);
        let endpoint = self.security.apply(endpoint);
        let endpoint = if channel.fec_enabled {
            endpoint.with_param("fec", 1)
        } else {
            endpoint
        };
        endpoint.with_extra_params(self.extra_params)
    }
}

struct UdpTarget<'a> {
    multicast_ip: &'a str,
    host: &'a str,
    port: u16,
    adapter: &'a str,
    ttl: u32,
    iptos: &'a str,
    mcloop: Option<u8>,
    sndbuf: u32,
    rcvbuf: u32,
    extra_params: &'a str,
}

impl UdpTarget<'_> {
    fn endpoint(self) -> OrchestratorResult<Endpoint> {
        let multicast = !self.multicast_ip.is_empty();
        let host = if multicast {
            parse_multicast_ip(self.multicast_ip)?.to_string()
        } else {
            self.host.to_string()
        };

        let mut endpoint = Endpoint::new(Protocol::Udp, host, Some(self.port));
        if multicast {
            endpoint = endpoint.with_text("adapter", self.adapter);
        }
        if self.ttl > 0 {
            endpoint = endpoint.with_param("ttl", self.ttl);
        }
        endpoint = endpoint.with_text("iptos", self.iptos);
        if let (true, Some(mcloop)) = (multicast, self.mcloop) {
            endpoint = endpoint.with_param("mcloop", mcloop);
        }
        for (key, value) in [("sndbuf", self.sndbuf), ("rcvbuf", self.rcvbuf)] {
            if value > 0 {
                endpoint = endpoint.with_non_default(key, value, DEFAULT_BUFFER_BYTES);
            }
        }
        Ok(endpoint.with_extra_params(self.extra_params))
    }
}

/// Builds relay argument vectors for channels
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    layout: FileLayout,
    stats_interval_ms: u64,
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>, layout: FileLayout) -> Self {
        Self {
            program: program.into(),
            layout,
            stats_interval_ms: DEFAULT_STATS_INTERVAL_MS,
        }
    }

    /// Configure telemetry interval (fluent API)
    pub fn with_stats_interval(mut self, stats_interval_ms: u64) -> Self {
        self.stats_interval_ms = stats_interval_ms;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Argument vector for one process of `channel`
    ///
    /// `destination_index` selects a fan-out destination; `None` builds
    /// the single-output invocation from the channel's own output fields.
    pub fn build(&self, channel: &Channel, destination_index: Option<usize>) -> OrchestratorResult<Vec<String>> {
        Ok(self.invocation(channel, destination_index)?.args)
    }

    /// One invocation per process the channel runs
    pub fn build_all(&self, channel: &Channel) -> OrchestratorResult<Vec<RelayInvocation>> {
        FileLayout::process_indices(channel)
            .into_iter()
            .map(|index| self.invocation(channel, index))
            .collect()
    }

    pub fn invocation(&self, channel: &Channel, destination_index: Option<usize>) -> OrchestratorResult<RelayInvocation> {
        channel.validate()?;

        let input = input_endpoint(channel);
        let output = match destination_index {
            Some(i) => {
                let destination = channel.destinations().get(i).ok_or_else(|| {
                    OrchestratorError::config(format!(
                        "destination index {i} out of range for channel '{}'",
                        channel.channel_name
                    ))
                })?;
                destination_endpoint(channel, destination)?
            }
            None => output_endpoint(channel)?,
        };

        let input_url = checked_url(&input)?;
        let output_url = checked_url(&output)?;
        let stats_path = self.layout.stats_path(&channel.channel_name, destination_index)?;
        let log_path = self.layout.log_path(&channel.channel_name, destination_index)?;

        let interval = self.stats_interval_ms.to_string();
        let mut args = vec![
            self.program.clone(),
            input_url,
            output_url,
            "-s".to_string(),
            interval.clone(),
            format!("-stats-report-frequency:{interval}"),
            "-statspf:csv".to_string(),
            format!("-statsout:{}", stats_path.display()),
        ];
        if channel.auto_reconnect {
            args.push("-a".to_string());
        }
        if let Some(level) = &channel.log_level {
            args.push("-loglevel".to_string());
            args.push(level.clone());
        }

        Ok(RelayInvocation {
            index: destination_index,
            args,
            stats_path,
            log_path,
        })
    }

    /// `pkill -f` pattern matching any relay process of `channel_name`
    ///
    /// The relay takes no free-form tag, so processes are recognised by
    /// the telemetry path on their command line. The pattern is anchored
    /// on the whole file name, so `cam1` never matches `cam10` or `mycam1`.
    pub fn kill_pattern(&self, channel_name: &str) -> OrchestratorResult<String> {
        let stem = FileLayout::file_stem(channel_name, None)?;
        let program = std::path::Path::new(&self.program)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone());
        Ok(format!(
            r"{}.*-statsout:(.*/)?{}(_dest[0-9]+)?\.csv( |$)",
            escape_ere(&program),
            escape_ere(&stem)
        ))
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_PROGRAM, FileLayout::default())
    }
}

/// Escape POSIX extended regex metacharacters for `pkill -f`
fn escape_ere(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if ".[]()*+?{}|^$\\".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn checked_url(endpoint: &Endpoint) -> OrchestratorResult<String> {
    let url = endpoint.to_url();
    if !is_valid_endpoint(&url) {
        return Err(OrchestratorError::command_build(url, "does not match the relay endpoint grammar"));
    }
    Ok(url)
}
