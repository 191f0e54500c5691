//! Media probe reports
//!
//! The probe connects to a channel's input as an extra consumer and asks
//! ffprobe what it carries. This module builds the probe URL and argument
//! list and turns ffprobe's JSON into a [`ProbeReport`]; running the tool
//! is the media prober service's job.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::Local;
use serde::{Deserialize, Serialize};
use shared::{Channel, Protocol, SrtMode};

use crate::core::endpoint::Endpoint;

/// Microseconds ffprobe may spend on analysis, probing and each read
const ANALYZE_DURATION_US: &str = "3000000";
const PROBE_SIZE_BYTES: &str = "3000000";
const RW_TIMEOUT_US: &str = "5000000";
const SOCKET_TIMEOUT_US: u32 = 3_000_000;
const UDP_BUFFER_BYTES: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Offline,
    Error,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTrack {
    pub index: u32,
    pub codec: String,
    pub profile: String,
    pub width: u32,
    pub height: u32,
    pub resolution: String,
    pub fps: f64,
    pub bitrate: Option<u64>,
    pub pix_fmt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub index: u32,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_layout: String,
    pub bitrate: Option<u64>,
    pub language: String,
}

/// What a probe found, or why it found nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub channel_name: String,
    pub status: ProbeStatus,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub total_bitrate: Option<u64>,
    #[serde(default)]
    pub total_bitrate_mbps: Option<f64>,
    #[serde(default)]
    pub video_streams: Vec<VideoTrack>,
    #[serde(default)]
    pub audio_streams: Vec<AudioTrack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_update: String,
}

fn now() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

impl ProbeReport {
    fn empty(channel_name: &str, status: ProbeStatus) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            status,
            success: false,
            probe_url: None,
            format: None,
            total_bitrate: None,
            total_bitrate_mbps: None,
            video_streams: Vec::new(),
            audio_streams: Vec::new(),
            error: None,
            last_update: now(),
        }
    }

    pub fn offline(channel_name: &str, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::empty(channel_name, ProbeStatus::Offline)
        }
    }

    pub fn failed(channel_name: &str, status: ProbeStatus, probe_url: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            probe_url,
            error: Some(reason.into()),
            ..Self::empty(channel_name, status)
        }
    }

    /// Build a report from ffprobe's `-print_format json` output
    pub fn from_ffprobe(channel_name: &str, probe_url: &str, stdout: &str) -> Result<Self, serde_json::Error> {
        let output: FfprobeOutput = serde_json::from_str(stdout)?;

        let mut video_streams = Vec::new();
        let mut audio_streams = Vec::new();
        for stream in output.streams {
            match stream.codec_type.as_deref() {
                Some("video") => video_streams.push(stream.into_video()),
                Some("audio") => audio_streams.push(stream.into_audio()),
                _ => {}
            }
        }

        let format = output.format.unwrap_or_default();
        let total_bitrate = format.bit_rate.as_deref().and_then(|b| b.parse::<u64>().ok()).filter(|b| *b > 0);
        Ok(Self {
            success: true,
            probe_url: Some(probe_url.to_string()),
            format: Some(format.format_name.unwrap_or_else(|| "unknown".to_string())),
            total_bitrate,
            total_bitrate_mbps: total_bitrate.map(|b| round2(b as f64 / 1_000_000.0)),
            video_streams,
            audio_streams,
            ..Self::empty(channel_name, ProbeStatus::Online)
        })
    }

    /// Flag a cached report as stale because its channel stopped
    pub fn mark_offline(&mut self) {
        self.status = ProbeStatus::Offline;
        self.success = false;
    }

    pub fn resolution(&self) -> Option<&str> {
        self.video_streams.first().map(|v| v.resolution.as_str())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// URL ffprobe uses to read the channel's input
///
/// A listener input is reached as a caller on loopback; any other SRT
/// input is dialled at its configured address.
pub fn probe_url(channel: &Channel) -> String {
    match channel.input_protocol {
        Protocol::Udp => {
            let multicast = channel.input_ip.parse::<Ipv4Addr>().is_ok_and(|ip| ip.is_multicast());
            let host = if multicast {
                format!("@{}", channel.input_ip)
            } else {
                channel.input_ip.clone()
            };
            Endpoint::new(Protocol::Udp, host, Some(channel.input_port))
                .with_param("timeout", SOCKET_TIMEOUT_US)
                .with_param("buffer_size", UDP_BUFFER_BYTES)
                .to_url()
        }
        Protocol::Srt => {
            let host = match channel.input_mode {
                SrtMode::Listener => "127.0.0.1",
                _ => channel.input_ip.as_str(),
            };
            let passphrase = if channel.input_passphrase.is_empty() {
                &channel.passphrase
            } else {
                &channel.input_passphrase
            };
            Endpoint::new(Protocol::Srt, host, Some(channel.input_port))
                .with_param("mode", SrtMode::Caller)
                .with_param("timeout", SOCKET_TIMEOUT_US)
                .with_secret("passphrase", passphrase)
                .to_url()
        }
    }
}

/// ffprobe arguments, program excluded
pub fn probe_args(url: &str) -> Vec<String> {
    [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        "-analyzeduration",
        ANALYZE_DURATION_US,
        "-probesize",
        PROBE_SIZE_BYTES,
        "-rw_timeout",
        RW_TIMEOUT_US,
        url,
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    profile: Option<String>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
    pix_fmt: Option<String>,
    sample_rate: Option<String>,
    #[serde(default)]
    channels: u32,
    channel_layout: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl FfprobeStream {
    fn bitrate(&self) -> Option<u64> {
        self.bit_rate.as_deref().and_then(|b| b.parse().ok())
    }

    fn codec(&self) -> String {
        self.codec_name.clone().unwrap_or_else(|| "unknown".to_string())
    }

    fn into_video(self) -> VideoTrack {
        VideoTrack {
            index: self.index,
            codec: self.codec(),
            bitrate: self.bitrate(),
            fps: round2(parse_frame_rate(self.r_frame_rate.as_deref().unwrap_or("0/1"))),
            resolution: format!("{}x{}", self.width, self.height),
            profile: self.profile.unwrap_or_default(),
            width: self.width,
            height: self.height,
            pix_fmt: self.pix_fmt.unwrap_or_default(),
        }
    }

    fn into_audio(self) -> AudioTrack {
        AudioTrack {
            index: self.index,
            codec: self.codec(),
            bitrate: self.bitrate(),
            sample_rate: self.sample_rate.as_deref().and_then(|r| r.parse().ok()).unwrap_or(0),
            channels: self.channels,
            channel_layout: self.channel_layout.unwrap_or_default(),
            language: self.tags.get("language").cloned().unwrap_or_default(),
        }
    }
}

/// `30000/1001` or `25`; anything unparsable is 0
fn parse_frame_rate(raw: &str) -> f64 {
    match raw.split_once('/') {
        Some((num, den)) => match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(num), Ok(den)) if den > 0.0 => num / den,
            _ => 0.0,
        },
        None => raw.parse().unwrap_or(0.0),
    }
}
