//! Shared error types for the relay orchestrator

use thiserror::Error;

/// Rejection of a channel configuration before anything touches the OS
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid channel name '{value}': {reason}")]
    ChannelName { value: String, reason: String },

    #[error("Port must be between 1 and 65535, got {value}")]
    Port { value: u32 },

    #[error("Protocol must be \"srt\" or \"udp\", got \"{value}\"")]
    Protocol { value: String },

    #[error("Mode must be \"listener\", \"caller\", or \"rendezvous\", got \"{value}\"")]
    Mode { value: String },

    #[error("Latency must be between 20 and 8000 ms, got {value}ms")]
    Latency { value: u32 },

    #[error("Passphrase for {field} must be 10 to 79 characters long, got {length}")]
    Passphrase { field: String, length: usize },

    #[error("Key length for {field} must be 0, 16, 24 or 32, got {value}")]
    KeyLength { field: String, value: u32 },

    #[error("Overhead bandwidth must be between 5% and 100%, got {value}%")]
    OverheadBandwidth { value: u32 },

    #[error("Invalid IP address format: {value}")]
    IpAddress { value: String },

    #[error("Invalid hostname format: {value}")]
    Hostname { value: String },

    #[error("IP {value} is not in multicast range (224.0.0.0-239.255.255.255)")]
    Multicast { value: String },

    #[error("Relay log level must be one of fatal, error, warning, note, info, debug; got \"{value}\"")]
    LogLevel { value: String },

    #[error("Invalid file name '{value}': {reason}")]
    FileName { value: String, reason: String },

    #[error("Time window must be one of 5m, 15m, 30m, 1h, 6h, 24h, 7d, all; got \"{value}\"")]
    TimeWindow { value: String },
}

impl ValidationError {
    pub fn channel_name(value: &str, reason: impl Into<String>) -> Self {
        Self::ChannelName {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

pub type SharedResult<T> = Result<T, SharedError>;
