//! Core types used throughout the relay orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::errors::ValidationError;

/// Global component identity - set once at startup
static COMPONENT_ID: OnceLock<ComponentId> = OnceLock::new();

/// Identifier of the running component, attached to every log line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentId {
    /// Long-running supervisor daemon
    Orchestrator,
    /// One-shot control command issued from the CLI
    Control,
}

impl ComponentId {
    /// Initialize the global component ID for the daemon
    pub fn init_orchestrator() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Orchestrator)
    }

    /// Initialize the global component ID for a control command
    pub fn init_control() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Control)
    }

    /// Get the global component ID, falling back to the daemon identity
    /// when nothing was initialized (library use, tests)
    pub fn current() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Orchestrator)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Orchestrator => write!(f, "orchestrator"),
            ComponentId::Control => write!(f, "control"),
        }
    }
}

/// Transport protocol of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Srt,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Srt => "srt",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "srt" => Ok(Protocol::Srt),
            "udp" => Ok(Protocol::Udp),
            other => Err(ValidationError::Protocol { value: other.to_string() }),
        }
    }
}

/// SRT connection-establishment role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SrtMode {
    #[default]
    Listener,
    Caller,
    Rendezvous,
}

impl SrtMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SrtMode::Listener => "listener",
            SrtMode::Caller => "caller",
            SrtMode::Rendezvous => "rendezvous",
        }
    }
}

impl fmt::Display for SrtMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SrtMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listener" => Ok(SrtMode::Listener),
            "caller" => Ok(SrtMode::Caller),
            "rendezvous" => Ok(SrtMode::Rendezvous),
            other => Err(ValidationError::Mode { value: other.to_string() }),
        }
    }
}

/// Declared lifecycle status of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Stopped,
    Running,
    Error,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Stopped => write!(f, "stopped"),
            ChannelStatus::Running => write!(f, "running"),
            ChannelStatus::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_round_trip_through_serde() {
        let json = serde_json::to_string(&Protocol::Udp).unwrap();
        assert_eq!(json, "\"udp\"");
        let parsed: Protocol = serde_json::from_str("\"srt\"").unwrap();
        assert_eq!(parsed, Protocol::Srt);
    }

    #[test]
    fn test_mode_parse_rejects_unknown() {
        assert_eq!("caller".parse::<SrtMode>().unwrap(), SrtMode::Caller);
        assert!("push".parse::<SrtMode>().is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ChannelStatus::Running.to_string(), "running");
        assert_eq!(ChannelStatus::default(), ChannelStatus::Stopped);
    }
}
