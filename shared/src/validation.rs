//! Channel validation and file-name sanitizing
//!
//! These are the invariants a configuration must hold before any relay
//! invocation is built from it.

use regex::Regex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::OnceLock;

use crate::channel::{Channel, Destination};
use crate::errors::ValidationError;

pub const MAX_CHANNEL_NAME_LEN: usize = 50;
pub const MIN_PASSPHRASE_LEN: usize = 10;
pub const MAX_PASSPHRASE_LEN: usize = 79;
pub const MIN_LATENCY_MS: u32 = 20;
pub const MAX_LATENCY_MS: u32 = 8000;
const MAX_FILE_STEM_LEN: usize = 100;
const RELAY_LOG_LEVELS: [&str; 6] = ["fatal", "error", "warning", "note", "info", "debug"];

fn channel_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid channel name pattern"))
}

fn hostname_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
            .expect("valid hostname pattern")
    })
}

pub fn validate_channel_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::channel_name(name, "cannot be empty"));
    }
    if name.chars().count() > MAX_CHANNEL_NAME_LEN {
        return Err(ValidationError::channel_name(name, "must be 50 characters or less"));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(ValidationError::channel_name(name, "cannot contain path traversal characters"));
    }
    if !channel_name_regex().is_match(name) {
        return Err(ValidationError::channel_name(
            name,
            "can only contain letters, numbers, hyphens, and underscores",
        ));
    }
    Ok(())
}

pub fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::Port { value: 0 });
    }
    Ok(())
}

pub fn validate_latency(latency: u32) -> Result<(), ValidationError> {
    if !(MIN_LATENCY_MS..=MAX_LATENCY_MS).contains(&latency) {
        return Err(ValidationError::Latency { value: latency });
    }
    Ok(())
}

/// Empty passphrases mean "no encryption" and are always accepted
pub fn validate_passphrase(field: &str, passphrase: &str) -> Result<(), ValidationError> {
    if passphrase.is_empty() {
        return Ok(());
    }
    let length = passphrase.chars().count();
    if !(MIN_PASSPHRASE_LEN..=MAX_PASSPHRASE_LEN).contains(&length) {
        return Err(ValidationError::Passphrase {
            field: field.to_string(),
            length,
        });
    }
    Ok(())
}

pub fn validate_key_length(field: &str, value: u32) -> Result<(), ValidationError> {
    match value {
        0 | 16 | 24 | 32 => Ok(()),
        _ => Err(ValidationError::KeyLength {
            field: field.to_string(),
            value,
        }),
    }
}

pub fn validate_ip(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::IpAddress { value: value.to_string() })
}

/// Accepts an IP literal or an RFC 1123 host name; empty is accepted
pub fn validate_host(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    if !hostname_regex().is_match(value) {
        return Err(ValidationError::Hostname { value: value.to_string() });
    }
    Ok(())
}

pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if !RELAY_LOG_LEVELS.contains(&level) {
        return Err(ValidationError::LogLevel { value: level.to_string() });
    }
    Ok(())
}

/// Parse an IPv4 multicast group (224.0.0.0-239.255.255.255)
pub fn parse_multicast_ip(value: &str) -> Result<Ipv4Addr, ValidationError> {
    let ip: Ipv4Addr = value
        .parse()
        .map_err(|_| ValidationError::IpAddress { value: value.to_string() })?;
    if !ip.is_multicast() {
        return Err(ValidationError::Multicast { value: value.to_string() });
    }
    Ok(ip)
}

/// Turn an arbitrary name into a safe file stem
///
/// Path separators become underscores, anything outside word characters,
/// whitespace, `-` and `.` is dropped, runs of whitespace and dashes
/// collapse to `_`, and the result is capped at 100 characters.
pub fn sanitize_file_stem(name: &str) -> Result<String, ValidationError> {
    let replaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace() || *c == '-' || *c == '.')
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c == ' ');

    let mut stem = String::with_capacity(trimmed.len());
    let mut in_run = false;
    for c in trimmed.chars() {
        if c == '-' || c.is_whitespace() {
            if !in_run {
                stem.push('_');
            }
            in_run = true;
        } else {
            stem.push(c);
            in_run = false;
        }
    }

    let stem: String = stem.chars().take(MAX_FILE_STEM_LEN).collect();
    if stem.is_empty() || stem == "." {
        return Err(ValidationError::FileName {
            value: name.to_string(),
            reason: "empty after sanitization".to_string(),
        });
    }
    Ok(stem)
}

fn validate_destination(index: usize, destination: &Destination) -> Result<(), ValidationError> {
    validate_port(destination.port)?;
    validate_host(&destination.host)?;
    if !destination.multicast_ip.is_empty() {
        parse_multicast_ip(&destination.multicast_ip)?;
    }
    validate_passphrase(&format!("destinations[{index}].passphrase"), &destination.passphrase)?;
    if let Some(keylen) = destination.pbkeylen {
        validate_key_length(&format!("destinations[{index}].pbkeylen"), keylen)?;
    }
    Ok(())
}

impl Channel {
    /// Check every configuration invariant; runtime fields are ignored
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_channel_name(&self.channel_name)?;
        validate_port(self.input_port)?;
        validate_port(self.output_port)?;
        if !self.input_ip.is_empty() {
            validate_ip(&self.input_ip)?;
        }
        validate_host(&self.destination_host)?;
        validate_latency(self.input_latency)?;
        validate_latency(self.output_latency)?;
        if !(5..=100).contains(&self.oheadbw) {
            return Err(ValidationError::OverheadBandwidth { value: self.oheadbw });
        }
        if !self.output_multicast_ip.is_empty() {
            parse_multicast_ip(&self.output_multicast_ip)?;
        }
        validate_passphrase("passphrase", &self.passphrase)?;
        validate_passphrase("input_passphrase", &self.input_passphrase)?;
        validate_passphrase("output_passphrase", &self.output_passphrase)?;
        validate_key_length("pbkeylen", self.pbkeylen)?;
        if let Some(keylen) = self.input_pbkeylen {
            validate_key_length("input_pbkeylen", keylen)?;
        }
        if let Some(keylen) = self.output_pbkeylen {
            validate_key_length("output_pbkeylen", keylen)?;
        }
        if let Some(level) = &self.log_level {
            validate_log_level(level)?;
        }
        for (index, destination) in self.destinations().iter().enumerate() {
            validate_destination(index, destination)?;
        }
        Ok(())
    }

    /// Normalise fields whose empty value has a defined meaning
    pub fn normalize(&mut self) {
        if self.input_ip.is_empty() {
            self.input_ip = "0.0.0.0".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_rules() {
        assert!(validate_channel_name("cam1").is_ok());
        assert!(validate_channel_name("cam_1-backup").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("../etc").is_err());
        assert!(validate_channel_name("a/b").is_err());
        assert!(validate_channel_name("cam 1").is_err());
        assert!(validate_channel_name(&"x".repeat(51)).is_err());
        assert!(validate_channel_name(&"x".repeat(50)).is_ok());
    }

    #[test]
    fn test_multicast_range() {
        assert!(parse_multicast_ip("239.1.1.1").is_ok());
        assert!(parse_multicast_ip("224.0.0.0").is_ok());
        assert_eq!(
            parse_multicast_ip("192.168.1.10"),
            Err(ValidationError::Multicast {
                value: "192.168.1.10".to_string()
            })
        );
        assert!(matches!(
            parse_multicast_ip("not-an-ip"),
            Err(ValidationError::IpAddress { .. })
        ));
    }

    #[test]
    fn test_passphrase_length() {
        assert!(validate_passphrase("passphrase", "").is_ok());
        assert!(validate_passphrase("passphrase", "short").is_err());
        assert!(validate_passphrase("passphrase", "long-enough-secret").is_ok());
        assert!(validate_passphrase("passphrase", &"p".repeat(80)).is_err());
    }

    #[test]
    fn test_log_level() {
        assert!(validate_log_level("info").is_ok());
        assert!(validate_log_level("warning").is_ok());
        assert!(validate_log_level("verbose").is_err());
        assert!(validate_log_level("info -o /tmp/x").is_err());
    }

    #[test]
    fn test_host_accepts_names_and_ips() {
        assert!(validate_host("viewer.example").is_ok());
        assert!(validate_host("10.0.0.5").is_ok());
        assert!(validate_host("").is_ok());
        assert!(validate_host("bad host;rm").is_err());
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("cam1").unwrap(), "cam1");
        assert_eq!(sanitize_file_stem("my channel").unwrap(), "my_channel");
        assert_eq!(sanitize_file_stem("../../etc/passwd").unwrap(), "_.._etc_passwd");
        assert_eq!(sanitize_file_stem("a--b").unwrap(), "a_b");
        assert!(sanitize_file_stem("...").is_err());
        assert_eq!(sanitize_file_stem(&"z".repeat(150)).unwrap().len(), 100);
    }

    #[test]
    fn test_channel_validate() {
        let mut channel = Channel::new("cam1");
        assert!(channel.validate().is_ok());

        channel.output_multicast_ip = "10.0.0.1".to_string();
        assert!(matches!(channel.validate(), Err(ValidationError::Multicast { .. })));

        channel.output_multicast_ip = "239.0.0.1".to_string();
        channel.input_latency = 5;
        assert!(matches!(channel.validate(), Err(ValidationError::Latency { value: 5 })));

        channel.input_latency = 200;
        channel.input_port = 0;
        assert!(matches!(channel.validate(), Err(ValidationError::Port { value: 0 })));
    }

    #[test]
    fn test_destination_validation_is_indexed() {
        let mut channel = Channel::new("cam1");
        channel.destinations = Some(vec![
            Destination::default(),
            Destination {
                passphrase: "tiny".to_string(),
                ..Default::default()
            },
        ]);
        match channel.validate() {
            Err(ValidationError::Passphrase { field, .. }) => assert_eq!(field, "destinations[1].passphrase"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
