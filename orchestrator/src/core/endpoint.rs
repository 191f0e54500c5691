//! Endpoint URL builder
//!
//! Renders `proto://host[:port][?k=v&...]` for the relay. Parameters keep
//! insertion order. Secret values (passphrases, stream ids) are
//! percent-encoded so that shell or query metacharacters inside them can
//! never split the query string.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use shared::Protocol;

/// Everything except `-`, `.` and `_` is escaped, so encoded values stay
/// inside the relay endpoint grammar
const SECRET_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    protocol: Protocol,
    host: String,
    port: Option<u16>,
    params: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            params: Vec::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Value of the first parameter named `key`
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Append a parameter unconditionally
    pub fn with_param(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// Append a parameter only when it differs from the field's default
    pub fn with_non_default<T>(self, key: &str, value: T, default: T) -> Self
    where
        T: PartialEq + fmt::Display,
    {
        if value == default {
            self
        } else {
            self.with_param(key, value)
        }
    }

    /// Append a non-empty text parameter verbatim
    pub fn with_text(self, key: &str, value: &str) -> Self {
        if value.is_empty() {
            self
        } else {
            self.with_param(key, value)
        }
    }

    /// Append a percent-encoded parameter; empty values are skipped
    pub fn with_secret(self, key: &str, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        let encoded = utf8_percent_encode(value, SECRET_ENCODE_SET).to_string();
        self.with_param(key, encoded)
    }

    /// Append operator-supplied `key=value` pairs, comma separated
    ///
    /// Pairs are forwarded verbatim and still subject to the endpoint
    /// grammar check in the command builder. Tokens without `=` are
    /// dropped.
    pub fn with_extra_params(mut self, raw: &str) -> Self {
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some((key, value)) = token.split_once('=') {
                self.params.push((key.to_string(), value.to_string()));
            }
        }
        self
    }

    pub fn to_url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}
