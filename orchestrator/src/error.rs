//! Orchestrator-specific error types

use shared::{SharedError, ValidationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid channel configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    CommandBuild { endpoint: String, reason: String },

    #[error("Failed to spawn relay for channel '{channel}': {message}")]
    Spawn { channel: String, message: String },

    #[error("Channel not found: {name}")]
    ChannelNotFound { name: String },

    #[error("Channel with this name already exists: {name}")]
    ChannelExists { name: String },

    #[error("Cannot update running channel '{name}'. Stop it first.")]
    ChannelRunning { name: String },

    #[error("Channel is already running: {name}")]
    AlreadyRunning { name: String },

    #[error("Channel is not running: {name}")]
    NotRunning { name: String },

    #[error("Configuration store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn command_build(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandBuild {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store { message: message.into() }
    }

    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::ChannelNotFound { name: name.into() }
    }

    /// HTTP-style status for the request layer: 4xx for anything rejected
    /// before a process was touched, 5xx for lifecycle and storage faults
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::CommandBuild { .. } | Self::ConfigurationError { .. } => 400,
            Self::ChannelRunning { .. } | Self::AlreadyRunning { .. } | Self::NotRunning { .. } => 400,
            Self::ChannelNotFound { .. } => 404,
            Self::ChannelExists { .. } => 409,
            Self::Spawn { .. }
            | Self::Store { .. }
            | Self::SharedError(_)
            | Self::IoError(_)
            | Self::JsonError(_) => 500,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
