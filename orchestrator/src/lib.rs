//! Channel process orchestrator
//!
//! Supervises `srt-live-transmit` relay processes, one or more per
//! configured channel: builds their endpoint URLs and argument vectors,
//! spawns and stops them, reconciles declared status against the process
//! table and aggregates the telemetry and logs they write.

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod state;
pub mod traits;

// Re-export commonly used types
pub use config::{RealChannelService, Settings};
pub use core::{CommandBuilder, Endpoint, FileLayout, RelayInvocation, TimeWindow};
pub use error::{OrchestratorError, OrchestratorResult};
pub use services::{ChannelEvent, ChannelService, Monitor, Supervisor};
pub use state::RuntimeState;
pub use traits::{ChannelStore, MediaProber, ProcessTable};
