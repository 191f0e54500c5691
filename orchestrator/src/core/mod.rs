//! Core business logic modules
//!
//! This module contains pure business logic with no I/O dependencies.
//! All functions are deterministic and easily testable.

pub mod command;
pub mod endpoint;
pub mod layout;
pub mod probe;
pub mod telemetry;

pub use command::{CommandBuilder, RelayInvocation, Security};
pub use endpoint::Endpoint;
pub use layout::FileLayout;
pub use probe::{ProbeReport, ProbeStatus};
pub use telemetry::{FleetSummary, StatsSeries, TelemetryRead, TelemetryRecord, TimeWindow};
