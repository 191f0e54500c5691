//! Shared types for the SRT relay orchestrator
//!
//! Holds the channel configuration model, its validation rules, the error
//! taxonomy for rejected configurations and the logging conventions used
//! by every component.

pub mod channel;
pub mod errors;
pub mod logging;
pub mod types;
pub mod validation;

pub use channel::{Channel, ChannelUpdate, ConfigDocument, Destination, Source};
pub use errors::*;
pub use types::*;
