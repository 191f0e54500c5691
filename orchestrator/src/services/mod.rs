//! Service implementations
//!
//! Real implementations of the I/O traits (process table, channel store,
//! media prober) and the services built on top of them.

pub mod aggregator;
pub mod channel_service;
pub mod channel_store;
pub mod media_prober;
pub mod monitor;
pub mod process_table;
pub mod supervisor;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use aggregator::{AllStats, LogsView, StatsAggregator, DEFAULT_LOG_LINES};
pub use channel_service::{AnalyticsSummary, ChannelEvent, ChannelService, FullInfo};
pub use channel_store::JsonChannelStore;
pub use media_prober::FfprobeMediaProber;
pub use monitor::{Monitor, PassReport};
pub use process_table::RealProcessTable;
pub use supervisor::Supervisor;
