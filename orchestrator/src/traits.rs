//! Trait definitions with mockall annotations for testing
//!
//! The orchestrator touches three things it does not own: the operating
//! system's process table, the configuration file and the media probe
//! tool. Each is reached through a trait here so the supervisor, the
//! service and the monitor can be exercised against mocks and fakes.

use shared::Channel;

use crate::core::command::RelayInvocation;
use crate::core::probe::ProbeReport;
use crate::error::OrchestratorResult;

/// Operating system process table abstraction
///
/// Spawning is detached: each relay gets its own process group so that a
/// group signal reaches any children it forks. The three kill operations
/// are the escalation steps of a stop and are kept separate so each can be
/// asserted on its own.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessTable: Send + Sync {
    /// Spawn one relay process
    ///
    /// # Parameters
    /// - `invocation`: argument vector (program first) and artifact paths
    ///
    /// stdout and stderr are appended to `invocation.log_path`.
    ///
    /// # Returns
    /// The OS process id of the new process
    async fn spawn(&self, invocation: &RelayInvocation) -> std::io::Result<u32>;

    /// Zero-signal existence probe
    fn exists(&self, pid: u32) -> bool;

    /// Send SIGTERM to the process group led by `pid`
    async fn kill_group(&self, pid: u32) -> std::io::Result<()>;

    /// Send SIGTERM to `pid` alone
    async fn kill_pid(&self, pid: u32) -> std::io::Result<()>;

    /// Terminate every process whose command line matches `pattern`
    ///
    /// Best effort; returns whether anything matched.
    async fn kill_matching(&self, pattern: &str) -> bool;
}

/// Persistent channel configuration
#[mockall::automock]
#[async_trait::async_trait]
pub trait ChannelStore: Send + Sync {
    /// Load every configured channel, in file order
    async fn load(&self) -> OrchestratorResult<Vec<Channel>>;

    /// Replace the stored channel list
    ///
    /// Anything else in the document (user accounts) is preserved.
    async fn save(&self, channels: &[Channel]) -> OrchestratorResult<()>;
}

/// Media analysis of a channel's input stream
///
/// A stream that is down or slow to answer is a normal outcome and comes
/// back as a report, not an error.
#[mockall::automock]
#[async_trait::async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, channel: &Channel) -> ProbeReport;
}

