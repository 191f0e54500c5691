//! Test helpers for orchestrator tests
//!
//! `Workspace` wires the real service stack (JSON store, OS process table)
//! into a temporary directory, with a shell script standing in for the
//! relay binary.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use orchestrator::services::{FfprobeMediaProber, JsonChannelStore, RealProcessTable};
use orchestrator::{ChannelService, CommandBuilder, FileLayout, RealChannelService, RuntimeState, Supervisor};

use super::fixtures::TestFixtures;

pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub relay: PathBuf,
    pub service: RealChannelService,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        // Unique per workspace so one test's kill sweep never matches another's relays
        let suffix = dir.path().file_name().unwrap().to_string_lossy().trim_start_matches('.').to_string();
        let relay = dir.path().join(format!("fake-relay-{suffix}"));
        std::fs::write(&relay, TestFixtures::FAKE_RELAY).unwrap();
        std::fs::set_permissions(&relay, std::fs::Permissions::from_mode(0o755)).unwrap();

        let layout = FileLayout::new(dir.path().join("stats"), dir.path().join("logs"));
        let builder = CommandBuilder::new(relay.display().to_string(), layout);
        let supervisor = Supervisor::new(Arc::new(RealProcessTable::new()), builder)
            .with_settle_delay(Duration::from_millis(50));
        let service = ChannelService::new(
            JsonChannelStore::new(dir.path().join("config.json")),
            supervisor,
            FfprobeMediaProber::new().with_program("/nonexistent/ffprobe"),
            Arc::new(RuntimeState::new(dir.path().join("stream_info_cache.json"))),
        );
        Self { dir, relay, service }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn config_json(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(self.path("config.json")).unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}

/// Common helper functions for test scenarios
pub struct TestHelpers;

impl TestHelpers {
    /// Poll until `path` exists and is non-empty
    pub async fn wait_for_file(path: &Path) -> bool {
        for _ in 0..100 {
            if std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Poll until `pid` no longer accepts signals or has become a zombie
    pub async fn wait_for_exit(pid: u32) -> bool {
        for _ in 0..100 {
            let status = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
            // Field 3 is the state; Z is a zombie waiting to be reaped
            let state = status.rsplit_once(')').and_then(|(_, rest)| rest.split_whitespace().next());
            if matches!(state, None | Some("Z") | Some("X")) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}
