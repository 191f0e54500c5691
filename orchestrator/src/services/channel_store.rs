//! JSON file channel store
//!
//! The configuration lives in one JSON document shared with the
//! authentication layer. Saves hold an exclusive `flock` on a sibling
//! `.lock` file, write a temp file and rename it over the original, so a
//! reader never sees a half-written document.

use async_trait::async_trait;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use shared::{component_debug, component_warn, Channel, ComponentId, ConfigDocument};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::ChannelStore;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

pub struct JsonChannelStore {
    path: PathBuf,
}

impl JsonChannelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, ".lock")
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn read_document(path: &Path) -> OrchestratorResult<ConfigDocument> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(ConfigDocument::parse(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigDocument::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_locked(path: &Path, lock_path: &Path, channels: Vec<Channel>) -> OrchestratorResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let lock_file = OpenOptions::new().create(true).truncate(false).write(true).open(lock_path)?;
    let _lock = Flock::lock(lock_file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| OrchestratorError::store(format!("cannot lock {}: {errno}", lock_path.display())))?;

    let users = match read_document(path) {
        Ok(existing) => existing.users,
        Err(e) => {
            component_warn!(
                ComponentId::current(),
                "⚠️ Existing config {} unreadable ({}), user accounts not carried over",
                path.display(),
                e
            );
            Vec::new()
        }
    };
    let body = ConfigDocument { channels, users }.to_json()?;

    let tmp_path = sibling(path, &format!(".tmp.{}", std::process::id()));
    let mut tmp = File::create(&tmp_path)?;
    tmp.write_all(body.as_bytes())?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[async_trait]
impl ChannelStore for JsonChannelStore {
    async fn load(&self) -> OrchestratorResult<Vec<Channel>> {
        let path = self.path.clone();
        let document = tokio::task::spawn_blocking(move || read_document(&path))
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))??;
        component_debug!(
            ComponentId::current(),
            "📂 Loaded {} channel(s) from {}",
            document.channels.len(),
            self.path.display()
        );
        Ok(document.channels)
    }

    async fn save(&self, channels: &[Channel]) -> OrchestratorResult<()> {
        let path = self.path.clone();
        let lock_path = self.lock_path();
        let channels = channels.to_vec();
        tokio::task::spawn_blocking(move || write_locked(&path, &lock_path, channels))
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))?
    }
}
