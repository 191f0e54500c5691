//! On-disk artifact layout
//!
//! Every relay process writes one telemetry CSV and one log file, named
//! after the sanitized channel name: `<name>.csv` for a single-output
//! channel, `<name>_dest<i>.csv` for fan-out process `i`.

use std::path::{Path, PathBuf};

use shared::validation::sanitize_file_stem;
use shared::{Channel, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    stats_dir: PathBuf,
    logs_dir: PathBuf,
}

impl FileLayout {
    pub fn new(stats_dir: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            stats_dir: stats_dir.into(),
            logs_dir: logs_dir.into(),
        }
    }

    pub fn stats_dir(&self) -> &Path {
        &self.stats_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// File stem for process `index` of `channel_name`
    pub fn file_stem(channel_name: &str, index: Option<usize>) -> Result<String, ValidationError> {
        let stem = sanitize_file_stem(channel_name)?;
        Ok(match index {
            Some(i) => format!("{stem}_dest{i}"),
            None => stem,
        })
    }

    pub fn stats_path(&self, channel_name: &str, index: Option<usize>) -> Result<PathBuf, ValidationError> {
        Ok(self.stats_dir.join(format!("{}.csv", Self::file_stem(channel_name, index)?)))
    }

    pub fn log_path(&self, channel_name: &str, index: Option<usize>) -> Result<PathBuf, ValidationError> {
        Ok(self.logs_dir.join(format!("{}.log", Self::file_stem(channel_name, index)?)))
    }

    /// Process indices of a channel: `[None]` or `[Some(0), .., Some(n-1)]`
    pub fn process_indices(channel: &Channel) -> Vec<Option<usize>> {
        if channel.has_destinations() {
            (0..channel.destinations().len()).map(Some).collect()
        } else {
            vec![None]
        }
    }

    /// One telemetry path per process the channel runs
    pub fn stats_paths(&self, channel: &Channel) -> Result<Vec<PathBuf>, ValidationError> {
        Self::process_indices(channel)
            .into_iter()
            .map(|index| self.stats_path(&channel.channel_name, index))
            .collect()
    }

    /// One log path per process the channel runs
    pub fn log_paths(&self, channel: &Channel) -> Result<Vec<PathBuf>, ValidationError> {
        Self::process_indices(channel)
            .into_iter()
            .map(|index| self.log_path(&channel.channel_name, index))
            .collect()
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.stats_dir)?;
        std::fs::create_dir_all(&self.logs_dir)
    }
}

impl Default for FileLayout {
    fn default() -> Self {
        Self::new("stats", "logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Destination;

    #[test]
    fn test_single_output_paths() {
        let layout = FileLayout::default();
        let channel = Channel::new("cam1");
        assert_eq!(layout.stats_paths(&channel).unwrap(), vec![PathBuf::from("stats/cam1.csv")]);
        assert_eq!(layout.log_paths(&channel).unwrap(), vec![PathBuf::from("logs/cam1.log")]);
    }

    #[test]
    fn test_fan_out_paths_are_suffixed() {
        let layout = FileLayout::new("/var/relay/stats", "/var/relay/logs");
        let mut channel = Channel::new("cam1");
        channel.destinations = Some(vec![Destination::default(), Destination::default()]);

        assert_eq!(
            layout.stats_paths(&channel).unwrap(),
            vec![
                PathBuf::from("/var/relay/stats/cam1_dest0.csv"),
                PathBuf::from("/var/relay/stats/cam1_dest1.csv"),
            ]
        );
        assert_eq!(
            layout.log_path("cam1", Some(1)).unwrap(),
            PathBuf::from("/var/relay/logs/cam1_dest1.log")
        );
    }

    #[test]
    fn test_names_cannot_escape_the_directory() {
        let layout = FileLayout::default();
        let path = layout.stats_path("../../etc/passwd", None).unwrap();
        assert!(path.starts_with("stats"));
        assert_eq!(path.components().count(), 2);
    }
}
