use anyhow::Result;
use std::path::PathBuf;

use crate::core::recognizer;
use crate::core::region::RegionTable;
use crate::core::writer::{FilenamePolicy, RetentionPolicy};

/// Where the batch reads its videos from.
#[derive(Clone, Debug)]
pub enum InputSource {
    Video(PathBuf),
    Folder(PathBuf),
}

impl InputSource {
    pub fn describe(&self) -> String {
        match self {
            InputSource::Video(p) | InputSource::Folder(p) => p.display().to_string(),
        }
    }
}

/// Everything the batch driver needs, resolved once up front. The old
/// per-script constants (crop rectangles, thresholds, layouts) all live here
/// so one pipeline covers every recording setup.
#[derive(Clone, Debug)]
pub struct ExtractConfig {
    pub input: InputSource,
    pub output_folder: PathBuf,
    /// Process every Nth decoded frame.
    pub frame_interval: u64,
    pub region_table: RegionTable,
    pub whitelist: String,
    pub psm: u32,
    pub threshold: f64,
    pub threshold_max: f64,
    /// Seconds east of UTC for the overlay's wall clock.
    pub utc_offset_secs: i32,
    /// Accepted timestamp layouts, in order; empty means the defaults.
    pub layouts: Vec<String>,
    pub retention: RetentionPolicy,
    pub filenames: FilenamePolicy,
    /// Videos processed in parallel; 1 keeps everything sequential.
    pub jobs: usize,
}

impl ExtractConfig {
    /// Fail-fast checks that run before any frame work. This is the only
    /// error category that should exit non-zero without producing output.
    pub fn validate(&self) -> Result<()> {
        if self.frame_interval == 0 {
            anyhow::bail!("frame interval must be at least 1");
        }
        if self.jobs == 0 {
            anyhow::bail!("jobs must be at least 1");
        }
        match &self.input {
            InputSource::Folder(dir) if !dir.is_dir() => {
                anyhow::bail!("video folder does not exist: {}", dir.display());
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            input: InputSource::Folder(PathBuf::from(".")),
            output_folder: PathBuf::from("output"),
            frame_interval: 5,
            region_table: RegionTable::default(),
            whitelist: recognizer::DEFAULT_WHITELIST.to_string(),
            psm: recognizer::DEFAULT_PSM,
            threshold: recognizer::DEFAULT_THRESHOLD,
            threshold_max: recognizer::DEFAULT_THRESHOLD_MAX,
            utc_offset_secs: 0,
            layouts: Vec::new(),
            retention: RetentionPolicy::OnSuccess,
            filenames: FilenamePolicy::FromTimestamp,
            jobs: 1,
        }
    }
}
