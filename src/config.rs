/// Run configuration
///
/// Values are layered, lowest priority first:
/// 1. built-in defaults
/// 2. a TOML config file (`--config`, or `config.toml` in the user's
///    config directory; a missing file is fine)
/// 3. `BLOCKRESCUE_*` environment variables
/// 4. command-line flags, applied by the binary
///
/// [`RescueConfig::validate`] runs once after all layers are merged.
use crate::engine::{ScanSettings, DEFAULT_PROGRESS_INTERVAL};
use crate::{BlockRange, RescueError, RescueResult};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Appended to the destination name to get the default state file
pub const STATE_FILE_SUFFIX: &str = ".bitmap";

pub const ENV_PREFIX: &str = "BLOCKRESCUE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RescueConfig {
    /// Transfer unit in bytes
    pub block_size: usize,
    /// State store path; defaults to `<destination>.bitmap`
    pub state_file: Option<PathBuf>,
    pub abort_on_error: bool,
    /// Exponential step growth over failures
    pub skip: bool,
    /// Skip blocks that already failed this often (0 = disabled)
    pub skip_fail: u32,
    /// Copy tries per block visit
    pub retry_count: u32,
    pub start_block: u64,
    /// Exclusive; defaults to the number of whole blocks in the source
    pub end_block: Option<u64>,
    pub reverse: bool,
    pub good_range: u64,
    pub failed_range: u64,
    /// Jump scan run length (0 = linear scan)
    pub jump: u64,
    /// Stop the jump scan after this many anchors
    pub max_jumps: Option<u64>,
    /// Seed for jump anchors
    pub seed: Option<u64>,
    /// fdatasync the destination and the state file for every block
    pub sync_state: bool,
    /// Append failed attempts to this file
    pub bad_block_log: Option<PathBuf>,
    pub progress_interval: u64,
}

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            state_file: None,
            abort_on_error: false,
            skip: false,
            skip_fail: 0,
            retry_count: 1,
            start_block: 0,
            end_block: None,
            reverse: false,
            good_range: 0,
            failed_range: 0,
            jump: 0,
            max_jumps: None,
            seed: None,
            sync_state: false,
            bad_block_log: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl RescueConfig {
    /// Load defaults, the config file and the environment.
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(explicit_file: Option<&Path>) -> RescueResult<Self> {
        let mut builder = Config::builder();

        match explicit_file {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_file() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let loaded: RescueConfig = config.try_deserialize()?;
        tracing::debug!(config = ?loaded, "Loaded configuration");
        Ok(loaded)
    }

    /// Check option values. Run once, before any file is opened.
    pub fn validate(&self) -> RescueResult<()> {
        if self.block_size == 0 {
            return Err(RescueError::InvalidConfig(
                "block size must be greater than 0".to_string(),
            ));
        }
        if self.retry_count == 0 {
            return Err(RescueError::InvalidConfig(
                "retry count must be at least 1".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(RescueError::InvalidConfig(
                "progress interval must be at least 1".to_string(),
            ));
        }
        if let Some(end) = self.end_block {
            if self.start_block >= end {
                return Err(RescueError::InvalidRange {
                    start: self.start_block,
                    end,
                });
            }
        }
        if self.max_jumps.is_some() && self.jump == 0 {
            tracing::warn!("max_jumps has no effect without jump mode");
        }
        if self.reverse && self.jump > 0 {
            tracing::warn!("reverse has no effect in jump mode");
        }
        Ok(())
    }

    /// State file for `destination`: the configured one, or
    /// `<destination>.bitmap`
    pub fn state_path(&self, destination: &Path) -> PathBuf {
        match &self.state_file {
            Some(path) => path.clone(),
            None => {
                let mut name = destination.as_os_str().to_owned();
                name.push(STATE_FILE_SUFFIX);
                PathBuf::from(name)
            }
        }
    }

    /// Resolve the block range against a source of `source_len` bytes
    pub fn resolve_range(&self, source_len: u64) -> RescueResult<BlockRange> {
        let end = match self.end_block {
            Some(end) => end,
            None => source_len / self.block_size.max(1) as u64,
        };
        BlockRange::new(self.start_block, end)
    }

    /// Engine settings for `range`
    pub fn scan_settings(&self, range: BlockRange) -> ScanSettings {
        ScanSettings {
            range,
            retry_count: self.retry_count,
            abort_on_error: self.abort_on_error,
            skip: self.skip,
            skip_fail: self.skip_fail,
            reverse: self.reverse,
            good_range: self.good_range,
            failed_range: self.failed_range,
            jump: self.jump,
            max_jumps: self.max_jumps,
            sync_state: self.sync_state,
            progress_interval: self.progress_interval,
        }
    }
}

/// `config.toml` in the platform config directory, if there is one
pub fn default_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "blockrescue")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
