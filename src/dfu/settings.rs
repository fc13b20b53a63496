//! Transfer settings with JSON persistence.
//!
//! Page size and write-chunk size depend on the target and on the BLE stack
//! the host runs, so both are tunable. Missing fields fall back to the
//! protocol defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::config::{CHUNK_SIZE, FLASH_PAGE_SIZE};
use super::error::{DfuError, DfuResult};

/// Tunable parameters of a DFU session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DfuSettings {
    /// Maximum data object size in bytes.
    pub flash_page_size: usize,

    /// Maximum bytes per packet-channel write.
    pub chunk_size: usize,

    /// Bound on each wait for a control point response, in milliseconds.
    /// `None` waits for as long as it takes.
    pub response_timeout_ms: Option<u64>,
}

impl Default for DfuSettings {
    fn default() -> Self {
        Self {
            flash_page_size: FLASH_PAGE_SIZE,
            chunk_size: CHUNK_SIZE,
            response_timeout_ms: None,
        }
    }
}

impl DfuSettings {
    /// Check that a session can run with these values.
    pub fn validate(&self) -> DfuResult<()> {
        if self.flash_page_size == 0 {
            return Err(invalid("flash_page_size must be greater than zero"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size must be greater than zero"));
        }
        if u32::try_from(self.flash_page_size).is_err() {
            return Err(invalid("flash_page_size must fit in 32 bits"));
        }
        if self.response_timeout_ms == Some(0) {
            return Err(invalid("response_timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    /// The response timeout as a duration.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_flash_page_size(mut self, flash_page_size: usize) -> Self {
        self.flash_page_size = flash_page_size;
        self
    }

    /// Bound each response wait. Rounds up to whole milliseconds, at least one.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        let mut millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if Duration::from_millis(millis) < timeout {
            millis = millis.saturating_add(1);
        }
        self.response_timeout_ms = Some(millis.max(1));
        self
    }
}

fn invalid(reason: &str) -> DfuError {
    DfuError::InvalidSettings {
        reason: reason.to_string(),
    }
}

/// Settings file name stored in the settings directory.
const SETTINGS_FILENAME: &str = "dfu_settings.json";

/// Manages persistence of DFU settings to a JSON file.
pub struct SettingsManager {
    settings_file_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager for the given directory.
    pub fn new(settings_dir: &Path) -> Self {
        let settings_file_path = settings_dir.join(SETTINGS_FILENAME);
        Self { settings_file_path }
    }

    /// Load settings from disk, returning defaults if the file doesn't exist.
    pub fn load(&self) -> DfuResult<DfuSettings> {
        if !self.settings_file_path.exists() {
            return Ok(DfuSettings::default());
        }

        let contents = fs::read_to_string(&self.settings_file_path)?;

        // Handle empty file gracefully
        if contents.trim().is_empty() {
            return Ok(DfuSettings::default());
        }

        let settings: DfuSettings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk.
    pub fn save(&self, settings: &DfuSettings) -> DfuResult<()> {
        settings.validate()?;

        if let Some(parent) = self.settings_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(settings)?;
        fs::write(&self.settings_file_path, contents)?;

        Ok(())
    }

    /// Get the path where settings are stored.
    pub fn settings_path(&self) -> &Path {
        &self.settings_file_path
    }
}
