/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! User preferences, read from `prefs.toml` in the platform config directory.
//! Every field is optional in the file; missing ones take their defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::blank_url;

const APP_DIR_NAME: &str = "spaceshell";
const PREFS_FILE_NAME: &str = "prefs.toml";

/// What "clear tabs" removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClearTabsPolicy {
    /// Every today tab in every space, regardless of the requested cutoff.
    #[default]
    AllToday,
    /// Only today tabs created at or after the requested cutoff.
    CreatedSince,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellPrefs {
    pub audio_probe_interval_ms: u64,
    /// Longest side of a captured snapshot. `None` keeps full resolution.
    pub snapshot_max_dimension: Option<u32>,
    pub blank_address: Url,
    pub blank_title: String,
    pub folder_title: String,
    pub default_profile_name: String,
    pub clear_tabs_policy: ClearTabsPolicy,
    /// Where the entity store lives. Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for ShellPrefs {
    fn default() -> Self {
        Self {
            audio_probe_interval_ms: 1500,
            snapshot_max_dimension: Some(1024),
            blank_address: blank_url(),
            blank_title: "New Tab".to_string(),
            folder_title: "New Folder".to_string(),
            default_profile_name: "Default".to_string(),
            clear_tabs_policy: ClearTabsPolicy::AllToday,
            data_dir: None,
        }
    }
}

impl ShellPrefs {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(PREFS_FILE_NAME))
    }

    /// Load from the default location; a missing file yields defaults.
    pub fn load_default_location() -> Result<Self, PrefsError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                debug!("No prefs at {}; using defaults", path.display());
                Ok(Self::default())
            },
            None => {
                warn!("No platform config directory; using default prefs");
                Ok(Self::default())
            },
        }
    }

    pub fn load(path: &Path) -> Result<Self, PrefsError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PrefsError::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, PrefsError> {
        let prefs: Self = toml::from_str(raw).map_err(|e| PrefsError::Parse(e.to_string()))?;
        prefs.validate()?;
        Ok(prefs)
    }

    fn validate(&self) -> Result<(), PrefsError> {
        if self.audio_probe_interval_ms == 0 {
            return Err(PrefsError::Invalid(
                "audio_probe_interval_ms must be positive".to_string(),
            ));
        }
        if self.default_profile_name.trim().is_empty() {
            return Err(PrefsError::Invalid(
                "default_profile_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn audio_probe_interval(&self) -> Duration {
        Duration::from_millis(self.audio_probe_interval_ms)
    }

    /// Configured data directory, else the platform one.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefsError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for PrefsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefsError::Io(e) => write!(f, "could not read prefs: {e}"),
            PrefsError::Parse(e) => write!(f, "could not parse prefs: {e}"),
            PrefsError::Invalid(e) => write!(f, "invalid prefs: {e}"),
        }
    }
}

impl std::error::Error for PrefsError {}
