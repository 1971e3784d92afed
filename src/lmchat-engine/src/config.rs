//! Persisted client settings.
//!
//! Settings live in `<home>/settings.toml` where `<home>` is `LMCHAT_HOME`
//! or `~/.lmchat`. A missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Settings file name.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Environment variable overriding the settings directory.
pub const LMCHAT_HOME_ENV: &str = "LMCHAT_HOME";

/// Display theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

/// Connection and display preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server root, without `/v1`.
    pub base_url: String,
    pub theme: Theme,
    /// Request streamed replies.
    pub stream: bool,
    pub temperature: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: lmchat_lmstudio::DEFAULT_LMSTUDIO_URL.to_string(),
            theme: Theme::default(),
            stream: true,
            temperature: lmchat_lmstudio::DEFAULT_TEMPERATURE,
        }
    }
}

/// Find the lmchat home directory.
///
/// Checks `LMCHAT_HOME` first, then falls back to `~/.lmchat`.
pub fn find_lmchat_home() -> Result<PathBuf> {
    if let Ok(val) = std::env::var(LMCHAT_HOME_ENV)
        && !val.is_empty()
    {
        let path = PathBuf::from(val);
        debug!(path = %path.display(), "Using LMCHAT_HOME");
        return Ok(path);
    }

    dirs::home_dir()
        .map(|home| home.join(".lmchat"))
        .ok_or_else(|| EngineError::Config("Home directory not found".to_string()))
}

impl Settings {
    /// Default settings file location.
    pub fn default_path() -> Result<PathBuf> {
        Ok(find_lmchat_home()?.join(SETTINGS_FILE))
    }

    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        debug!(path = %path.display(), "Settings saved");
        Ok(())
    }
}
