//! Configuration loading for TheStuu
//!
//! The user data root holds everything the engine persists:
//!
//! ```text
//! <data root>/
//!   projects/      one .stu per project
//!   media/         uploaded sources
//!   config.json    audio device selection, default project, gateway bind
//! ```
//!
//! `config.json` is optional; a missing file means defaults. Unknown keys
//! are ignored so older engines can open newer configs. Environment
//! variables (`THESTUU_*`) override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Audio device selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Substring match against device names; None = system default
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_block_size() -> u32 {
    256
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
        }
    }
}

/// Control channel bind address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3630
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Contents of `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default = "default_project_name")]
    pub default_project: String,
    #[serde(default)]
    pub gateway: GatewaySettings,
}

fn default_project_name() -> String {
    "Untitled".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            audio: AudioSettings::default(),
            default_project: default_project_name(),
            gateway: GatewaySettings::default(),
        }
    }
}

/// Resolved filesystem layout of the user data root
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub projects_dir: PathBuf,
    pub media_dir: PathBuf,
    pub config_path: PathBuf,
}

impl DataPaths {
    /// Layout under an explicit root
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            projects_dir: root.join("projects"),
            media_dir: root.join("media"),
            config_path: root.join("config.json"),
            root,
        }
    }

    /// Platform default, honoring `THESTUU_DATA_DIR`
    pub fn discover() -> Self {
        if let Some(dir) = std::env::var_os("THESTUU_DATA_DIR") {
            return Self::under(PathBuf::from(dir));
        }
        let root = directories::ProjectDirs::from("", "", "thestuu")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".thestuu"));
        Self::under(root)
    }

    /// Create the directory tree
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.projects_dir)?;
        std::fs::create_dir_all(&self.media_dir)?;
        Ok(())
    }
}

impl EngineSettings {
    /// Load from `config.json`, then apply environment overrides.
    ///
    /// A missing file yields defaults; a malformed file is an error the
    /// caller may choose to surface or ignore.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let mut settings = if config_path.exists() {
            let text =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                    path: config_path.to_path_buf(),
                    source,
                })?;
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: config_path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            Self::default()
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("THESTUU_PORT") {
            if let Ok(port) = port.parse() {
                self.gateway.port = port;
            }
        }
        if let Ok(host) = std::env::var("THESTUU_HOST") {
            self.gateway.host = host;
        }
        if let Ok(device) = std::env::var("THESTUU_AUDIO_DEVICE") {
            self.audio.device = Some(device);
        }
        if let Ok(project) = std::env::var("THESTUU_DEFAULT_PROJECT") {
            self.default_project = project;
        }
    }

    /// Persist to `config.json`
    pub fn save(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).expect("settings always serialize");
        std::fs::write(config_path, json).map_err(|source| ConfigError::Write {
            path: config_path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(settings.gateway.port, 3630);
        assert_eq!(settings.audio.sample_rate, 48_000);
        assert_eq!(settings.default_project, "Untitled");
    }

    #[test]
    fn config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut settings = EngineSettings::default();
        settings.audio.device = Some("Scarlett".to_string());
        settings.gateway.port = 4000;
        settings.save(&path).unwrap();

        let loaded = EngineSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"default_project": "Jam", "future_feature": {"x": 1}}"#,
        )
        .unwrap();

        let settings = EngineSettings::load(&path).unwrap();
        assert_eq!(settings.default_project, "Jam");
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{nope").unwrap();
        assert!(matches!(
            EngineSettings::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn data_paths_layout() {
        let paths = DataPaths::under("/tmp/stu-test");
        assert_eq!(paths.projects_dir, PathBuf::from("/tmp/stu-test/projects"));
        assert_eq!(paths.media_dir, PathBuf::from("/tmp/stu-test/media"));
        assert_eq!(paths.config_path, PathBuf::from("/tmp/stu-test/config.json"));
    }

    #[test]
    fn ensure_creates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::under(dir.path().join("root"));
        paths.ensure().unwrap();
        assert!(paths.projects_dir.is_dir());
        assert!(paths.media_dir.is_dir());
    }
}
