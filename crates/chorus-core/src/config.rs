use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::clock::DEFAULT_SKEW_THRESHOLD_SECS;
use crate::history::DEFAULT_MAX_CHARS;
use crate::payload::ANONYMOUS;

/// Environment variable that overrides the configured user name.
pub const USER_ENV: &str = "CHORUS_USER";

/// Project config directory, relative to the project root.
pub const PROJECT_DIR: &str = ".chorus";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period before a local edit is sent.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_skew_threshold_secs")]
    pub skew_threshold_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            skew_threshold_secs: default_skew_threshold_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store file, relative to the project root unless absolute.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user_name: String,
    pub store_path: PathBuf,
}

/// Load `.chorus/config.toml` under `project_root`, defaulting every field.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<config dir>/chorus/config.toml`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("chorus/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project config, user config, and environment.
///
/// # Errors
///
/// Returns an error if either config file is unreadable or malformed.
pub fn resolve_config(project_root: &Path) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;
    let user_name = resolve_user_name(env::var(USER_ENV).ok(), user.user);
    let store_path = if project.store.path.is_absolute() {
        project.store.path.clone()
    } else {
        project_root.join(&project.store.path)
    };

    Ok(EffectiveConfig {
        project,
        user_name,
        store_path,
    })
}

fn resolve_user_name(env_user: Option<String>, config_user: Option<String>) -> String {
    [env_user, config_user]
        .into_iter()
        .flatten()
        .map(|u| u.trim().to_owned())
        .find(|u| !u.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_owned())
}

const fn default_debounce_ms() -> u64 {
    500
}

const fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

const fn default_skew_threshold_secs() -> u64 {
    DEFAULT_SKEW_THRESHOLD_SECS
}

fn default_store_path() -> PathBuf {
    PathBuf::from(PROJECT_DIR).join("chorus.sqlite3")
}
