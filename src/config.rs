use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::layer::{HOMEWORK_TTL, NEWS_TTL, NOTIFICATIONS_TTL};
use crate::schedule::{
  DisplayMode, GroupSelection, RefreshPolicy, DATASET_TTL, DEFAULT_WEEKS_AHEAD,
  DEFAULT_WEEKS_BEHIND,
};

/// Environment variable holding the API bearer token.
pub const TOKEN_ENV: &str = "SCHEDULE_SYNC_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  pub group: GroupSelection,
  #[serde(default)]
  pub display_mode: DisplayMode,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub preload: PreloadConfig,
  #[serde(default)]
  pub refresh: ResumeConfig,
  /// SQLite file for the cache and the offline queue
  pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: String,
  /// Bearer token; `SCHEDULE_SYNC_TOKEN` takes precedence
  pub token: Option<String>,
}

/// TTL overrides in seconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  pub schedule_ttl: Option<u64>,
  pub homework_ttl: Option<u64>,
  pub news_ttl: Option<u64>,
  pub notifications_ttl: Option<u64>,
}

impl CacheConfig {
  pub fn schedule_ttl(&self) -> Duration {
    self.schedule_ttl.map_or(DATASET_TTL, Duration::from_secs)
  }

  pub fn homework_ttl(&self) -> Duration {
    self.homework_ttl.map_or(HOMEWORK_TTL, Duration::from_secs)
  }

  pub fn news_ttl(&self) -> Duration {
    self.news_ttl.map_or(NEWS_TTL, Duration::from_secs)
  }

  pub fn notifications_ttl(&self) -> Duration {
    self.notifications_ttl.map_or(NOTIFICATIONS_TTL, Duration::from_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreloadConfig {
  #[serde(default = "default_weeks_ahead")]
  pub weeks_ahead: u32,
  #[serde(default = "default_weeks_behind")]
  pub weeks_behind: u32,
}

fn default_weeks_ahead() -> u32 {
  DEFAULT_WEEKS_AHEAD
}

fn default_weeks_behind() -> u32 {
  DEFAULT_WEEKS_BEHIND
}

impl Default for PreloadConfig {
  fn default() -> Self {
    Self {
      weeks_ahead: DEFAULT_WEEKS_AHEAD,
      weeks_behind: DEFAULT_WEEKS_BEHIND,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeConfig {
  #[serde(default = "default_on_resume")]
  pub on_resume: bool,
  /// Seconds since the last sync below which a resume does not reload
  #[serde(default)]
  pub min_resume_interval: u64,
}

fn default_on_resume() -> bool {
  true
}

impl Default for ResumeConfig {
  fn default() -> Self {
    Self {
      on_resume: true,
      min_resume_interval: 0,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./schedule-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/schedule-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/schedule-sync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("schedule-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("schedule-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Bearer token from `SCHEDULE_SYNC_TOKEN`, falling back to the file.
  pub fn api_token(&self) -> Option<String> {
    std::env::var(TOKEN_ENV)
      .ok()
      .filter(|t| !t.is_empty())
      .or_else(|| self.api.token.clone())
  }

  pub fn refresh_policy(&self) -> RefreshPolicy {
    RefreshPolicy {
      resume_refresh: self.refresh.on_resume,
      ..RefreshPolicy::default()
    }
    .with_min_resume_interval(Duration::from_secs(self.refresh.min_resume_interval))
    .with_preload(self.preload.weeks_ahead, self.preload.weeks_behind)
  }
}
