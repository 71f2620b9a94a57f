use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Scope used when no config file sets one.
const DEFAULT_SCOPE: &str = "http://localhost:8080/";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin and base path the widgets are served from. Core assets resolve
  /// against it and it decides what counts as same-origin.
  #[serde(default = "default_scope")]
  pub scope: String,
  /// Cache database path (defaults to the user data directory)
  pub database: Option<PathBuf>,
  /// Directory for the log file (defaults to the user data directory)
  pub log_dir: Option<PathBuf>,
}

fn default_scope() -> String {
  DEFAULT_SCOPE.to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      scope: default_scope(),
      database: None,
      log_dir: None,
    }
  }
}

/// Per-user data directory for the database and logs.
pub fn data_dir() -> PathBuf {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .unwrap_or_else(|| PathBuf::from("."))
    .join("devtoolkit-cache")
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./devtoolkit-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/devtoolkit-cache/config.yaml
  ///
  /// With no file found the built-in defaults apply.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("devtoolkit-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("devtoolkit-cache").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    // Reject a bad scope at load time rather than on first request
    config.scope_url()?;
    Ok(config)
  }

  /// The scope as a URL. A missing trailing slash is added so relative
  /// asset paths resolve inside it.
  pub fn scope_url(&self) -> Result<Url> {
    let mut scope = self.scope.clone();
    if !scope.ends_with('/') {
      scope.push('/');
    }
    let url = Url::parse(&scope).map_err(|e| eyre!("Invalid scope URL {}: {}", self.scope, e))?;
    if url.cannot_be_a_base() {
      return Err(eyre!("Scope URL {} cannot be used as a base", self.scope));
    }
    Ok(url)
  }

  pub fn database_path(&self) -> PathBuf {
    self
      .database
      .clone()
      .unwrap_or_else(|| data_dir().join("cache.db"))
  }

  pub fn log_dir(&self) -> PathBuf {
    self.log_dir.clone().unwrap_or_else(data_dir)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.scope_url().unwrap().as_str(), "http://localhost:8080/");
    assert!(config.database_path().ends_with("devtoolkit-cache/cache.db"));
  }

  #[test]
  fn test_parse_full_config() {
    let config = Config::parse(
      "scope: https://tools.example.test/devtoolkit\ndatabase: /tmp/dt/cache.db\nlog_dir: /tmp/dt/logs\n",
    )
    .unwrap();

    assert_eq!(
      config.scope_url().unwrap().as_str(),
      "https://tools.example.test/devtoolkit/"
    );
    assert_eq!(config.database_path(), PathBuf::from("/tmp/dt/cache.db"));
    assert_eq!(config.log_dir(), PathBuf::from("/tmp/dt/logs"));
  }

  #[test]
  fn test_parse_partial_config_uses_default_scope() {
    let config = Config::parse("database: cache.db\n").unwrap();
    assert_eq!(config.scope, DEFAULT_SCOPE);
  }

  #[test]
  fn test_parse_rejects_bad_scope() {
    assert!(Config::parse("scope: not a url\n").is_err());
    assert!(Config::parse("scope: \"mailto:someone@example.test\"\n").is_err());
  }

  #[test]
  fn test_load_explicit_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("config.yaml");
    std::fs::write(&path, "scope: https://tools.example.test/\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.scope, "https://tools.example.test/");
  }

  #[test]
  fn test_load_missing_explicit_path_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("absent.yaml");

    assert!(Config::load(Some(&path)).is_err());
  }
}
