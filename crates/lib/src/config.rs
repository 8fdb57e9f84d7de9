//! Engine configuration.
//!
//! Every field has a built-in default and can be overridden through an
//! `RMK_*` environment variable:
//!
//! - `RMK_SPEC_FILE` - entry script name inside a spec directory (default `build.lua`)
//! - `RMK_BUILD_DIR` - build output directory inside a spec directory (default `build`)
//! - `RMK_PLUGIN_PATH` - search path for script capabilities, in platform path-list syntax
//! - `RMK_ERROR_MODE` - `flatten` or `tagged`, see [`ErrorMode`]
//! - `RMK_SHELL` - shell used by `system()`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::consts::{BUILD_DIR, SPEC_FILENAME};

/// How the call memoizer rewraps a failing task's error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
  /// Keep only the message and traceback text of the original error.
  #[default]
  Flatten,
  /// Also keep a tag naming the kind of the original error.
  Tagged,
}

impl ErrorMode {
  pub fn as_str(self) -> &'static str {
    match self {
      ErrorMode::Flatten => "flatten",
      ErrorMode::Tagged => "tagged",
    }
  }
}

impl fmt::Display for ErrorMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ErrorMode {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "flatten" => Ok(ErrorMode::Flatten),
      "tagged" => Ok(ErrorMode::Tagged),
      other => Err(ConfigError::InvalidErrorMode(other.to_string())),
    }
  }
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid error mode '{0}' (expected 'flatten' or 'tagged')")]
  InvalidErrorMode(String),
}

/// Settings for one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  /// Entry script name resolved inside directories.
  pub spec_filename: String,

  /// Name of the build output directory inside each spec directory.
  pub build_dir: String,

  /// Directories searched for `<name>.lua` script capabilities.
  pub plugin_dirs: Vec<PathBuf>,

  /// How failing task errors are rewrapped.
  pub error_mode: ErrorMode,

  /// Shell used for `system()`. `None` selects the platform default.
  pub shell: Option<String>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      spec_filename: SPEC_FILENAME.to_string(),
      build_dir: BUILD_DIR.to_string(),
      plugin_dirs: Vec::new(),
      error_mode: ErrorMode::default(),
      shell: None,
    }
  }
}

impl EngineConfig {
  /// Build a configuration from defaults and `RMK_*` overrides.
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = Self::default();

    if let Some(name) = non_empty_var("RMK_SPEC_FILE") {
      config.spec_filename = name;
    }
    if let Some(dir) = non_empty_var("RMK_BUILD_DIR") {
      config.build_dir = dir;
    }
    if let Some(paths) = std::env::var_os("RMK_PLUGIN_PATH") {
      config.plugin_dirs = std::env::split_paths(&paths)
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    }
    if let Some(mode) = non_empty_var("RMK_ERROR_MODE") {
      config.error_mode = mode.parse()?;
    }
    config.shell = non_empty_var("RMK_SHELL");

    Ok(config)
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
