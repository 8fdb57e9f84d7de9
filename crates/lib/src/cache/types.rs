//! Cache entry keys, dependencies and errors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mlua::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two source locations enclosing a `build_cache` call.
///
/// A tail call drops its caller's frame, so two call sites can share both
/// enclosing locations. `step` names where the step function was defined,
/// which for a closure literal is the call's own line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
  pub inner: String,
  pub outer: String,
  pub step: Option<String>,
}

impl CallSite {
  pub fn new(inner: impl Into<String>, outer: impl Into<String>) -> Self {
    Self {
      inner: inner.into(),
      outer: outer.into(),
      step: None,
    }
  }

  pub fn with_step(mut self, defined: impl Into<String>) -> Self {
    self.step = Some(defined.into());
    self
  }
}

impl fmt::Display for CallSite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} <- {}", self.inner, self.outer)?;
    if let Some(step) = &self.step {
      write!(f, " (step {step})")?;
    }
    Ok(())
  }
}

/// Something a cache entry's freshness depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Dependency {
  /// A file or directory; its modification time counts.
  Path { path: PathBuf },
  /// Another cache entry.
  Entry { path: PathBuf },
  /// A fixed modification time, in seconds since the epoch.
  Stamp { mtime: f64 },
}

impl Dependency {
  pub fn path(path: impl Into<PathBuf>) -> Self {
    Dependency::Path { path: path.into() }
  }

  pub fn entry(path: impl Into<PathBuf>) -> Self {
    Dependency::Entry { path: path.into() }
  }

  /// Modification time, or `None` when the file can't be stat'ed.
  pub fn mtime(&self) -> Option<SystemTime> {
    match self {
      Dependency::Path { path } | Dependency::Entry { path } => modified(path),
      Dependency::Stamp { mtime } => Duration::try_from_secs_f64(*mtime).ok().map(|d| UNIX_EPOCH + d),
    }
  }
}

impl fmt::Display for Dependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Dependency::Path { path } => write!(f, "{}", path.display()),
      Dependency::Entry { path } => write!(f, "entry:{}", path.display()),
      Dependency::Stamp { mtime } => write!(f, "mtime:{mtime}"),
    }
  }
}

pub(crate) fn modified(path: &Path) -> Option<SystemTime> {
  std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Errors reading or writing cache entries.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to read cache file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write cache file {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse cache file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize cache value: {0}")]
  Serialize(#[source] serde_json::Error),
}

impl From<CacheError> for LuaError {
  fn from(err: CacheError) -> Self {
    LuaError::external(err)
  }
}
