//! Build specs.
//!
//! A spec is a Lua script bound to one directory. Its top-level functions are
//! its tasks. Specs are loaded on demand through the [`SpecLoader`], which
//! keeps one memoized [`SpecProxy`] per script for the whole build.

mod cc;
mod helpers;
mod loader;
mod plugin;
mod proxy;

pub use cc::CcCapability;
pub use loader::SpecLoader;
pub use plugin::{Capability, CapabilityRegistry, ScriptCapability};
pub use proxy::{SpecProxy, signature};

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use thiserror::Error;

use crate::consts::CACHE_DIR;

/// Errors loading specs or resolving their operations.
#[derive(Debug, Error)]
pub enum SpecError {
  #[error("build spec not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to load {path}: {source}")]
  Load {
    path: PathBuf,
    #[source]
    source: LuaError,
  },

  #[error("{0} references itself while loading")]
  Cycle(PathBuf),

  #[error("unknown plugin '{0}'")]
  UnknownPlugin(String),

  #[error("unknown task '{task}' in {spec}")]
  UnknownTask { task: String, spec: PathBuf },

  #[error("'{name}' in {spec} is not callable")]
  NotCallable { name: String, spec: PathBuf },

  #[error("spec is no longer loaded")]
  Unloaded,

  #[error(transparent)]
  Lua(#[from] LuaError),
}

impl From<SpecError> for LuaError {
  fn from(err: SpecError) -> Self {
    match err {
      SpecError::Lua(err) => err,
      other => LuaError::external(other),
    }
  }
}

/// One loaded spec script.
#[derive(Debug)]
pub struct SpecFile {
  path: PathBuf,
  dir: PathBuf,
  build_dir: PathBuf,
  /// Definitions made by the script and mixed-in capabilities.
  env: LuaTable,
  /// The helper surface (`dir`, `file`, `project`, ...), behind `env`.
  helpers: LuaTable,
  plugins: RefCell<BTreeSet<String>>,
}

impl SpecFile {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn build_dir(&self) -> &Path {
    &self.build_dir
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.build_dir.join(CACHE_DIR)
  }

  pub fn env(&self) -> &LuaTable {
    &self.env
  }

  /// Qualify `name` with the spec's directory unless it is absolute.
  pub fn resolve(&self, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.dir.join(path)
    }
  }

  /// Look up an operation: script definitions first, then helpers.
  pub fn operation(&self, name: &str) -> LuaResult<Option<LuaValue>> {
    let value: LuaValue = self.env.raw_get(name)?;
    if !value.is_nil() {
      return Ok(Some(value));
    }
    let value: LuaValue = self.helpers.raw_get(name)?;
    Ok((!value.is_nil()).then_some(value))
  }

  /// The function implementing task `name`.
  pub fn task(&self, name: &str) -> Result<LuaFunction, SpecError> {
    match self.operation(name)? {
      Some(LuaValue::Function(func)) => Ok(func),
      Some(_) => Err(SpecError::NotCallable {
        name: name.to_string(),
        spec: self.path.clone(),
      }),
      None => Err(SpecError::UnknownTask {
        task: name.to_string(),
        spec: self.path.clone(),
      }),
    }
  }

  /// Record that capability `name` is installed. Returns false if it already was.
  pub fn mark_plugin(&self, name: &str) -> bool {
    self.plugins.borrow_mut().insert(name.to_string())
  }

  pub fn unmark_plugin(&self, name: &str) {
    self.plugins.borrow_mut().remove(name);
  }
}
