//! Optional capability bundles a spec can mix in with `plugin(name)`.
//!
//! The registry is built once per build: the built-in capabilities plus one
//! script capability per `<name>.lua` found in the configured plugin
//! directories. Built-ins and earlier directories win on name clashes.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use tracing::{debug, warn};

use super::{CcCapability, SpecFile};
use crate::config::EngineConfig;
use crate::lua::loaders;

/// A named set of operations installed into a spec.
pub trait Capability {
  fn name(&self) -> &str;

  /// Add this capability's operations to `spec`.
  fn install(&self, lua: &Lua, spec: &SpecFile) -> LuaResult<()>;
}

/// A capability written in Lua. Its script runs inside the spec's own
/// environment, so whatever it defines becomes part of the spec.
#[derive(Debug, Clone)]
pub struct ScriptCapability {
  name: String,
  path: PathBuf,
}

impl ScriptCapability {
  pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Self {
      name: name.into(),
      path: path.into(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Capability for ScriptCapability {
  fn name(&self) -> &str {
    &self.name
  }

  fn install(&self, lua: &Lua, spec: &SpecFile) -> LuaResult<()> {
    loaders::exec_file(lua, &self.path, spec.env())
  }
}

#[derive(Default, Clone)]
pub struct CapabilityRegistry {
  entries: BTreeMap<String, Rc<dyn Capability>>,
}

impl fmt::Debug for CapabilityRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CapabilityRegistry")
      .field("names", &self.names())
      .finish()
  }
}

impl CapabilityRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Built-ins plus script capabilities from `config.plugin_dirs`.
  pub fn discover(config: &EngineConfig) -> Self {
    let mut registry = Self::new();
    registry.register(CcCapability::new(config.shell.clone()));

    for dir in &config.plugin_dirs {
      let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
          warn!(dir = %dir.display(), error = %err, "skipping plugin directory");
          continue;
        }
      };
      let mut scripts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "lua"))
        .collect();
      scripts.sort();

      for script in scripts {
        let Some(name) = script.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
          continue;
        };
        if registry.entries.contains_key(&name) {
          debug!(plugin = %name, path = %script.display(), "shadowed plugin ignored");
          continue;
        }
        registry.register(ScriptCapability::new(name, script));
      }
    }

    registry
  }

  pub fn register<C: Capability + 'static>(&mut self, capability: C) {
    self
      .entries
      .insert(capability.name().to_string(), Rc::new(capability));
  }

  pub fn get(&self, name: &str) -> Option<Rc<dyn Capability>> {
    self.entries.get(name).cloned()
  }

  pub fn names(&self) -> Vec<&str> {
    self.entries.keys().map(String::as_str).collect()
  }
}
