//! The spec cache.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use tracing::{debug, info};

use super::{CapabilityRegistry, SpecError, SpecFile, SpecProxy, helpers};
use crate::config::EngineConfig;
use crate::graph::InvocationGraph;
use crate::lua::loaders;
use crate::memo::CallMemo;

/// Loads specs and keeps one memoized proxy per resolved script path.
pub struct SpecLoader {
  lua: Lua,
  config: EngineConfig,
  registry: CapabilityRegistry,
  graph: Rc<InvocationGraph>,
  specs: RefCell<HashMap<PathBuf, LuaAnyUserData>>,
  loading: RefCell<HashSet<PathBuf>>,
}

impl SpecLoader {
  pub fn new(lua: Lua, config: EngineConfig, registry: CapabilityRegistry, graph: Rc<InvocationGraph>) -> Rc<Self> {
    Rc::new(Self {
      lua,
      config,
      registry,
      graph,
      specs: RefCell::new(HashMap::new()),
      loading: RefCell::new(HashSet::new()),
    })
  }

  pub fn registry(&self) -> &CapabilityRegistry {
    &self.registry
  }

  /// Number of specs loaded so far.
  pub fn loaded(&self) -> usize {
    self.specs.borrow().len()
  }

  /// Resolve `target` to an absolute script path. A directory resolves to
  /// the entry script inside it.
  pub fn resolve(&self, target: &Path) -> Result<PathBuf, SpecError> {
    let canonical = dunce::canonicalize(target).map_err(|_| SpecError::NotFound(target.to_path_buf()))?;
    let script = if canonical.is_dir() {
      canonical.join(&self.config.spec_filename)
    } else {
      canonical
    };
    if !script.is_file() {
      return Err(SpecError::NotFound(script));
    }
    Ok(script)
  }

  /// Load the spec at `target` (file or directory), or return the cached one.
  pub fn load(self: &Rc<Self>, target: &Path) -> Result<LuaAnyUserData, SpecError> {
    let path = self.resolve(target)?;

    if let Some(proxy) = self.specs.borrow().get(&path).cloned() {
      debug!(path = %path.display(), "spec cache hit");
      return Ok(proxy);
    }
    if !self.loading.borrow_mut().insert(path.clone()) {
      return Err(SpecError::Cycle(path));
    }

    let result = self.load_uncached(&path);
    self.loading.borrow_mut().remove(&path);

    let proxy = self.lua.create_userdata(result?)?;
    self.specs.borrow_mut().insert(path, proxy.clone());
    Ok(proxy)
  }

  /// The proxy for `target` as a Rust value.
  pub fn proxy(self: &Rc<Self>, target: &Path) -> Result<SpecProxy, SpecError> {
    let ud = self.load(target)?;
    let proxy = ud.borrow::<SpecProxy>()?;
    Ok(SpecProxy::clone(&proxy))
  }

  fn load_uncached(self: &Rc<Self>, path: &Path) -> Result<SpecProxy, SpecError> {
    let dir = path.parent().unwrap_or(Path::new("/")).to_path_buf();
    let build_dir = dir.join(&self.config.build_dir);

    let helper_table = self.lua.create_table()?;
    let mt = self.lua.create_table()?;
    mt.set("__index", self.lua.globals())?;
    helper_table.set_metatable(Some(mt))?;

    let env = loaders::new_environment(&self.lua, path, &helper_table)?;
    let spec = Rc::new(SpecFile {
      path: path.to_path_buf(),
      dir: dir.clone(),
      build_dir,
      env,
      helpers: helper_table,
      plugins: RefCell::new(BTreeSet::new()),
    });
    helpers::install(&self.lua, self, &spec)?;

    info!(path = %path.display(), "loading build spec");
    loaders::exec_file(&self.lua, path, spec.env()).map_err(|source| SpecError::Load {
      path: path.to_path_buf(),
      source,
    })?;

    let memo = CallMemo::new(
      path.display().to_string(),
      dir,
      self.config.error_mode,
      Rc::clone(&self.graph),
    );
    Ok(SpecProxy::new(spec, memo))
  }
}
