//! The helper surface every spec sees: `dir`, `build_dir`, `file`, `glob`,
//! `project`, `plugin`, `load` and `build_cache`.

use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use mlua::prelude::*;
use tracing::debug;

use super::{SpecError, SpecFile, SpecLoader};
use crate::cache::lua::create_build_cache;
use crate::lua::loaders;

fn upgrade<T>(weak: &Weak<T>) -> LuaResult<Rc<T>> {
  weak.upgrade().ok_or_else(|| SpecError::Unloaded.into())
}

fn path_string(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

pub(super) fn install(lua: &Lua, loader: &Rc<SpecLoader>, spec: &Rc<SpecFile>) -> LuaResult<()> {
  let helpers = &spec.helpers;

  let dir = path_string(spec.dir());
  helpers.set("dir", lua.create_function(move |_, ()| Ok(dir.clone()))?)?;

  let build_dir = path_string(spec.build_dir());
  helpers.set("build_dir", lua.create_function(move |_, ()| Ok(build_dir.clone()))?)?;

  let base = spec.dir().to_path_buf();
  helpers.set(
    "file",
    lua.create_function(move |lua, names: LuaValue| match names {
      LuaValue::String(name) => Ok(LuaValue::String(
        lua.create_string(path_string(&base.join(&*name.to_str()?)))?,
      )),
      LuaValue::Table(names) => {
        let qualified = names
          .sequence_values::<String>()
          .map(|name| name.map(|n| path_string(&base.join(n))))
          .collect::<LuaResult<Vec<_>>>()?;
        Ok(LuaValue::Table(lua.create_sequence_from(qualified)?))
      }
      other => Err(LuaError::runtime(format!(
        "file() expects a name or a list of names, got {}",
        other.type_name()
      ))),
    })?,
  )?;

  let base = spec.dir().to_path_buf();
  helpers.set(
    "glob",
    lua.create_function(move |_, pattern: String| glob_in(&base, &pattern))?,
  )?;

  let weak_loader = Rc::downgrade(loader);
  let base = spec.dir().to_path_buf();
  helpers.set(
    "project",
    lua.create_function(move |_, path: String| {
      let loader = upgrade(&weak_loader)?;
      Ok(loader.load(&base.join(path))?)
    })?,
  )?;

  let weak_loader = Rc::downgrade(loader);
  let weak_spec = Rc::downgrade(spec);
  helpers.set(
    "plugin",
    lua.create_function(move |lua, name: String| {
      let loader = upgrade(&weak_loader)?;
      let spec = upgrade(&weak_spec)?;
      let capability = loader
        .registry()
        .get(&name)
        .ok_or_else(|| SpecError::UnknownPlugin(name.clone()))?;
      if spec.mark_plugin(&name) {
        debug!(plugin = %name, spec = %spec.path().display(), "installing capability");
        if let Err(err) = capability.install(lua, &spec) {
          spec.unmark_plugin(&name);
          return Err(err);
        }
      }
      Ok(())
    })?,
  )?;

  let weak_spec = Rc::downgrade(spec);
  helpers.set(
    "load",
    lua.create_function(move |lua, name: String| {
      let spec = upgrade(&weak_spec)?;
      loaders::exec_file(lua, &spec.resolve(&name), spec.env())
    })?,
  )?;

  helpers.set(
    "build_cache",
    create_build_cache(lua, spec.dir().to_path_buf(), spec.cache_dir())?,
  )?;

  Ok(())
}

/// Paths matching `pattern` relative to `base`, sorted.
fn glob_in(base: &Path, pattern: &str) -> LuaResult<Vec<String>> {
  let full = base.join(pattern);
  let mut matches: Vec<PathBuf> = glob::glob(&full.to_string_lossy())
    .map_err(|e| LuaError::runtime(format!("invalid glob pattern '{pattern}': {e}")))?
    .filter_map(Result::ok)
    .collect();
  matches.sort();
  Ok(matches.iter().map(|p| path_string(p)).collect())
}
