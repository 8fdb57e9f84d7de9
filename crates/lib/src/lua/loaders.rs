//! Loading script files into their own environment.
//!
//! Each spec (and each script capability mixed into it) runs with an
//! environment table rather than `_G`. Globals a script defines land in that
//! table, and lookups fall through to a parent table via `__index`. The
//! environment carries `__dir` and `__file` for the script it belongs to.

use std::fs;
use std::path::Path;

use mlua::prelude::*;

/// Create an environment for the script at `path` whose lookups fall back to
/// `parent`.
pub fn new_environment(lua: &Lua, path: &Path, parent: &LuaTable) -> LuaResult<LuaTable> {
  let dir = path.parent().unwrap_or(Path::new(".")).to_string_lossy().into_owned();

  let env = lua.create_table()?;
  env.set("__dir", dir)?;
  env.set("__file", path.to_string_lossy().into_owned())?;

  let mt = lua.create_table()?;
  mt.set("__index", parent.clone())?;
  env.set_metatable(Some(mt))?;

  Ok(env)
}

/// Execute the script at `path` inside `env`.
///
/// The chunk is named `@<path>` so errors and call sites point at the file.
pub fn exec_file(lua: &Lua, path: &Path, env: &LuaTable) -> LuaResult<()> {
  let content = fs::read_to_string(path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", path.display(), e)))?;

  lua
    .load(&content)
    .set_name(format!("@{}", path.display()))
    .set_environment(env.clone())
    .exec()
}
