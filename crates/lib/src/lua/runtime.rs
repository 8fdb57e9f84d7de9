use mlua::prelude::*;

use crate::config::EngineConfig;
use crate::tools;

/// Create a Lua state with the standard libraries, including `debug`.
///
/// `build_cache` identifies its call site through `debug.getinfo`, which the
/// safe constructor does not load.
pub fn new_state() -> Lua {
  // SAFETY: only the standard libraries are loaded; no C modules are enabled.
  unsafe { Lua::unsafe_new_with(LuaStdLib::ALL_SAFE | LuaStdLib::DEBUG, LuaOptions::default()) }
}

/// Create the runtime shared by every spec of one build.
///
/// Registers the global `system` and `parallel` functions and puts the
/// plugin directories on `package.path` so script capabilities can
/// `require` their own modules.
pub fn create_runtime(config: &EngineConfig) -> LuaResult<Lua> {
  let lua = new_state();

  if !config.plugin_dirs.is_empty() {
    let package = lua.globals().get::<LuaTable>("package")?;
    let package_path = package.get::<String>("path")?;
    let mut entries: Vec<String> = config
      .plugin_dirs
      .iter()
      .map(|dir| dir.join("?.lua").to_string_lossy().into_owned())
      .collect();
    entries.push(package_path);
    package.set("path", entries.join(";"))?;
  }

  tools::lua::register(&lua, &lua.globals(), config.shell.clone())?;

  Ok(lua)
}
