//! Lua bindings for `system` and `parallel`.

use mlua::prelude::*;

use super::{parallel, run_command};

/// Install `system(cmd)` and `parallel(items, step)` into `table`.
///
/// Both suspend the calling coroutine, so they can only be used from code
/// running as a task, not from a spec's top level.
pub fn register(lua: &Lua, table: &LuaTable, shell: Option<String>) -> LuaResult<()> {
  let system = lua.create_async_function(move |_, cmd: String| {
    let shell = shell.clone();
    async move {
      run_command(&cmd, shell.as_deref()).await?;
      Ok::<_, LuaError>(())
    }
  })?;
  table.set("system", system)?;

  let fan_out = lua.create_async_function(|lua, (items, step): (LuaTable, LuaFunction)| async move {
    let items: Vec<LuaValue> = items.sequence_values::<LuaValue>().collect::<LuaResult<_>>()?;
    let results = parallel(items, |item| {
      let step = step.clone();
      async move { step.call_async::<LuaValue>(item).await }
    })
    .await?;
    lua.create_sequence_from(results)
  })?;
  table.set("parallel", fan_out)?;

  Ok(())
}
