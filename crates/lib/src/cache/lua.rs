//! Lua side of the build cache: `build_cache(deps, step)` and the future it
//! returns.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use super::{BuildCache, CallSite, Dependency};
use crate::future::BuildFuture;

/// Registry key of the compiled call-site shim factory.
const SHIM_REGISTRY_KEY: &str = "__rmk_build_cache_shim";

/// Wraps the native `build_cache` so it receives the two source locations
/// enclosing the call plus the step's definition site. Level 1 inside `site`
/// is `site` itself.
const SHIM_SOURCE: &str = r#"
local raw = ...
local getinfo = debug.getinfo
local function site(level)
  local info = getinfo(level + 1, "Sl")
  if info == nil then
    return "?"
  end
  return info.source .. ":" .. tostring(info.currentline)
end
local function defined(step)
  if type(step) ~= "function" then
    return "?"
  end
  local info = getinfo(step, "S")
  return info.source .. ":" .. tostring(info.linedefined)
end
return function(deps, step)
  local future = raw(site(2), site(3), defined(step), deps, step)
  return future
end
"#;

enum FutureState {
  Pending(BuildFuture<serde_json::Value, LuaError>),
  Awaiting,
  Settled(LuaResult<LuaValue>),
}

/// A `build_cache` result as seen from Lua.
///
/// The first `:value()` waits for the outcome and keeps it; later reads
/// return the same value or error.
#[derive(Clone)]
pub struct LuaFuture {
  entry: PathBuf,
  state: Rc<RefCell<FutureState>>,
}

impl LuaFuture {
  pub fn new(entry: PathBuf, future: BuildFuture<serde_json::Value, LuaError>) -> Self {
    Self {
      entry,
      state: Rc::new(RefCell::new(FutureState::Pending(future))),
    }
  }

  pub fn entry(&self) -> &Path {
    &self.entry
  }

  pub fn is_ready(&self) -> bool {
    match &*self.state.borrow() {
      FutureState::Pending(future) => future.is_ready(),
      FutureState::Awaiting => false,
      FutureState::Settled(_) => true,
    }
  }

  /// Wait for the outcome and convert it to Lua.
  pub async fn settle(&self, lua: &Lua) -> LuaResult<LuaValue> {
    let pending = {
      let mut state = self.state.borrow_mut();
      match std::mem::replace(&mut *state, FutureState::Awaiting) {
        FutureState::Pending(future) => future,
        FutureState::Settled(outcome) => {
          *state = FutureState::Settled(outcome.clone());
          return outcome;
        }
        FutureState::Awaiting => {
          return Err(LuaError::runtime(format!(
            "cache future for {} is already being awaited",
            self.entry.display()
          )));
        }
      }
    };

    let outcome = pending.value().await.and_then(|json| to_lua(lua, &json));
    *self.state.borrow_mut() = FutureState::Settled(outcome.clone());
    outcome
  }
}

impl LuaUserData for LuaFuture {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("entry", |_, this| Ok(this.entry.to_string_lossy().into_owned()));
  }

  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_async_method("value", |lua, this, ()| {
      let future = (*this).clone();
      async move { future.settle(&lua).await }
    });

    methods.add_method("is_ready", |_, this, ()| Ok(this.is_ready()));

    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
      Ok(format!("BuildFuture({})", this.entry.display()))
    });
  }
}

fn to_lua(lua: &Lua, json: &serde_json::Value) -> LuaResult<LuaValue> {
  let options = LuaSerializeOptions::new()
    .serialize_none_to_null(false)
    .serialize_unit_to_null(false);
  lua.to_value_with(json, options)
}

fn resolve(base: &Path, path: &str) -> PathBuf {
  let path = Path::new(path);
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  }
}

/// Convert a Lua dependency descriptor.
///
/// Accepts a path string, `{ path = ... }`, `{ mtime = ... }` or a cache
/// future, which is settled first so its entry exists.
pub async fn to_dependency(lua: &Lua, base: &Path, value: LuaValue) -> LuaResult<Dependency> {
  match value {
    LuaValue::String(s) => Ok(Dependency::path(resolve(base, &s.to_str()?))),
    LuaValue::Table(t) => {
      if let Some(path) = t.get::<Option<String>>("path")? {
        Ok(Dependency::path(resolve(base, &path)))
      } else if let Some(mtime) = t.get::<Option<f64>>("mtime")? {
        Ok(Dependency::Stamp { mtime })
      } else {
        Err(LuaError::runtime("dependency table needs a 'path' or 'mtime' field"))
      }
    }
    LuaValue::UserData(ud) => {
      let future = LuaFuture::clone(&*ud.borrow::<LuaFuture>()?);
      future.settle(lua).await?;
      Ok(Dependency::entry(future.entry))
    }
    other => Err(LuaError::runtime(format!(
      "unsupported dependency of type {}",
      other.type_name()
    ))),
  }
}

async fn to_dependencies(lua: &Lua, base: &Path, value: LuaValue) -> LuaResult<Vec<Dependency>> {
  match value {
    LuaValue::Nil => Ok(Vec::new()),
    LuaValue::Table(t) if t.get::<Option<String>>("path")?.is_none() && t.get::<Option<f64>>("mtime")?.is_none() => {
      let mut deps = Vec::new();
      for item in t.sequence_values::<LuaValue>() {
        deps.push(to_dependency(lua, base, item?).await?);
      }
      Ok(deps)
    }
    single => Ok(vec![to_dependency(lua, base, single).await?]),
  }
}

/// Create the `build_cache(deps, step)` function for one spec.
///
/// Relative dependency paths resolve against `base`; entries live in
/// `cache_dir`.
pub fn create_build_cache(lua: &Lua, base: PathBuf, cache_dir: PathBuf) -> LuaResult<LuaFunction> {
  let cache = BuildCache::new(cache_dir);
  let raw = lua.create_async_function(
    move |lua, (inner, outer, defined, deps, step): (String, String, String, LuaValue, LuaFunction)| {
      let base = base.clone();
      let cache = cache.clone();
      async move {
        let declared = to_dependencies(&lua, &base, deps).await?;
        let site = CallSite::new(inner, outer).with_step(defined);
        let step_lua = lua.clone();
        let cached = cache
          .build(&site, declared, move || async move {
            let hidden = step_lua.create_table()?;
            let result: LuaValue = step.call_async(hidden.clone()).await?;
            let value: serde_json::Value = step_lua.from_value(result)?;
            let mut found = Vec::new();
            for item in hidden.sequence_values::<LuaValue>() {
              found.push(to_dependency(&step_lua, &base, item?).await?);
            }
            Ok((value, found))
          })
          .await;
        lua.create_userdata(LuaFuture::new(cached.entry, cached.future))
      }
    },
  )?;
  wrap_with_call_site(lua, raw)
}

fn wrap_with_call_site(lua: &Lua, raw: LuaFunction) -> LuaResult<LuaFunction> {
  let factory = match lua.named_registry_value::<Option<LuaFunction>>(SHIM_REGISTRY_KEY)? {
    Some(factory) => factory,
    None => {
      let factory = lua.load(SHIM_SOURCE).set_name("=build_cache").into_function()?;
      lua.set_named_registry_value(SHIM_REGISTRY_KEY, factory.clone())?;
      factory
    }
  };
  factory.call(raw)
}
