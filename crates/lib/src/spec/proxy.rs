//! Memoized access to a loaded spec.
//!
//! `project("sub")` returns a [`SpecProxy`]. Indexing it yields a callable
//! per operation; calling it goes through the spec's call memo, so each
//! `(operation, arguments)` pair runs once per build as long as it succeeds.

use std::fmt::Write;
use std::rc::Rc;

use mlua::prelude::*;

use super::SpecFile;
use crate::cache::lua::LuaFuture;
use crate::memo::{CallMemo, TaskError};

#[derive(Clone)]
pub struct SpecProxy {
  spec: Rc<SpecFile>,
  memo: CallMemo<LuaValue>,
}

impl SpecProxy {
  pub fn new(spec: Rc<SpecFile>, memo: CallMemo<LuaValue>) -> Self {
    Self { spec, memo }
  }

  pub fn spec(&self) -> &Rc<SpecFile> {
    &self.spec
  }

  /// Invoke `operation` through the memo.
  pub async fn invoke(&self, operation: &str, args: LuaMultiValue) -> Result<LuaValue, TaskError> {
    let signature = signature(&args);
    let spec = Rc::clone(&self.spec);
    let name = operation.to_string();
    self
      .memo
      .call(operation, &signature, move || async move {
        let func = spec.task(&name)?;
        func.call_async::<LuaValue>(args).await
      })
      .await
  }

  fn callable(&self, lua: &Lua, operation: String) -> LuaResult<LuaFunction> {
    let proxy = self.clone();
    lua.create_async_function(move |_, args: LuaMultiValue| {
      let proxy = proxy.clone();
      let operation = operation.clone();
      async move {
        let args = proxy.strip_self(args);
        Ok(proxy.invoke(&operation, args).await?)
      }
    })
  }

  /// Drop a leading `self` so `p.task()` and `p:task()` share a memo slot.
  fn strip_self(&self, mut args: LuaMultiValue) -> LuaMultiValue {
    let is_self = match args.front() {
      Some(LuaValue::UserData(ud)) => ud
        .borrow::<SpecProxy>()
        .map(|other| Rc::ptr_eq(&other.spec, &self.spec))
        .unwrap_or(false),
      _ => false,
    };
    if is_self {
      args.pop_front();
    }
    args
  }
}

impl LuaUserData for SpecProxy {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_meta_method(LuaMetaMethod::Index, |lua, this, key: String| {
      match this.spec.operation(&key)? {
        Some(LuaValue::Function(_)) | None => Ok(LuaValue::Function(this.callable(lua, key)?)),
        Some(value) => Ok(value),
      }
    });

    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
      Ok(this.spec.path().display().to_string())
    });
  }
}

/// Deterministic text form of call arguments, used as the memo key.
///
/// Tables render with sorted keys; functions and other userdata render by
/// identity.
pub fn signature(args: &LuaMultiValue) -> String {
  let mut out = String::from("(");
  let mut seen = Vec::new();
  for (i, arg) in args.iter().enumerate() {
    if i > 0 {
      out.push_str(", ");
    }
    render(arg, &mut seen, &mut out);
  }
  out.push(')');
  out
}

fn render(value: &LuaValue, seen: &mut Vec<usize>, out: &mut String) {
  match value {
    LuaValue::Nil => out.push_str("nil"),
    LuaValue::Boolean(b) => {
      let _ = write!(out, "{b}");
    }
    LuaValue::Integer(i) => {
      let _ = write!(out, "{i}");
    }
    LuaValue::Number(n) => {
      let _ = write!(out, "{n:?}");
    }
    LuaValue::String(s) => {
      let _ = write!(out, "{:?}", s.to_string_lossy());
    }
    LuaValue::Table(t) => {
      let ptr = t.to_pointer() as usize;
      if seen.contains(&ptr) {
        out.push_str("<cycle>");
        return;
      }
      seen.push(ptr);
      let mut entries: Vec<(String, String)> = t
        .pairs::<LuaValue, LuaValue>()
        .filter_map(Result::ok)
        .map(|(k, v)| {
          let mut key = String::new();
          render(&k, seen, &mut key);
          let mut val = String::new();
          render(&v, seen, &mut val);
          (key, val)
        })
        .collect();
      entries.sort();
      out.push('{');
      for (i, (k, v)) in entries.iter().enumerate() {
        if i > 0 {
          out.push_str(", ");
        }
        let _ = write!(out, "[{k}]={v}");
      }
      out.push('}');
      seen.pop();
    }
    LuaValue::UserData(ud) => {
      if let Ok(future) = ud.borrow::<LuaFuture>() {
        let _ = write!(out, "future({})", future.entry().display());
      } else if let Ok(proxy) = ud.borrow::<SpecProxy>() {
        let _ = write!(out, "spec({})", proxy.spec.path().display());
      } else {
        let _ = write!(out, "userdata@{:p}", ud.to_pointer());
      }
    }
    other => {
      let _ = write!(out, "{}@{:p}", other.type_name(), other.to_pointer());
    }
  }
}
