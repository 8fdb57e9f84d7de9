//! Built-in `cc` capability: `compile_c` and `link_c`.
//!
//! Each source compiles in its own cache entry. The compiler writes a
//! make-style depfile (`-MMD -MF`) and the headers listed there become the
//! entry's discovered dependencies, so editing a header recompiles exactly
//! the sources that include it.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use super::{Capability, SpecFile};
use crate::cache::{BuildCache, CallSite, Dependency};
use crate::tools::{parallel, run_command};

#[derive(Debug, Clone, Default)]
pub struct CcCapability {
  shell: Option<String>,
}

impl CcCapability {
  pub fn new(shell: Option<String>) -> Self {
    Self { shell }
  }
}

impl Capability for CcCapability {
  fn name(&self) -> &str {
    "cc"
  }

  fn install(&self, lua: &Lua, spec: &SpecFile) -> LuaResult<()> {
    let ctx = Rc::new(Toolchain {
      dir: spec.dir().to_path_buf(),
      obj_dir: spec.build_dir().join("obj"),
      cache: BuildCache::new(spec.cache_dir()),
      shell: self.shell.clone(),
    });

    let compile = Rc::clone(&ctx);
    let compile_c = lua.create_async_function(move |_, (sources, opts): (Vec<String>, Option<LuaTable>)| {
      let ctx = Rc::clone(&compile);
      async move {
        let opts = CcOptions::from_lua_opts(opts.as_ref())?;
        ctx.compile_all(sources, opts).await
      }
    })?;
    spec.env().raw_set("compile_c", compile_c)?;

    let link = ctx;
    let link_c = lua.create_async_function(
      move |_, (objects, output, opts): (Vec<String>, String, Option<LuaTable>)| {
        let ctx = Rc::clone(&link);
        async move {
          let opts = CcOptions::from_lua_opts(opts.as_ref())?;
          ctx.link(objects, &output, &opts).await
        }
      },
    )?;
    spec.env().raw_set("link_c", link_c)?;

    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq)]
struct CcOptions {
  cc: String,
  cflags: Vec<String>,
  ldflags: Vec<String>,
}

impl CcOptions {
  fn from_lua_opts(opts: Option<&LuaTable>) -> LuaResult<Self> {
    let default_cc = std::env::var("CC")
      .ok()
      .filter(|cc| !cc.trim().is_empty())
      .unwrap_or_else(|| "cc".to_string());
    let Some(opts) = opts else {
      return Ok(Self {
        cc: default_cc,
        cflags: Vec::new(),
        ldflags: Vec::new(),
      });
    };
    Ok(Self {
      cc: opts.get::<Option<String>>("cc")?.unwrap_or(default_cc),
      cflags: flags(opts.get("cflags")?)?,
      ldflags: flags(opts.get("ldflags")?)?,
    })
  }
}

/// Flags given as one string or a list of strings.
fn flags(value: LuaValue) -> LuaResult<Vec<String>> {
  match value {
    LuaValue::Nil => Ok(Vec::new()),
    LuaValue::String(s) => Ok(s.to_str()?.split_whitespace().map(str::to_string).collect()),
    LuaValue::Table(t) => t.sequence_values::<String>().collect(),
    other => Err(LuaError::runtime(format!(
      "flags must be a string or a list, got {}",
      other.type_name()
    ))),
  }
}

struct Toolchain {
  dir: PathBuf,
  obj_dir: PathBuf,
  cache: BuildCache,
  shell: Option<String>,
}

impl Toolchain {
  fn resolve(&self, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.dir.join(path)
    }
  }

  /// Object path mirroring the source's place under the spec directory.
  fn object_for(&self, source: &Path) -> PathBuf {
    let rel = source
      .strip_prefix(&self.dir)
      .map(Path::to_path_buf)
      .unwrap_or_else(|_| PathBuf::from(source.file_name().unwrap_or(source.as_os_str())));
    self.obj_dir.join(rel).with_extension("o")
  }

  async fn compile_all(self: Rc<Self>, sources: Vec<String>, opts: CcOptions) -> LuaResult<Vec<String>> {
    let opts = Rc::new(opts);
    parallel(sources, |source| {
      let ctx = Rc::clone(&self);
      let opts = Rc::clone(&opts);
      async move { ctx.compile(&source, &opts).await }
    })
    .await
  }

  async fn compile(&self, source: &str, opts: &CcOptions) -> LuaResult<String> {
    let source = self.resolve(source);
    let object = self.object_for(&source);
    let depfile = object.with_extension("d");
    let site = CallSite::new(
      format!("cc.compile_c:{}", source.display()),
      std::iter::once(opts.cc.as_str())
        .chain(opts.cflags.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" "),
    );

    let mut args = vec![opts.cc.clone()];
    args.extend(opts.cflags.iter().cloned());
    args.extend([
      "-MMD".to_string(),
      "-MF".to_string(),
      depfile.display().to_string(),
      "-c".to_string(),
      source.display().to_string(),
      "-o".to_string(),
      object.display().to_string(),
    ]);
    let cmd = args.join(" ");
    let shell = self.shell.clone();
    let declared = vec![Dependency::path(&source)];

    let cached = self
      .cache
      .build(&site, declared, move || async move {
        if let Some(parent) = object.parent() {
          fs::create_dir_all(parent).map_err(LuaError::external)?;
        }
        run_command(&cmd, shell.as_deref()).await?;
        let headers = match fs::read_to_string(&depfile) {
          Ok(text) => parse_depfile(&text, &source),
          Err(_) => Vec::new(),
        };
        // The object itself is recorded so a deleted object recompiles.
        let mut found: Vec<Dependency> = headers.into_iter().map(Dependency::path).collect();
        found.push(Dependency::path(&object));
        Ok((object.display().to_string(), found))
      })
      .await;
    cached.future.value().await
  }

  async fn link(&self, objects: Vec<String>, output: &str, opts: &CcOptions) -> LuaResult<String> {
    let output = self.resolve(output);
    let objects: Vec<PathBuf> = objects.iter().map(|o| self.resolve(o)).collect();
    let site = CallSite::new(
      format!("cc.link_c:{}", output.display()),
      std::iter::once(opts.cc.as_str())
        .chain(opts.ldflags.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" "),
    );

    let mut args = vec![opts.cc.clone()];
    args.extend(objects.iter().map(|o| o.display().to_string()));
    args.extend(opts.ldflags.iter().cloned());
    args.extend(["-o".to_string(), output.display().to_string()]);
    let cmd = args.join(" ");
    let shell = self.shell.clone();
    let declared: Vec<Dependency> = objects.iter().map(Dependency::path).collect();

    let cached = self
      .cache
      .build(&site, declared, move || async move {
        if let Some(parent) = output.parent() {
          fs::create_dir_all(parent).map_err(LuaError::external)?;
        }
        run_command(&cmd, shell.as_deref()).await?;
        let found = vec![Dependency::path(&output)];
        Ok((output.display().to_string(), found))
      })
      .await;
    cached.future.value().await
  }
}

/// Prerequisites listed in a make-style depfile, without `source` itself.
fn parse_depfile(text: &str, source: &Path) -> Vec<PathBuf> {
  let joined = text.replace("\\\r\n", " ").replace("\\\n", " ");
  let mut deps = Vec::new();
  for rule in joined.lines() {
    let Some((_, prereqs)) = rule.split_once(": ").or_else(|| rule.split_once(':')) else {
      continue;
    };
    for dep in prereqs.split_whitespace() {
      let path = PathBuf::from(dep);
      if path != source && !deps.contains(&path) {
        deps.push(path);
      }
    }
  }
  deps
}
