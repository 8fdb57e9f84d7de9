//! The root driver.
//!
//! Loads the root spec, invokes one task on it and reports the outcome. All
//! work runs on a current-thread runtime inside a `LocalSet`, so build steps
//! interleave on one thread and only ever suspend at `.await`.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use thiserror::Error;
use tokio::task::LocalSet;
use tracing::info;

use crate::config::EngineConfig;
use crate::graph::{GraphSnapshot, InvocationGraph};
use crate::lua::runtime::create_runtime;
use crate::memo::TaskError;
use crate::spec::{CapabilityRegistry, SpecError, SpecLoader};

#[derive(Debug, Error)]
pub enum RunError {
  #[error("failed to start runtime: {0}")]
  Runtime(#[source] std::io::Error),

  #[error("failed to initialize Lua: {0}")]
  Lua(#[from] LuaError),

  #[error(transparent)]
  Spec(#[from] SpecError),

  #[error(transparent)]
  Task(#[from] TaskError),
}

/// What to build.
#[derive(Debug, Clone)]
pub struct RunOptions {
  /// Directory or script of the root spec.
  pub root: PathBuf,
  pub task: String,
  pub config: EngineConfig,
}

#[derive(Debug, Clone)]
pub struct RunReport {
  /// Resolved root script.
  pub spec: PathBuf,
  pub task: String,
  pub specs_loaded: usize,
  pub graph: GraphSnapshot,
}

/// One build. Keeps the invocation graph so it can be inspected after
/// [`Engine::run`] returns, whether or not the build succeeded.
#[derive(Debug)]
pub struct Engine {
  config: EngineConfig,
  graph: Rc<InvocationGraph>,
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      config,
      graph: Rc::new(InvocationGraph::new()),
    }
  }

  pub fn graph(&self) -> GraphSnapshot {
    self.graph.snapshot()
  }

  /// Run `task` on the spec at `root` to completion.
  pub fn run(&self, root: &Path, task: &str) -> Result<RunReport, RunError> {
    let rt = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .map_err(RunError::Runtime)?;
    LocalSet::new().block_on(&rt, self.run_local(root, task))
  }

  /// Like [`Engine::run`], for callers already inside a `LocalSet`.
  pub async fn run_local(&self, root: &Path, task: &str) -> Result<RunReport, RunError> {
    let lua = create_runtime(&self.config)?;
    let registry = CapabilityRegistry::discover(&self.config);
    let loader = SpecLoader::new(lua, self.config.clone(), registry, Rc::clone(&self.graph));

    let spec = loader.resolve(root)?;
    let proxy = loader.proxy(&spec)?;
    info!(spec = %spec.display(), task, "building");
    proxy.invoke(task, LuaMultiValue::new()).await?;

    Ok(RunReport {
      spec,
      task: task.to_string(),
      specs_loaded: loader.loaded(),
      graph: self.graph.snapshot(),
    })
  }
}

/// Run one build with a fresh [`Engine`].
pub fn run(options: &RunOptions) -> Result<RunReport, RunError> {
  Engine::new(options.config.clone()).run(&options.root, &options.task)
}
