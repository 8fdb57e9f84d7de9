//! Subprocess and fan-out primitives for build steps.

mod cmd;
pub mod lua;

pub use cmd::{get_shell, run_command, run_command_to};

use std::future::Future;

use mlua::prelude::*;
use thiserror::Error;

use crate::future::{BuildFuture, FutureError};

/// Errors from running external commands.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// Command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  /// The shell could not be started.
  #[error("failed to start shell '{shell}': {source}")]
  Spawn {
    shell: String,
    #[source]
    source: std::io::Error,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<ExecuteError> for LuaError {
  fn from(err: ExecuteError) -> Self {
    LuaError::external(err)
  }
}

/// Run `step` over every item concurrently and collect results in input order.
///
/// All steps are started before any is awaited. They are then awaited in
/// input order, so the error returned is that of the first failing item by
/// position, not the first to fail in time. Steps still running when an
/// error is returned are left to finish on their own.
pub async fn parallel<I, T, E, F, Fut>(items: I, mut step: F) -> Result<Vec<T>, E>
where
  I: IntoIterator,
  F: FnMut(I::Item) -> Fut,
  Fut: Future<Output = Result<T, E>> + 'static,
  T: 'static,
  E: From<FutureError> + 'static,
{
  let mut futures = Vec::new();
  for item in items {
    futures.push(BuildFuture::spawn(step(item)).await);
  }

  let mut results = Vec::with_capacity(futures.len());
  for future in futures {
    results.push(future.value().await?);
  }
  Ok(results)
}
