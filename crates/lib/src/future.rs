//! Deferred results of build steps.
//!
//! A [`BuildFuture`] is either backed by a unit of work running on the local
//! scheduler, or already resolved. Work is started with [`BuildFuture::spawn`],
//! which runs it up to its first suspension point before returning to the
//! spawner. Completion reaches the awaiting side through the join handle's
//! waker, so a producer never resumes its consumer from its own stack.

use std::future::Future;

use mlua::prelude::*;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use crate::graph;

/// A spawned unit of work ended without producing an outcome.
#[derive(Debug, Clone, Error)]
pub enum FutureError {
  #[error("build step panicked: {0}")]
  Panicked(String),

  #[error("build step was cancelled")]
  Cancelled,
}

impl From<JoinError> for FutureError {
  fn from(err: JoinError) -> Self {
    if err.is_panic() {
      let payload = err.into_panic();
      let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
      FutureError::Panicked(message)
    } else {
      FutureError::Cancelled
    }
  }
}

impl From<FutureError> for LuaError {
  fn from(err: FutureError) -> Self {
    LuaError::external(err)
  }
}

/// Result of one unit of build work, possibly not yet available.
#[derive(Debug)]
pub enum BuildFuture<T, E> {
  /// Backed by a task on the local scheduler.
  Running(JoinHandle<Result<T, E>>),
  /// Holds its outcome. Reading it never suspends.
  Resolved(Result<T, E>),
}

impl<T, E> BuildFuture<T, E>
where
  T: 'static,
  E: From<FutureError> + 'static,
{
  /// Start `work` and let it run until it first suspends.
  ///
  /// Must be called inside a `LocalSet`.
  pub async fn spawn<F>(work: F) -> Self
  where
    F: Future<Output = Result<T, E>> + 'static,
  {
    let future = Self::start(work);
    tokio::task::yield_now().await;
    future
  }

  /// Queue `work` on the local scheduler without yielding to it.
  ///
  /// The work inherits the spawner's tracing span and current invocation.
  pub fn start<F>(work: F) -> Self
  where
    F: Future<Output = Result<T, E>> + 'static,
  {
    BuildFuture::Running(tokio::task::spawn_local(graph::inherit(work).in_current_span()))
  }

  pub fn resolved(value: T) -> Self {
    BuildFuture::Resolved(Ok(value))
  }

  /// Whether reading the value would complete without suspending.
  pub fn is_ready(&self) -> bool {
    match self {
      BuildFuture::Running(handle) => handle.is_finished(),
      BuildFuture::Resolved(_) => true,
    }
  }

  /// Wait for the outcome. Errors raised by the work are returned as-is.
  pub async fn value(self) -> Result<T, E> {
    match self {
      BuildFuture::Resolved(outcome) => outcome,
      BuildFuture::Running(handle) => match handle.await {
        Ok(outcome) => outcome,
        Err(join) => Err(FutureError::from(join).into()),
      },
    }
  }
}
