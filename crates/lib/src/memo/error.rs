//! The error a memoized invocation fails with.

use std::fmt;

use mlua::prelude::*;

use crate::config::ErrorMode;

/// Failure of a memoized operation, rewrapped with the delegate and
/// operation it came from.
///
/// The original error's type is not kept. In [`ErrorMode::Tagged`] a short
/// tag naming its kind is kept next to the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
  pub delegate: String,
  pub operation: String,
  pub kind: Option<String>,
  pub message: String,
  pub trace: Option<String>,
}

impl TaskError {
  pub fn wrap<E: FailureDetails + ?Sized>(delegate: &str, operation: &str, err: &E, mode: ErrorMode) -> Self {
    TaskError {
      delegate: delegate.to_string(),
      operation: operation.to_string(),
      kind: match mode {
        ErrorMode::Flatten => None,
        ErrorMode::Tagged => Some(err.kind().to_string()),
      },
      message: err.message(),
      trace: err.trace(),
    }
  }

  pub fn new(delegate: &str, operation: &str, message: impl Into<String>) -> Self {
    TaskError {
      delegate: delegate.to_string(),
      operation: operation.to_string(),
      kind: None,
      message: message.into(),
      trace: None,
    }
  }
}

impl fmt::Display for TaskError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{} : ", self.delegate, self.operation)?;
    if let Some(kind) = &self.kind {
      write!(f, "[{kind}] ")?;
    }
    f.write_str(&self.message)?;
    if let Some(trace) = &self.trace {
      write!(f, "\n{trace}")?;
    }
    Ok(())
  }
}

impl std::error::Error for TaskError {}

impl From<TaskError> for LuaError {
  fn from(err: TaskError) -> Self {
    LuaError::external(err)
  }
}

/// What the memoizer keeps from a failure.
pub trait FailureDetails: fmt::Display {
  /// Short tag naming the kind of failure.
  fn kind(&self) -> &'static str {
    "error"
  }

  fn message(&self) -> String {
    self.to_string()
  }

  fn trace(&self) -> Option<String> {
    None
  }
}

impl FailureDetails for LuaError {
  fn kind(&self) -> &'static str {
    match self {
      LuaError::RuntimeError(_) => "runtime",
      LuaError::SyntaxError { .. } => "syntax",
      LuaError::MemoryError(_) => "memory",
      LuaError::CallbackError { cause, .. } => cause.kind(),
      LuaError::WithContext { cause, .. } => cause.kind(),
      LuaError::ExternalError(err) if err.downcast_ref::<TaskError>().is_some() => "task",
      LuaError::ExternalError(_) => "external",
      LuaError::FromLuaConversionError { .. } | LuaError::ToLuaConversionError { .. } => "conversion",
      _ => "lua",
    }
  }

  fn message(&self) -> String {
    match self {
      LuaError::CallbackError { cause, .. } => cause.message(),
      LuaError::ExternalError(err) => err.to_string(),
      other => other.to_string(),
    }
  }

  fn trace(&self) -> Option<String> {
    match self {
      LuaError::CallbackError { traceback, .. } if !traceback.is_empty() => Some(traceback.clone()),
      _ => None,
    }
  }
}
