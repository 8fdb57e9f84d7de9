//! Call memoization.
//!
//! A [`CallMemo`] sits in front of one delegate (a loaded spec). Each
//! `(operation, argument signature)` pair runs at most once while it keeps
//! succeeding: the first request starts the work and later requests share
//! it, whether it is still running or already done. A failure leaves no
//! entry, so the next request runs the operation again.

mod error;

pub use error::{FailureDetails, TaskError};

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Shared};
use tracing::{debug, info};

use crate::config::ErrorMode;
use crate::future::{BuildFuture, FutureError};
use crate::graph::{self, InvocationGraph, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
  operation: String,
  signature: String,
}

type SharedOutcome<V> = Shared<LocalBoxFuture<'static, Result<V, TaskError>>>;

enum Slot<V> {
  Running(SharedOutcome<V>),
  Done(V),
}

/// Memo table for one delegate.
pub struct CallMemo<V> {
  delegate: String,
  dir: PathBuf,
  mode: ErrorMode,
  graph: Rc<InvocationGraph>,
  slots: Rc<RefCell<HashMap<MemoKey, Slot<V>>>>,
  nodes: Rc<RefCell<HashMap<MemoKey, NodeId>>>,
}

impl<V> Clone for CallMemo<V> {
  fn clone(&self) -> Self {
    Self {
      delegate: self.delegate.clone(),
      dir: self.dir.clone(),
      mode: self.mode,
      graph: Rc::clone(&self.graph),
      slots: Rc::clone(&self.slots),
      nodes: Rc::clone(&self.nodes),
    }
  }
}

impl<V: Clone + 'static> CallMemo<V> {
  /// `delegate` labels errors and graph nodes; `dir` is the delegate's directory.
  pub fn new(delegate: impl Into<String>, dir: PathBuf, mode: ErrorMode, graph: Rc<InvocationGraph>) -> Self {
    Self {
      delegate: delegate.into(),
      dir,
      mode,
      graph,
      slots: Rc::new(RefCell::new(HashMap::new())),
      nodes: Rc::new(RefCell::new(HashMap::new())),
    }
  }

  /// Number of operations holding a successful result.
  pub fn completed(&self) -> usize {
    self
      .slots
      .borrow()
      .values()
      .filter(|slot| matches!(slot, Slot::Done(_)))
      .count()
  }

  /// Run `operation` through the memo.
  ///
  /// `invoke` is only called when no result and no in-flight run exists for
  /// the key. Its future runs as its own task, inside a new graph node.
  pub async fn call<F, Fut, E>(&self, operation: &str, signature: &str, invoke: F) -> Result<V, TaskError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>> + 'static,
    E: FailureDetails + From<FutureError> + 'static,
  {
    let key = MemoKey {
      operation: operation.to_string(),
      signature: signature.to_string(),
    };
    let parent = graph::current();

    let in_flight = match self.slots.borrow().get(&key) {
      Some(Slot::Done(value)) => {
        debug!(delegate = %self.delegate, operation, signature, "memo hit");
        self.link(parent, &key);
        return Ok(value.clone());
      }
      Some(Slot::Running(shared)) => Some(shared.clone()),
      None => None,
    };

    if let Some(shared) = in_flight {
      if let (Some(parent), Some(node)) = (parent, self.node_of(&key)) {
        if self.graph.reaches(node, parent) {
          return Err(TaskError::new(&self.delegate, operation, "dependency cycle detected"));
        }
      }
      debug!(delegate = %self.delegate, operation, signature, "joining in-flight invocation");
      self.link(parent, &key);
      return shared.await;
    }

    let node = self.open_node(&key, parent);
    info!(delegate = %self.delegate, operation, signature, "running");
    let work: BuildFuture<V, E> = BuildFuture::start(graph::within(Some(node), invoke()));

    let slots = Rc::clone(&self.slots);
    let graph = Rc::clone(&self.graph);
    let delegate = self.delegate.clone();
    let mode = self.mode;
    let slot_key = key.clone();
    let shared = async move {
      let outcome = work
        .value()
        .await
        .map_err(|err| TaskError::wrap(&delegate, &slot_key.operation, &err, mode));
      match &outcome {
        Ok(value) => {
          graph.close(node, None);
          slots.borrow_mut().insert(slot_key, Slot::Done(value.clone()));
        }
        Err(err) => {
          graph.close(node, Some(err.message.clone()));
          slots.borrow_mut().remove(&slot_key);
        }
      }
      outcome
    }
    .boxed_local()
    .shared();

    self.slots.borrow_mut().insert(key, Slot::Running(shared.clone()));
    shared.await
  }

  fn node_of(&self, key: &MemoKey) -> Option<NodeId> {
    self.nodes.borrow().get(key).copied()
  }

  fn link(&self, parent: Option<NodeId>, key: &MemoKey) {
    if let Some(node) = self.node_of(key) {
      self.graph.link(parent, node);
    }
  }

  fn open_node(&self, key: &MemoKey, parent: Option<NodeId>) -> NodeId {
    if let Some(node) = self.node_of(key) {
      self.graph.reopen(node);
      self.graph.link(parent, node);
      return node;
    }
    let identity = format!("{}:{}{}", self.delegate, key.operation, key.signature);
    let node = self
      .graph
      .open(identity, key.operation.clone(), self.dir.clone(), parent);
    self.nodes.borrow_mut().insert(key.clone(), node);
    node
  }
}
