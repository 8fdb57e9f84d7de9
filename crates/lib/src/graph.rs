//! Record of memoized task invocations.
//!
//! Every invocation that goes through a call memo becomes a node. A node's
//! children are the invocations it requested, so a shared dependency shows up
//! under each requester but exists once. A status consumer can render the
//! tree from a [`GraphSnapshot`].

use std::cell::RefCell;
use std::future::Future;
use std::path::PathBuf;

use serde::Serialize;

tokio::task_local! {
  static CURRENT: Option<NodeId>;
}

/// Stable index of a node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
  Running,
  Succeeded,
  Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationNode {
  pub id: NodeId,
  /// `<spec path>:<operation><signature>`, unique per graph.
  pub identity: String,
  pub name: String,
  pub dir: PathBuf,
  pub children: Vec<NodeId>,
  pub state: NodeState,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Serializable copy of a graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
  pub roots: Vec<NodeId>,
  pub nodes: Vec<InvocationNode>,
}

#[derive(Debug, Default)]
pub struct InvocationGraph {
  nodes: RefCell<Vec<InvocationNode>>,
  roots: RefCell<Vec<NodeId>>,
}

impl InvocationGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a running node and attach it under `parent` (or as a root).
  pub fn open(&self, identity: String, name: String, dir: PathBuf, parent: Option<NodeId>) -> NodeId {
    let id = {
      let mut nodes = self.nodes.borrow_mut();
      let id = NodeId(nodes.len());
      nodes.push(InvocationNode {
        id,
        identity,
        name,
        dir,
        children: Vec::new(),
        state: NodeState::Running,
        error: None,
      });
      id
    };
    self.link(parent, id);
    id
  }

  /// Record that `parent` requested `child`. Duplicate edges are ignored.
  pub fn link(&self, parent: Option<NodeId>, child: NodeId) {
    match parent {
      Some(parent) if parent != child => {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(node) = nodes.get_mut(parent.0) {
          if !node.children.contains(&child) {
            node.children.push(child);
          }
        }
      }
      Some(_) => {}
      None => {
        let mut roots = self.roots.borrow_mut();
        if !roots.contains(&child) {
          roots.push(child);
        }
      }
    }
  }

  /// Mark a node finished. A retried invocation reopens its node as running.
  pub fn close(&self, id: NodeId, error: Option<String>) {
    if let Some(node) = self.nodes.borrow_mut().get_mut(id.0) {
      node.state = if error.is_some() {
        NodeState::Failed
      } else {
        NodeState::Succeeded
      };
      node.error = error;
    }
  }

  pub fn reopen(&self, id: NodeId) {
    if let Some(node) = self.nodes.borrow_mut().get_mut(id.0) {
      node.state = NodeState::Running;
      node.error = None;
    }
  }

  /// Whether `to` is reachable from `from` by following child edges.
  pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
    let nodes = self.nodes.borrow();
    let mut stack = vec![from];
    let mut seen = vec![false; nodes.len()];
    while let Some(id) = stack.pop() {
      if id == to {
        return true;
      }
      match seen.get_mut(id.0) {
        Some(flag) if !*flag => *flag = true,
        _ => continue,
      }
      if let Some(node) = nodes.get(id.0) {
        stack.extend(node.children.iter().copied());
      }
    }
    false
  }

  pub fn node(&self, id: NodeId) -> Option<InvocationNode> {
    self.nodes.borrow().get(id.0).cloned()
  }

  pub fn len(&self) -> usize {
    self.nodes.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.borrow().is_empty()
  }

  pub fn snapshot(&self) -> GraphSnapshot {
    GraphSnapshot {
      roots: self.roots.borrow().clone(),
      nodes: self.nodes.borrow().clone(),
    }
  }
}

/// The invocation the running code belongs to, if any.
pub fn current() -> Option<NodeId> {
  CURRENT.try_with(|node| *node).ok().flatten()
}

/// Run `fut` as part of invocation `node`.
pub fn within<F: Future>(node: Option<NodeId>, fut: F) -> impl Future<Output = F::Output> {
  CURRENT.scope(node, fut)
}

/// Run `fut` as part of the caller's current invocation.
pub fn inherit<F: Future>(fut: F) -> impl Future<Output = F::Output> {
  within(current(), fut)
}
