//! rmk-lib: an incremental build engine driven by Lua build specs.
//!
//! A build spec is a `build.lua` script in some directory. Its top-level
//! functions are tasks. Tasks run as coroutines on a single-threaded
//! scheduler and can:
//! - run commands with `system` and fan out with `parallel`
//! - cache results with `build_cache`, keyed by call site and dependencies
//! - reach other directories' specs with `project`, memoized per build
//!
//! [`engine::run`] loads the root spec and invokes one task on it.

pub mod cache;
pub mod config;
pub mod consts;
pub mod engine;
pub mod future;
pub mod graph;
pub mod lua;
pub mod memo;
pub mod spec;
pub mod tools;
pub mod util;

pub use config::{EngineConfig, ErrorMode};
pub use engine::{Engine, RunError, RunOptions, RunReport, run};
