//! Lua runtime for build specs.
//!
//! - [`runtime`] - VM creation and the globals every spec sees
//! - [`loaders`] - loading script files into a per-file environment

pub mod loaders;
pub mod runtime;
