//! Shared utilities.
//!
//! Path shortening for command echoes, cache slot hashing and test helpers.

pub mod hash;
pub mod path;
