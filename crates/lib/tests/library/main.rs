//! End-to-end tests driving the engine over specs written to temp directories.

mod cache_tests;
mod cc_tests;
mod common;
mod engine_tests;
mod spec_tests;
