//! Names and defaults shared across the engine.

/// Application name, used for environment variable prefixes and labels.
pub const APP_NAME: &str = "rmk";

/// Entry script looked up inside a directory passed to `project()`.
pub const SPEC_FILENAME: &str = "build.lua";

/// Build output directory inside each spec directory.
pub const BUILD_DIR: &str = "build";

/// Cache folder inside the build output directory.
pub const CACHE_DIR: &str = "cache";

/// Suffix of the file holding the discovered dependencies of a cache entry.
pub const DEP_SUFFIX: &str = ".dep";

/// Task run when none is requested.
pub const DEFAULT_TASK: &str = "all";
