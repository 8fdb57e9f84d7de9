//! Shared helpers for library integration tests.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rmk_lib::{EngineConfig, RunError, RunOptions, RunReport};
use tempfile::TempDir;

/// Isolated project tree.
///
/// The root is canonicalized so paths reported by the engine compare equal
/// to paths built here.
pub struct TestEnv {
  _temp: TempDir,
  root: PathBuf,
  pub config: EngineConfig,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    Self {
      _temp: temp,
      root,
      config: EngineConfig::default(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.root.join(relative)
  }

  /// Write a file relative to the root, creating parent directories.
  pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
    let path = self.path(relative);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
  }

  /// Write `build.lua` inside `dir` (relative to the root, `""` for the root).
  pub fn write_spec(&self, dir: &str, content: &str) -> PathBuf {
    let relative = if dir.is_empty() {
      "build.lua".to_string()
    } else {
      format!("{dir}/build.lua")
    };
    self.write_file(&relative, content)
  }

  /// Number of lines in a file, zero if it does not exist.
  pub fn count_lines(&self, relative: &str) -> usize {
    fs::read_to_string(self.path(relative))
      .map(|s| s.lines().count())
      .unwrap_or(0)
  }

  /// Run `task` on the root spec with a fresh engine.
  pub fn run(&self, task: &str) -> Result<RunReport, RunError> {
    rmk_lib::run(&RunOptions {
      root: self.root.clone(),
      task: task.to_string(),
      config: self.config.clone(),
    })
  }
}

/// Push a file's mtime into the future so it is newer than anything written
/// during the test.
pub fn touch_ahead(path: &Path, secs: u64) {
  let file = File::options().write(true).open(path).unwrap();
  file
    .set_modified(SystemTime::now() + Duration::from_secs(secs))
    .unwrap();
}

/// Lua string literal for a path.
pub fn lua_str(path: &Path) -> String {
  format!("{:?}", path.to_string_lossy())
}
