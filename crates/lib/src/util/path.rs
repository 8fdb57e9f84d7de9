//! Path shortening for command echoes.
//!
//! Commands are echoed before they run. Absolute paths inside them are
//! rewritten relative to the working directory so the log stays readable.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Absolute directory prefixes inside a command line: a `/`, then anything
/// up to the last `/` before whitespace or a `:`.
static ABS_DIR: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(/[^\s:]*/)").expect("ABS_DIR is a valid regex"));

fn segments(path: &str) -> Vec<&str> {
  let mut parts: Vec<&str> = path.split('/').collect();
  while parts.len() > 1 && parts.last() == Some(&"") {
    parts.pop();
  }
  parts
}

/// Express `source` relative to the directory `base`.
///
/// Paths on a different root (their first named segment differs) are
/// returned unchanged. Identical paths give `"./"`.
pub fn relativize(source: &str, base: &str) -> String {
  let src = segments(source);
  let dir = segments(base);

  if src.get(1) != dir.get(1) {
    return source.to_string();
  }
  if src == dir {
    return "./".to_string();
  }

  let j = src
    .iter()
    .zip(dir.iter())
    .position(|(a, b)| a != b)
    .unwrap_or_else(|| src.len().min(dir.len()));

  if j == 0 && src.len() == dir.len() {
    return ".".to_string();
  }

  let mut parts: Vec<&str> = std::iter::repeat_n("..", dir.len().saturating_sub(j)).collect();
  parts.extend_from_slice(&src[j..]);
  parts.join("/")
}

/// Rewrite every absolute directory prefix in `cmd` relative to `cwd`.
pub fn relativize_command(cmd: &str, cwd: &Path) -> String {
  let base = cwd.to_string_lossy();
  ABS_DIR
    .replace_all(cmd, |caps: &Captures<'_>| {
      let rel = relativize(&caps[1], &base);
      if rel.ends_with('/') { rel } else { format!("{rel}/") }
    })
    .into_owned()
}
