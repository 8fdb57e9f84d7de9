//! The build cache.
//!
//! A cached computation is keyed by where it was requested from (a
//! [`CallSite`]) and by its declared dependencies. The entry for a key lives
//! in `<spec dir>/build/cache/<digest>` with the dependencies discovered
//! while computing it in `<digest>.dep`. An entry is reused while it is
//! readable and at least as new as every declared and discovered dependency.

pub mod lua;
mod types;

pub use types::{CacheError, CallSite, Dependency};

use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::consts::DEP_SUFFIX;
use crate::future::{BuildFuture, FutureError};
use crate::util::hash::CacheDigest;

/// Outcome of a cache lookup: the entry's location and its value.
#[derive(Debug)]
pub struct Cached<V, E> {
  pub digest: CacheDigest,
  pub entry: PathBuf,
  pub future: BuildFuture<V, E>,
}

/// Cache directory of one spec.
#[derive(Debug, Clone)]
pub struct BuildCache {
  dir: PathBuf,
}

impl BuildCache {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn digest(site: &CallSite, declared: &[Dependency]) -> CacheDigest {
    let mut parts = vec![site.inner.clone(), site.outer.clone()];
    parts.extend(site.step.clone());
    parts.extend(declared.iter().map(ToString::to_string));
    CacheDigest::of(parts)
  }

  /// Return the cached value for this key, or start `step` to rebuild it.
  ///
  /// `step` yields the value and the dependencies it discovered. It runs as
  /// its own task; its value is written only when it succeeds.
  pub async fn build<V, E, F, Fut>(&self, site: &CallSite, declared: Vec<Dependency>, step: F) -> Cached<V, E>
  where
    V: Serialize + DeserializeOwned + 'static,
    E: From<CacheError> + From<FutureError> + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(V, Vec<Dependency>), E>> + 'static,
  {
    let digest = Self::digest(site, &declared);
    let entry = self.dir.join(digest.as_str());
    let dep_file = dep_path(&entry);

    let mut deps = declared;
    let reason = match read_dep_list(&dep_file) {
      Ok(hidden) => {
        deps.extend(hidden);
        stale_reason(&entry, &deps)
      }
      Err(err) => {
        warn!(error = %err, "unreadable dependency list");
        Some("unreadable dependency list".to_string())
      }
    };

    let reason = match reason {
      Some(reason) => reason,
      None => match read_value::<V>(&entry) {
        Ok(value) => {
          debug!(site = %site, entry = %entry.display(), "reusing cache entry");
          return Cached {
            digest,
            entry,
            future: BuildFuture::resolved(value),
          };
        }
        Err(err) => {
          warn!(error = %err, "unreadable cache entry");
          "unreadable cache entry".to_string()
        }
      },
    };

    info!(site = %site, entry = %entry.display(), reason = %reason, "rebuilding");
    let dir = self.dir.clone();
    let target = entry.clone();
    let work = step();
    let future = BuildFuture::spawn(async move {
      let (value, found) = work.await?;
      persist(&dir, &target, &value, &found)?;
      Ok(value)
    })
    .await;

    Cached { digest, entry, future }
  }
}

fn dep_path(entry: &Path) -> PathBuf {
  let mut name = entry.as_os_str().to_owned();
  name.push(DEP_SUFFIX);
  PathBuf::from(name)
}

/// Why `entry` must be rebuilt, or `None` if it is fresh.
fn stale_reason(entry: &Path, deps: &[Dependency]) -> Option<String> {
  let Some(built) = types::modified(entry) else {
    return Some("no cache entry".to_string());
  };
  for dep in deps {
    match dep.mtime() {
      None => return Some(format!("missing dependency {dep}")),
      Some(mtime) if mtime > built => return Some(format!("{dep} changed")),
      Some(_) => {}
    }
  }
  None
}

fn read_dep_list(path: &Path) -> Result<Vec<Dependency>, CacheError> {
  match fs::read(path) {
    Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| CacheError::Parse {
      path: path.to_path_buf(),
      source,
    }),
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
    Err(source) => Err(CacheError::Read {
      path: path.to_path_buf(),
      source,
    }),
  }
}

fn read_value<V: DeserializeOwned>(path: &Path) -> Result<V, CacheError> {
  let bytes = fs::read(path).map_err(|source| CacheError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_slice(&bytes).map_err(|source| CacheError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

/// Write the dependency list, then the value. Each file is replaced whole.
fn persist<V: Serialize>(dir: &Path, entry: &Path, value: &V, found: &[Dependency]) -> Result<(), CacheError> {
  let value = serde_json::to_vec_pretty(value).map_err(CacheError::Serialize)?;
  fs::create_dir_all(dir).map_err(|source| CacheError::Write {
    path: dir.to_path_buf(),
    source,
  })?;

  let dep_file = dep_path(entry);
  if found.is_empty() {
    match fs::remove_file(&dep_file) {
      Ok(()) => debug!(path = %dep_file.display(), "removed stale dependency list"),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
      Err(source) => return Err(CacheError::Write { path: dep_file, source }),
    }
  } else {
    let list = serde_json::to_vec_pretty(found).map_err(CacheError::Serialize)?;
    write_atomic(dir, &dep_file, &list)?;
  }

  write_atomic(dir, entry, &value)
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
  let write_err = |source| CacheError::Write {
    path: path.to_path_buf(),
    source,
  };
  let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
  tmp.write_all(bytes).map_err(write_err)?;
  tmp.persist(path).map_err(|e| write_err(e.error))?;
  Ok(())
}
