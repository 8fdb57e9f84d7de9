//! Naming of build cache slots.
//!
//! A slot is named by the SHA-256 of its key parts. The hash only names the
//! slot; entries are never verified against it.

use std::fmt;

use sha2::{Digest, Sha256};

/// Hex digest naming one build cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheDigest(pub String);

impl CacheDigest {
  /// Hash the key parts in order. Each part is terminated so that
  /// `["ab", "c"]` and `["a", "bc"]` name different slots.
  pub fn of<I, S>(parts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
  {
    let mut hasher = Sha256::new();
    for part in parts {
      hasher.update(part.as_ref());
      hasher.update([0u8]);
    }
    CacheDigest(hex::encode(hasher.finalize()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}
