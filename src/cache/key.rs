//! Request identity and its canonical store key.

use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::error::{CacheError, CacheResult};

/// An intercepted request: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
  pub method: String,
  pub url: Url,
}

impl AssetRequest {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: normalize_method(method),
      url,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  /// Parse a possibly relative URL, resolving it against the scope.
  pub fn parse(method: &str, raw: &str, scope: &Url) -> CacheResult<Self> {
    let url = scope.join(raw).map_err(|source| CacheError::InvalidUrl {
      url: raw.to_string(),
      source,
    })?;
    Ok(Self::new(method, url))
  }

  /// Only GET requests are intercepted and stored.
  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  pub fn key(&self) -> AssetKey {
    AssetKey::new(&self.method, &self.url)
  }
}

/// Canonical identity of a cacheable request.
///
/// `Url` parsing already lowercases the host, drops default ports and
/// resolves dot segments; the fragment never reaches the server so it is
/// dropped too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
  method: String,
  url: String,
}

impl AssetKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: normalize_method(method),
      url: url.into(),
    }
  }

  /// Rebuild a key from its stored columns.
  pub(crate) fn from_parts(method: String, url: String) -> Self {
    Self { method, url }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 of the canonical form, used as the row key in storage.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for AssetKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

fn normalize_method(method: &str) -> String {
  method.trim().to_uppercase()
}
