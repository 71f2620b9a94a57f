//! Compiled-in cache manifest: the store version, the core asset set and the
//! allowlist of third-party prefixes.
//!
//! Changing `CORE_ASSETS` requires bumping `CACHE_VERSION`.

use std::fmt;

use url::Url;

use crate::error::{CacheError, CacheResult};

/// Name of the store for this build.
pub const CACHE_VERSION: &str = "devtoolkit-v1";

/// Same-origin assets needed to run with no network, relative to the scope.
pub const CORE_ASSETS: &[&str] = &[
  "./",
  "./index.html",
  "./assets/css/styles.css",
  "./assets/js/utils.js",
  "./assets/js/app.js",
  "./assets/js/tools.js",
  "./assets/icons/favicon.svg",
];

/// Third-party prefixes that may be cached after first use.
pub const EXTERNAL_ASSETS: &[&str] = &[
  "https://cdn.tailwindcss.com",
  "https://cdn.jsdelivr.net/npm/prettier@3.3.3/standalone.js",
  "https://cdn.jsdelivr.net/npm/prettier@3.3.3/plugins/babel.js",
  "https://cdn.jsdelivr.net/npm/prettier@3.3.3/plugins/estree.js",
  "https://cdn.jsdelivr.net/npm/prettier@3.3.3/plugins/html.js",
  "https://cdn.jsdelivr.net/npm/prettier@3.3.3/plugins/postcss.js",
  "https://cdn.jsdelivr.net/npm/prettier@3.3.3/plugins/typescript.js",
  "https://cdn.jsdelivr.net/npm/prettier@3.3.3/plugins/markdown.js",
  "https://cdn.jsdelivr.net/npm/marked@12.0.2/marked.min.js",
  "https://cdn.jsdelivr.net/npm/dompurify@3.1.6/dist/purify.min.js",
];

/// Identifier of a store generation. Immutable for the life of a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVersion(String);

impl CacheVersion {
  pub fn new(version: impl Into<String>) -> Self {
    Self(version.into())
  }

  /// Name of the store this version reads and writes.
  pub fn store_name(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Prefixes identifying cross-origin responses eligible for caching.
#[derive(Debug, Clone, Default)]
pub struct ExternalAllowlist {
  prefixes: Vec<String>,
}

impl ExternalAllowlist {
  pub fn new<I, S>(prefixes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      prefixes: prefixes.into_iter().map(Into::into).collect(),
    }
  }

  /// True when the URL equals or starts with one of the prefixes.
  pub fn matches(&self, url: &Url) -> bool {
    let href = url.as_str();
    self
      .prefixes
      .iter()
      .any(|p| href == p || href.starts_with(p.as_str()))
  }

  pub fn len(&self) -> usize {
    self.prefixes.len()
  }
}

/// Everything a cache generation is configured with.
#[derive(Debug, Clone)]
pub struct Manifest {
  pub version: CacheVersion,
  /// Core asset paths in install order, relative to the scope
  pub core_assets: Vec<String>,
  pub allowlist: ExternalAllowlist,
}

impl Manifest {
  pub fn new<C, S>(version: &str, core_assets: C, allowlist: ExternalAllowlist) -> Self
  where
    C: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      version: CacheVersion::new(version),
      core_assets: core_assets.into_iter().map(Into::into).collect(),
      allowlist,
    }
  }

  /// The manifest compiled into this build.
  pub fn builtin() -> Self {
    Self::new(
      CACHE_VERSION,
      CORE_ASSETS.iter().copied(),
      ExternalAllowlist::new(EXTERNAL_ASSETS.iter().copied()),
    )
  }

  /// Resolve the core asset paths against the scope URL, preserving order.
  pub fn core_urls(&self, scope: &Url) -> CacheResult<Vec<Url>> {
    self
      .core_assets
      .iter()
      .map(|asset| {
        scope.join(asset).map_err(|source| CacheError::InvalidUrl {
          url: asset.clone(),
          source,
        })
      })
      .collect()
  }
}
