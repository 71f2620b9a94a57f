use reqwest::Method;

use crate::cache::{AssetRequest, Fetcher, Snapshot};
use crate::error::{CacheError, CacheResult};

/// HTTP fetcher backed by reqwest.
///
/// No timeout is set here; transport timeouts are left to the client
/// defaults.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> CacheResult<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("devtoolkit-cache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(CacheError::HttpClient)?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &AssetRequest) -> CacheResult<Snapshot> {
    let network_error = |reason: String| CacheError::Network {
      url: request.url.to_string(),
      reason,
    };

    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| network_error(format!("invalid method {}: {}", request.method, e)))?;

    let response = self
      .client
      .request(method, request.url.clone())
      .send()
      .await
      .map_err(|e| network_error(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| network_error(format!("failed to read body: {}", e)))?;

    Ok(Snapshot::new(status, headers, body.to_vec()))
  }
}
