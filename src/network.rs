//! Network access used by the cache policies.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::store::Entry;

/// A response as received from the network or replayed from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: vec![("content-type".to_string(), content_type.to_string())],
      body: body.into(),
    }
  }

  /// 2xx status
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Snapshot this response as a cache entry under `key`.
  pub fn to_entry(&self, key: &str) -> Entry {
    Entry::new(key, self.status, self.headers.clone(), self.body.clone())
  }
}

impl From<Entry> for HttpResponse {
  fn from(entry: Entry) -> Self {
    Self {
      status: entry.status,
      headers: entry.headers,
      body: entry.body,
    }
  }
}

/// Issues GET requests on behalf of the cache layer.
///
/// A transport failure (offline, DNS, refused connection) is an `Err`; any HTTP
/// status, successful or not, is an `Ok`.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
  async fn fetch(&self, url: &Url) -> Result<HttpResponse>;
}

/// `reqwest`-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("slidecache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, url: &Url) -> Result<HttpResponse> {
    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

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
      .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?
      .to_vec();

    Ok(HttpResponse {
      status,
      headers,
      body,
    })
  }
}
