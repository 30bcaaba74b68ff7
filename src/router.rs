//! Classifies requests into caching policies.

use regex::Regex;
use std::collections::HashSet;
use url::{Origin, Url};

use crate::store::CacheRole;

/// HTTP method of an intercepted request. Only GET is ever served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  Options,
}

impl Method {
  pub fn parse(s: &str) -> Option<Self> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Some(Method::Get),
      "HEAD" => Some(Method::Head),
      "POST" => Some(Method::Post),
      "PUT" => Some(Method::Put),
      "PATCH" => Some(Method::Patch),
      "DELETE" => Some(Method::Delete),
      "OPTIONS" => Some(Method::Options),
      _ => None,
    }
  }
}

/// An outgoing request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Client that issued the request, if known
  pub client_id: Option<String>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      client_id: None,
    }
  }

  pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
    self.client_id = Some(client_id.into());
    self
  }
}

/// Serving policy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Not intercepted: goes straight to the network
  Passthrough,
  /// Static shell asset
  CacheFirst,
  /// Versioned slide document
  StaleWhileRevalidate,
  /// Dynamic JSON
  NetworkFirst,
}

impl Route {
  /// Namespace role the route reads and writes.
  pub fn role(self) -> Option<CacheRole> {
    match self {
      Route::Passthrough => None,
      Route::CacheFirst => Some(CacheRole::Static),
      Route::StaleWhileRevalidate => Some(CacheRole::Content),
      Route::NetworkFirst => Some(CacheRole::Runtime),
    }
  }
}

/// Ordered, first-match-wins request classifier.
#[derive(Debug, Clone)]
pub struct Router {
  origin: Origin,
  content_pattern: Regex,
  static_assets: HashSet<String>,
}

impl Router {
  pub fn new(origin: &Url, content_pattern: Regex, static_assets: &[String]) -> Self {
    Self {
      origin: origin.origin(),
      content_pattern,
      static_assets: static_assets.iter().cloned().collect(),
    }
  }

  pub fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin
  }

  pub fn route(&self, request: &Request) -> Route {
    if request.method != Method::Get || !self.is_same_origin(&request.url) {
      return Route::Passthrough;
    }

    let path = request.url.path();

    if self.content_pattern.is_match(path) {
      Route::StaleWhileRevalidate
    } else if self.static_assets.contains(path) {
      Route::CacheFirst
    } else if path.ends_with(".json") {
      Route::NetworkFirst
    } else {
      Route::Passthrough
    }
  }
}

/// Cache key for a request URL: the fragment and an empty query are dropped.
pub fn cache_key(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  if url.query() == Some("") {
    url.set_query(None);
  }
  url.to_string()
}
