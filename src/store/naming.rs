//! Namespace naming: `"<role>-v<version>"`.

use std::fmt;

/// Logical role of a cache namespace. Exactly one namespace per role is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRole {
  /// Static shell assets (root document, stylesheets, icons, manifest)
  Static,
  /// Compiled slide documents
  Content,
  /// Dynamic JSON responses
  Runtime,
}

impl CacheRole {
  pub const ALL: [CacheRole; 3] = [CacheRole::Static, CacheRole::Content, CacheRole::Runtime];

  pub fn as_str(self) -> &'static str {
    match self {
      CacheRole::Static => "static",
      CacheRole::Content => "content",
      CacheRole::Runtime => "runtime",
    }
  }

  fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|role| role.as_str() == s)
  }
}

/// A role paired with a cache version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceName {
  pub role: CacheRole,
  pub version: u32,
}

impl NamespaceName {
  pub fn new(role: CacheRole, version: u32) -> Self {
    Self { role, version }
  }

  /// Names of every current namespace for a version.
  pub fn current_set(version: u32) -> Vec<String> {
    CacheRole::ALL
      .into_iter()
      .map(|role| Self::new(role, version).to_string())
      .collect()
  }

  /// Parse a stored namespace name. Returns None for names this layer did not create.
  pub fn parse(name: &str) -> Option<Self> {
    let (role, version) = name.rsplit_once("-v")?;
    Some(Self {
      role: CacheRole::parse(role)?,
      version: version.parse().ok()?,
    })
  }
}

impl fmt::Display for NamespaceName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-v{}", self.role.as_str(), self.version)
  }
}
