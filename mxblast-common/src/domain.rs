//! Domain newtype for type safety
//!
//! Wraps domain strings to prevent accidentally passing full email
//! addresses or hostnames where a recipient domain is expected. Cheap to
//! clone: the inner representation is an `Arc<str>`.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// A recipient domain name.
///
/// # Examples
///
/// ```
/// use mxblast_common::Domain;
///
/// let domain = Domain::new("example.com");
/// assert_eq!(domain.as_str(), "example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    /// Create a new `Domain` from any type that can be converted to `Arc<str>`.
    #[must_use]
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    /// Get the domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}
