//! Recipient address parsing and representation.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use crate::domain::Domain;

/// Errors produced when parsing an email address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The address contains no `@` separator.
    #[error("address is missing an '@' separator: {0:?}")]
    MissingSeparator(String),

    /// The address contains more than one `@` separator.
    #[error("address has more than one '@' separator: {0:?}")]
    MultipleSeparators(String),

    /// The part before the `@` is empty.
    #[error("address has an empty local part: {0:?}")]
    EmptyLocalPart(String),

    /// The part after the `@` is empty.
    #[error("address has an empty domain: {0:?}")]
    EmptyDomain(String),
}

/// An email address split into its local part and domain.
///
/// Parsing is deliberately strict about shape (exactly one `@`, both sides
/// non-empty) and deliberately loose about everything else: this is an
/// envelope address for SMTP commands, not an RFC 5322 display form.
///
/// # Examples
///
/// ```
/// use mxblast_common::Address;
///
/// let address: Address = "user@example.com".parse().unwrap();
/// assert_eq!(address.local_part(), "user");
/// assert_eq!(address.domain().as_str(), "example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    local_part: String,
    domain: Domain,
}

impl Address {
    /// The part of the address before the `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    /// The domain the address belongs to.
    #[must_use]
    pub const fn domain(&self) -> &Domain {
        &self.domain
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('@');

        let (Some(local_part), Some(domain)) = (parts.next(), parts.next()) else {
            return Err(AddressError::MissingSeparator(s.to_string()));
        };

        if parts.next().is_some() {
            return Err(AddressError::MultipleSeparators(s.to_string()));
        }

        if local_part.is_empty() {
            return Err(AddressError::EmptyLocalPart(s.to_string()));
        }

        if domain.is_empty() {
            return Err(AddressError::EmptyDomain(s.to_string()));
        }

        Ok(Self {
            local_part: local_part.to_string(),
            domain: Domain::new(domain),
        })
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
