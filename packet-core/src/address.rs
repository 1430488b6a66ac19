//! ILP addresses
//!
//! An address is a scheme followed by one or more dot-separated segments,
//! e.g. `g.us-fed.ach.0.acmebank`. Route prefixes share the grammar but may
//! also be a bare scheme (`g`), which acts as a default route.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum encoded length of an address
pub const MAX_ADDRESS_LENGTH: usize = 1023;

static ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(g|private|example|peer|self|test[1-3]?|local)([.][a-zA-Z0-9_~-]+)+$")
        .expect("static address pattern")
});

static PREFIX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(g|private|example|peer|self|test[1-3]?|local)([.][a-zA-Z0-9_~-]+)*$")
        .expect("static prefix pattern")
});

/// Validated ILP address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        if address.len() > MAX_ADDRESS_LENGTH {
            return Err(Error::InvalidAddress(format!(
                "address exceeds {} bytes",
                MAX_ADDRESS_LENGTH
            )));
        }
        if !ADDRESS_PATTERN.is_match(&address) {
            return Err(Error::InvalidAddress(address));
        }
        Ok(Self(address))
    }

    /// Whether `prefix` is a syntactically valid route prefix
    pub fn is_valid_prefix(prefix: &str) -> bool {
        prefix.len() <= MAX_ADDRESS_LENGTH && PREFIX_PATTERN.is_match(prefix)
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Allocation scheme (first segment)
    pub fn scheme(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    /// Dot-separated segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Append a segment, e.g. `g.node` + `alice` = `g.node.alice`
    pub fn with_suffix(&self, segment: &str) -> Result<Self> {
        Address::new(format!("{}.{}", self.0, segment))
    }

    /// Segment-aware prefix test: `g.a` covers `g.a` and `g.a.b` but not `g.ab`
    pub fn has_prefix(&self, prefix: &str) -> bool {
        is_covered_by(&self.0, prefix)
    }

    /// Every prefix of this address, longest first: `g.a.b`, `g.a`, `g`
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        let address = self.0.as_str();
        let mut end = Some(address.len());
        std::iter::from_fn(move || {
            let current = end?;
            let prefix = &address[..current];
            end = prefix.rfind('.');
            Some(prefix)
        })
    }
}

/// Segment-aware prefix test on raw strings
pub fn is_covered_by(address: &str, prefix: &str) -> bool {
    address == prefix
        || (address.len() > prefix.len()
            && address.starts_with(prefix)
            && address.as_bytes()[prefix.len()] == b'.')
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Address::new(value)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        let s = std::str::from_utf8(value)
            .map_err(|_| Error::InvalidAddress("address is not valid UTF-8".to_string()))?;
        Address::new(s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        for address in ["g.alice", "test.bob.~x_y-z", "peer.config", "test3.a.b.c"] {
            assert!(Address::new(address).is_ok(), "{} should be valid", address);
        }
    }

    #[test]
    fn test_invalid_addresses() {
        for address in ["g", "alice.bob", "g.", "g..a", "g.a b", "test4.a", ""] {
            assert!(Address::new(address).is_err(), "{} should be invalid", address);
        }
    }

    #[test]
    fn test_bare_scheme_is_valid_prefix() {
        assert!(Address::is_valid_prefix("g"));
        assert!(Address::is_valid_prefix("test.a"));
        assert!(!Address::is_valid_prefix("nope.a"));
    }

    #[test]
    fn test_segment_aware_prefix() {
        let address = Address::new("g.a.b").unwrap();
        assert!(address.has_prefix("g"));
        assert!(address.has_prefix("g.a"));
        assert!(address.has_prefix("g.a.b"));
        assert!(!address.has_prefix("g.a.b.c"));

        let address = Address::new("g.ab").unwrap();
        assert!(!address.has_prefix("g.a"));
    }

    #[test]
    fn test_prefixes_longest_first() {
        let address = Address::new("g.a.b.c").unwrap();
        let prefixes: Vec<&str> = address.prefixes().collect();
        assert_eq!(prefixes, vec!["g.a.b.c", "g.a.b", "g.a", "g"]);
    }

    #[test]
    fn test_with_suffix() {
        let address = Address::new("test.node").unwrap();
        assert_eq!(address.with_suffix("alice").unwrap().as_str(), "test.node.alice");
        assert!(address.with_suffix("bad id").is_err());
    }
}
