//! Core types: SecurityId, Quantity, holdings and price tables.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::error::ValidationError;

/// Length of every security identifier.
pub const SECURITY_ID_LEN: usize = 24;

/// A 24-character alphanumeric security identifier.
///
/// Stored inline as bytes so it is `Copy` and hashes cheaply; construction
/// guarantees the contents are ASCII alphanumerics.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecurityId([u8; SECURITY_ID_LEN]);

impl SecurityId {
    /// Parse an identifier, rejecting anything that is not exactly 24 ASCII
    /// alphanumeric characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let bytes = s.as_bytes();
        if bytes.len() != SECURITY_ID_LEN || !bytes.iter().all(u8::is_ascii_alphanumeric) {
            return Err(ValidationError::InvalidSecurityId(s.to_string()));
        }
        let mut buf = [0u8; SECURITY_ID_LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII alphanumerics are ever stored.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecurityId({})", self.as_str())
    }
}

impl std::str::FromStr for SecurityId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for SecurityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SecurityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SecurityId::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Whole units of a security. Signed so that bad external input can be
/// represented and rejected rather than silently wrapped.
pub type Quantity = i64;

/// Current holdings: security → quantity held.
pub type CurrentHoldings = BTreeMap<SecurityId, Quantity>;

/// Price table: security → unit price.
pub type PriceTable = BTreeMap<SecurityId, Decimal>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_id() {
        let id = SecurityId::new("5f1e2d3c4b5a69788796a5b4").unwrap();
        assert_eq!(id.as_str(), "5f1e2d3c4b5a69788796a5b4");
        assert_eq!(format!("{id}"), "5f1e2d3c4b5a69788796a5b4");
    }

    #[test]
    fn reject_wrong_length() {
        assert!(SecurityId::new("ABC").is_err());
        assert!(SecurityId::new(&"A".repeat(25)).is_err());
        assert!(SecurityId::new("").is_err());
    }

    #[test]
    fn reject_non_alphanumeric() {
        assert!(SecurityId::new("5f1e2d3c4b5a69788796a5b-").is_err());
        assert!(SecurityId::new("5f1e2d3c4b5a6978 796a5b4").is_err());
        assert!(SecurityId::new("5f1e2d3c4b5a69788796a5bé").is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = SecurityId::new(&format!("{:0>24}", "A")).unwrap();
        let b = SecurityId::new(&format!("{:0>24}", "B")).unwrap();
        assert!(a < b);
    }

    #[test]
    fn from_str_roundtrip() {
        let id: SecurityId = "AAAABBBBCCCCDDDDEEEEFFFF".parse().unwrap();
        assert_eq!(id.to_string(), "AAAABBBBCCCCDDDDEEEEFFFF");
    }
}
