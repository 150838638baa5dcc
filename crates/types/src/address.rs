use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when parsing a peer address string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("peer address cannot be empty")]
    Empty,
    #[error("peer address must be at most {max} characters, got {actual}")]
    TooLong { max: usize, actual: usize },
    #[error("peer address contains whitespace or control characters")]
    InvalidCharacter,
}

/// Upper bound on the length of a single address. Keeps registry entries small.
pub const MAX_ADDRESS_LEN: usize = 512;

/// Network location of a node.
///
/// The value is opaque to the registry: a content-network multiaddr such as
/// `/ip4/10.0.0.1/tcp/4001/p2p/Qm…`, or a ledger-network `identity@host:port`
/// string. Construction normalizes the input (trims surrounding whitespace and
/// trailing slashes) so that equality is an exact string comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let mut normalized = raw.trim();
        while normalized.len() > 1 && normalized.ends_with('/') {
            normalized = &normalized[..normalized.len() - 1];
        }

        if normalized.is_empty() {
            return Err(AddressError::Empty);
        }
        if normalized.len() > MAX_ADDRESS_LEN {
            return Err(AddressError::TooLong {
                max: MAX_ADDRESS_LEN,
                actual: normalized.len(),
            });
        }
        if normalized
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(AddressError::InvalidCharacter);
        }

        Ok(Self(normalized.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PeerAddress> for String {
    fn from(value: PeerAddress) -> Self {
        value.0
    }
}

impl AsRef<str> for PeerAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
