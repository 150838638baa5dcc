use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("node descriptor key must look like id@addr:port, got {0:?}")]
    Malformed(String),
    #[error("invalid port in node descriptor key {0:?}")]
    InvalidPort(String),
}

/// Identity and control-plane location of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub addr: String,
    pub port: u16,
}

impl NodeDescriptor {
    pub fn new<I: Into<String>, A: Into<String>>(id: I, addr: A, port: u16) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
            port,
        }
    }

    /// Key under which the descriptor is stored in a node table.
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.id, self.addr, self.port)
    }

    /// Control-plane endpoint of this node.
    pub fn rpc_url(&self) -> String {
        if self.addr.contains(':') && !self.addr.starts_with('[') {
            format!("http://[{}]:{}/rpc", self.addr, self.port)
        } else {
            format!("http://{}:{}/rpc", self.addr, self.port)
        }
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for NodeDescriptor {
    type Err = DescriptorError;

    /// Parses the `id@addr:port` key form produced by [`NodeDescriptor::key`].
    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let (id, location) = key
            .split_once('@')
            .ok_or_else(|| DescriptorError::Malformed(key.to_string()))?;
        let (addr, port) = location
            .rsplit_once(':')
            .ok_or_else(|| DescriptorError::Malformed(key.to_string()))?;
        if id.is_empty() || addr.is_empty() {
            return Err(DescriptorError::Malformed(key.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| DescriptorError::InvalidPort(key.to_string()))?;
        Ok(Self::new(id, addr, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parses_back_to_descriptor() {
        let descriptor = NodeDescriptor::new("QmNode", "10.1.2.3", 14009);
        let key = descriptor.key();
        assert_eq!(key, "QmNode@10.1.2.3:14009");
        assert_eq!(key.parse::<NodeDescriptor>().unwrap(), descriptor);
    }

    #[test]
    fn ipv6_address_survives_key_round_trip() {
        let descriptor = NodeDescriptor::new("n1", "::1", 8080);
        assert_eq!(descriptor.key().parse::<NodeDescriptor>().unwrap(), descriptor);
        assert_eq!(descriptor.rpc_url(), "http://[::1]:8080/rpc");
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(matches!(
            "no-at-sign".parse::<NodeDescriptor>(),
            Err(DescriptorError::Malformed(_))
        ));
        assert!(matches!(
            "id@host".parse::<NodeDescriptor>(),
            Err(DescriptorError::Malformed(_))
        ));
        assert!(matches!(
            "id@host:notaport".parse::<NodeDescriptor>(),
            Err(DescriptorError::InvalidPort(_))
        ));
    }

    #[test]
    fn rpc_url_for_ipv4() {
        let descriptor = NodeDescriptor::new("n1", "127.0.0.1", 14009);
        assert_eq!(descriptor.rpc_url(), "http://127.0.0.1:14009/rpc");
    }
}
