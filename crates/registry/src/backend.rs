use async_trait::async_trait;
use peerlink_types::Flavor;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Result;

/// Address of one registry list: a namespace (`content`, `ledger`, …) and a flavor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryList {
    pub namespace: String,
    pub flavor: Flavor,
}

impl RegistryList {
    pub fn new(namespace: impl Into<String>, flavor: Flavor) -> Self {
        Self {
            namespace: namespace.into(),
            flavor,
        }
    }
}

impl fmt::Display for RegistryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.flavor)
    }
}

/// Credentials attached to every registry write.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub account: String,
    pub token: String,
}

impl AuthContext {
    pub fn new(account: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Storage collaborator holding the registry lists.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Raw entries of a list, in positional order.
    async fn read(&self, list: &RegistryList) -> Result<Vec<String>>;

    /// Append entries at the end of a list, preserving their order.
    async fn append(&self, list: &RegistryList, entries: &[String], auth: &AuthContext) -> Result<()>;

    /// Remove the entry at `index`; later entries shift down by one.
    async fn delete_at(&self, list: &RegistryList, index: usize, auth: &AuthContext) -> Result<()>;
}
