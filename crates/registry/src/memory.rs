use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{AuthContext, RegistryBackend, RegistryList};
use crate::errors::{RegistryError, Result};

/// In-process registry backed by one vector per list.
///
/// Used in standalone mode and by tests. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    lists: Arc<RwLock<HashMap<RegistryList, Vec<String>>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a list's raw entries.
    pub fn entries(&self, list: &RegistryList) -> Vec<String> {
        self.lists.read().get(list).cloned().unwrap_or_default()
    }

    /// Replace a list's contents.
    pub fn seed(&self, list: RegistryList, entries: Vec<String>) {
        self.lists.write().insert(list, entries);
    }
}

fn check_auth(list: &RegistryList, auth: &AuthContext) -> Result<()> {
    if auth.account.is_empty() || auth.token.is_empty() {
        return Err(RegistryError::Write {
            list: list.clone(),
            reason: "unauthorized".into(),
        });
    }
    Ok(())
}

#[async_trait]
impl RegistryBackend for MemoryRegistry {
    async fn read(&self, list: &RegistryList) -> Result<Vec<String>> {
        Ok(self.entries(list))
    }

    async fn append(&self, list: &RegistryList, entries: &[String], auth: &AuthContext) -> Result<()> {
        check_auth(list, auth)?;
        self.lists
            .write()
            .entry(list.clone())
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }

    async fn delete_at(&self, list: &RegistryList, index: usize, auth: &AuthContext) -> Result<()> {
        check_auth(list, auth)?;
        let mut lists = self.lists.write();
        let entries = lists.entry(list.clone()).or_default();
        if index >= entries.len() {
            return Err(RegistryError::Write {
                list: list.clone(),
                reason: format!("index {index} out of range (len {})", entries.len()),
            });
        }
        entries.remove(index);
        Ok(())
    }
}
