use peerlink_types::Flavor;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{AuthContext, RegistryBackend, RegistryList};
use crate::errors::{RegistryError, Result};

/// Flavor-typed access to one namespace of the registry.
///
/// Only public entries can be deleted; the private list grows by append.
#[derive(Clone)]
pub struct RegistryClient {
    backend: Arc<dyn RegistryBackend>,
    namespace: String,
    auth: AuthContext,
}

impl RegistryClient {
    pub fn new(
        backend: Arc<dyn RegistryBackend>,
        namespace: impl Into<String>,
        auth: AuthContext,
    ) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.trim().is_empty() {
            return Err(RegistryError::InvalidConfig(
                "registry namespace must not be empty".into(),
            ));
        }
        if auth.account.trim().is_empty() || auth.token.trim().is_empty() {
            return Err(RegistryError::InvalidConfig(format!(
                "registry authorization missing for namespace {namespace}"
            )));
        }
        Ok(Self {
            backend,
            namespace,
            auth,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn list(&self, flavor: Flavor) -> RegistryList {
        RegistryList::new(self.namespace.clone(), flavor)
    }

    pub async fn read(&self, flavor: Flavor) -> Result<Vec<String>> {
        let list = self.list(flavor);
        match self.backend.read(&list).await {
            Ok(entries) => Ok(entries),
            Err(RegistryError::Read { reason, .. }) | Err(RegistryError::Write { reason, .. }) => {
                Err(RegistryError::Read { list, reason })
            }
            Err(err) => Err(err),
        }
    }

    pub async fn read_private(&self) -> Result<Vec<String>> {
        self.read(Flavor::Private).await
    }

    pub async fn read_public(&self) -> Result<Vec<String>> {
        self.read(Flavor::Public).await
    }

    /// Append non-empty entries in one batch. Returns how many were submitted.
    pub async fn append(&self, flavor: Flavor, entries: &[String]) -> Result<usize> {
        let batch: Vec<String> = entries
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .cloned()
            .collect();
        if batch.is_empty() {
            debug!(namespace = %self.namespace, %flavor, "nothing to append");
            return Ok(0);
        }

        let list = self.list(flavor);
        self.backend
            .append(&list, &batch, &self.auth)
            .await
            .map_err(|err| as_write_error(list, err))?;
        Ok(batch.len())
    }

    pub async fn append_private(&self, entries: &[String]) -> Result<usize> {
        self.append(Flavor::Private, entries).await
    }

    pub async fn append_public(&self, entries: &[String]) -> Result<usize> {
        self.append(Flavor::Public, entries).await
    }

    pub async fn delete_public(&self, index: usize) -> Result<()> {
        let list = self.list(Flavor::Public);
        self.backend
            .delete_at(&list, index, &self.auth)
            .await
            .map_err(|err| as_write_error(list, err))
    }
}

fn as_write_error(list: RegistryList, err: RegistryError) -> RegistryError {
    match err {
        RegistryError::Read { reason, .. } | RegistryError::Write { reason, .. } => {
            RegistryError::Write { list, reason }
        }
        other => other,
    }
}
