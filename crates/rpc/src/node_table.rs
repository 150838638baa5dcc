use parking_lot::RwLock;
use peerlink_types::NodeDescriptor;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Nodes that introduced themselves to this node, keyed by `id@addr:port`.
///
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    nodes: Arc<RwLock<HashMap<String, bool>>>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node as known. Returns `true` if it was not known before.
    pub fn register(&self, descriptor: &NodeDescriptor) -> bool {
        self.nodes.write().insert(descriptor.key(), true).is_none()
    }

    pub fn contains(&self, descriptor: &NodeDescriptor) -> bool {
        self.nodes
            .read()
            .get(&descriptor.key())
            .copied()
            .unwrap_or(false)
    }

    /// Known nodes, sorted by key.
    pub fn list(&self) -> Vec<NodeDescriptor> {
        let nodes = self.nodes.read();
        let mut keys: Vec<&String> = nodes
            .iter()
            .filter(|(_, known)| **known)
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| match key.parse::<NodeDescriptor>() {
                Ok(descriptor) => Some(descriptor),
                Err(err) => {
                    warn!(%key, error = %err, "dropping malformed node table key");
                    None
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}
