use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::address::PeerAddress;

/// Reachability class of a peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// Only reachable indirectly, e.g. through a relay.
    Private,
    /// Directly dialable.
    Public,
}

impl Flavor {
    pub const ALL: [Flavor; 2] = [Flavor::Private, Flavor::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Private => "private",
            Flavor::Public => "public",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unordered collection of unique peer addresses.
///
/// Backed by a `BTreeSet` so iteration order is stable, which keeps registry
/// batches and log output deterministic across passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSet {
    peers: BTreeSet<PeerAddress>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the address was not already present.
    pub fn insert(&mut self, address: PeerAddress) -> bool {
        self.peers.insert(address)
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.peers.contains(address)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerAddress> {
        self.peers.iter()
    }

    /// Addresses in `self` that are absent from `other`.
    pub fn difference(&self, other: &PeerSet) -> PeerSet {
        self.peers.difference(&other.peers).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<PeerAddress> {
        self.peers.iter().cloned().collect()
    }
}

impl FromIterator<PeerAddress> for PeerSet {
    fn from_iter<T: IntoIterator<Item = PeerAddress>>(iter: T) -> Self {
        Self {
            peers: iter.into_iter().collect(),
        }
    }
}

impl Extend<PeerAddress> for PeerSet {
    fn extend<T: IntoIterator<Item = PeerAddress>>(&mut self, iter: T) {
        self.peers.extend(iter);
    }
}

impl IntoIterator for PeerSet {
    type Item = PeerAddress;
    type IntoIter = std::collections::btree_set::IntoIter<PeerAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.peers.into_iter()
    }
}

impl<'a> IntoIterator for &'a PeerSet {
    type Item = &'a PeerAddress;
    type IntoIter = std::collections::btree_set::Iter<'a, PeerAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.peers.iter()
    }
}

/// Peers a node currently sees, split by flavor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedPeers {
    pub private: PeerSet,
    pub public: PeerSet,
}

impl ObservedPeers {
    pub fn flavor(&self, flavor: Flavor) -> &PeerSet {
        match flavor {
            Flavor::Private => &self.private,
            Flavor::Public => &self.public,
        }
    }

    pub fn total(&self) -> usize {
        self.private.len() + self.public.len()
    }
}
