//! Pure planning step of a reconciliation pass.

use peerlink_crypto::DecodedEntry;
use peerlink_types::{PeerAddress, PeerSet};
use std::collections::{BTreeSet, HashSet};

/// Registry mutations for one flavor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlavorPlan {
    /// Raw indices to delete, strictly descending.
    pub deletions: Vec<usize>,
    /// Observed addresses missing from the surviving remote entries, in sorted order.
    pub additions: Vec<PeerAddress>,
}

impl FlavorPlan {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.additions.is_empty()
    }
}

/// Plan deletions and additions for one flavor.
///
/// `remote` holds the entries that decoded, with their raw indices; `stale`
/// holds the remote addresses that failed their liveness probe. Every index
/// whose address is stale is deleted. Additions are the observed addresses not
/// present among the remote entries that survive the deletions.
pub fn plan_flavor(
    observed: &PeerSet,
    remote: &[DecodedEntry],
    stale: &HashSet<PeerAddress>,
) -> FlavorPlan {
    let deletions: BTreeSet<usize> = remote
        .iter()
        .filter(|entry| stale.contains(&entry.address))
        .map(|entry| entry.index)
        .collect();

    let surviving: HashSet<&PeerAddress> = remote
        .iter()
        .filter(|entry| !stale.contains(&entry.address))
        .map(|entry| &entry.address)
        .collect();

    let additions = observed
        .iter()
        .filter(|address| !surviving.contains(address))
        .cloned()
        .collect();

    FlavorPlan {
        deletions: deletions.into_iter().rev().collect(),
        additions,
    }
}
