//! Core data model shared by every peerlink crate.
//!
//! - `address`: normalized peer address strings
//! - `peer_set`: de-duplicated peer collections and the private/public flavor split
//! - `descriptor`: node descriptors exchanged over the control-plane RPC

pub mod address;
pub mod descriptor;
pub mod peer_set;

pub use address::{AddressError, PeerAddress, MAX_ADDRESS_LEN};
pub use descriptor::{DescriptorError, NodeDescriptor};
pub use peer_set::{Flavor, ObservedPeers, PeerSet};
