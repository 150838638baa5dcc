//! peerlink registry access
//!
//! The registry holds two positional lists of encoded peer addresses per
//! namespace, one per [`Flavor`](peerlink_types::Flavor). Entries can be
//! appended in batches and removed one index at a time; an index is only
//! stable until the next delete on the same list.

pub mod backend;
pub mod client;
pub mod errors;
pub mod http;
pub mod memory;

pub use backend::{AuthContext, RegistryBackend, RegistryList};
pub use client::RegistryClient;
pub use errors::{RegistryError, Result};
pub use http::HttpRegistry;
pub use memory::MemoryRegistry;
