//! peerlink local peer observation
//!
//! Answers "which peers does this node currently see, and which of them are
//! directly dialable?" for the content network and the ledger network.
//!
//! ## Modules
//! - `daemon`: content-network daemon client (Kubo-compatible HTTP API)
//! - `ledger_node`: ledger-network node client (JSON-RPC admin API)
//! - `probe`: endpoint extraction and bounded-timeout liveness probes
//! - `observer`: `PeerSource` implementations producing `ObservedPeers`
//! - `errors`: error types shared by the above

pub mod daemon;
pub mod errors;
pub mod ledger_node;
pub mod observer;
pub mod probe;

pub use daemon::{DaemonClient, DaemonIdentity, KuboClient, PeerConnection};
pub use errors::{DaemonError, LedgerError, ObserveError};
pub use ledger_node::{JsonRpcLedgerClient, LedgerNodeClient, LedgerNodeInfo, LedgerPeer};
pub use observer::{ContentPeerObserver, LedgerPeerObserver, PeerSource};
pub use probe::{extract_endpoint, Endpoint, LivenessProber, ProbeConfig};
