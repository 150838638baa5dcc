//! peerlink control-plane RPC
//!
//! Nodes introduce themselves to each other over `POST /rpc` with a small
//! JSON envelope: `{"method": "Node.<Name>", "params": …, "id": n}` answered
//! by `{"id": n, "result": …, "error": …}`.

pub mod client;
pub mod node_table;
pub mod protocol;
pub mod server;

pub use client::{RpcClient, RpcClientError};
pub use node_table::NodeTable;
pub use protocol::{RpcMethod, RpcRequest, RpcResponse, PONG};
pub use server::{build_router, serve, RpcState};
