//! Client for the local ledger-network node over its JSON-RPC admin API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::LedgerError;

type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerNodeInfo {
    pub id: String,
    pub enode: String,
    pub name: String,
}

/// A peer the ledger node is connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPeer {
    pub id: String,
    pub enode: String,
    pub remote_address: String,
    pub inbound: bool,
}

impl LedgerPeer {
    /// The enode URL without discovery query parameters.
    pub fn dialable(&self) -> String {
        match self.enode.split_once('?') {
            Some((base, _)) => base.to_string(),
            None => self.enode.clone(),
        }
    }
}

#[async_trait]
pub trait LedgerNodeClient: Send + Sync {
    async fn is_ready(&self) -> bool;
    async fn node_info(&self) -> Result<LedgerNodeInfo>;
    async fn peers(&self) -> Result<Vec<LedgerPeer>>;
}

/// JSON-RPC 2.0 client for geth-style `admin_*` methods.
#[derive(Debug)]
pub struct JsonRpcLedgerClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcLedgerClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(request_timeout).build()?,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params: [],
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|err| LedgerError::Decode(format!("{method}: {err}")))?;

        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        body.result
            .ok_or_else(|| LedgerError::MissingResult(method.to_string()))
    }
}

#[async_trait]
impl LedgerNodeClient for JsonRpcLedgerClient {
    async fn is_ready(&self) -> bool {
        match self.call::<String>("web3_clientVersion").await {
            Ok(version) => {
                debug!(%version, "ledger node is ready");
                true
            }
            Err(err) => {
                warn!(error = %err, "ledger node readiness check failed");
                false
            }
        }
    }

    async fn node_info(&self) -> Result<LedgerNodeInfo> {
        let info: NodeInfoDto = self.call("admin_nodeInfo").await?;
        Ok(LedgerNodeInfo {
            id: info.id,
            enode: info.enode,
            name: info.name.unwrap_or_default(),
        })
    }

    async fn peers(&self) -> Result<Vec<LedgerPeer>> {
        let peers: Vec<PeerDto> = self.call("admin_peers").await?;
        Ok(peers
            .into_iter()
            .map(|peer| LedgerPeer {
                id: peer.id,
                enode: peer.enode,
                remote_address: peer.network.remote_address,
                inbound: peer.network.inbound,
            })
            .collect())
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: [(); 0],
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcErrorDto>,
}

#[derive(Deserialize)]
struct JsonRpcErrorDto {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct NodeInfoDto {
    id: String,
    enode: String,
    name: Option<String>,
}

#[derive(Deserialize)]
struct PeerDto {
    id: String,
    enode: String,
    network: PeerNetworkDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerNetworkDto {
    remote_address: String,
    #[serde(default)]
    inbound: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialable_enode_drops_query() {
        let peer = LedgerPeer {
            id: "abc".into(),
            enode: "enode://abc@10.0.0.2:30303?discport=0".into(),
            remote_address: "10.0.0.2:30303".into(),
            inbound: false,
        };
        assert_eq!(peer.dialable(), "enode://abc@10.0.0.2:30303");
    }

    #[test]
    fn request_serializes_with_empty_params() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "admin_peers",
            params: [],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"jsonrpc": "2.0", "id": 7, "method": "admin_peers", "params": []})
        );
    }

    #[test]
    fn peers_response_decodes() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"result":[{"id":"abc","enode":"enode://abc@1.2.3.4:30303","network":{"localAddress":"10.0.0.1:1","remoteAddress":"1.2.3.4:30303","inbound":true}}]}"#;
        let body: JsonRpcResponse<Vec<PeerDto>> = serde_json::from_str(raw).unwrap();
        let peers = body.result.unwrap();
        assert_eq!(peers.len(), 1);
        assert!(peers[0].network.inbound);
        assert_eq!(peers[0].network.remote_address, "1.2.3.4:30303");
    }
}
