//! Typed calls against another node's `/rpc` endpoint.

use peerlink_types::NodeDescriptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::protocol::{RpcMethod, RpcRequest, RpcResponse, PONG};

#[derive(Debug, Error)]
pub enum RpcClientError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote node returned an error: {0}")]
    Remote(String),
    #[error("rpc protocol violation: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, RpcClientError>;

#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(request_timeout).build()?,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P, R>(&self, endpoint: &str, method: RpcMethod, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = serde_json::to_value(params)
            .map_err(|err| RpcClientError::Protocol(format!("unencodable params: {err}")))?;
        let request = RpcRequest {
            method: method.as_str().to_string(),
            params,
            id,
        };
        debug!(%endpoint, %method, id, "rpc call");

        let response: RpcResponse = self
            .http
            .post(endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.id != id {
            return Err(RpcClientError::Protocol(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }
        if let Some(error) = response.error {
            return Err(RpcClientError::Remote(error));
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|err| RpcClientError::Protocol(format!("unexpected {method} result: {err}")))
    }

    pub async fn id(&self, endpoint: &str) -> Result<NodeDescriptor> {
        self.call(endpoint, RpcMethod::Id, Value::Null).await
    }

    /// Fails with `Protocol` when the node answers anything but `pong`.
    pub async fn ping(&self, endpoint: &str) -> Result<()> {
        let answer: String = self.call(endpoint, RpcMethod::Ping, Value::Null).await?;
        if answer != PONG {
            return Err(RpcClientError::Protocol(format!(
                "expected {PONG:?}, got {answer:?}"
            )));
        }
        Ok(())
    }

    pub async fn pins(&self, endpoint: &str) -> Result<Vec<String>> {
        self.call(endpoint, RpcMethod::Pins, Value::Null).await
    }

    pub async fn pin_video(&self, endpoint: &str, cid: &str) -> Result<bool> {
        self.call(endpoint, RpcMethod::PinVideo, cid).await
    }

    /// Nodes known to the remote side. An empty answer is treated as an error.
    pub async fn peers(&self, endpoint: &str, caller: &NodeDescriptor) -> Result<Vec<NodeDescriptor>> {
        let peers: Vec<NodeDescriptor> = self.call(endpoint, RpcMethod::Peers, caller).await?;
        if peers.is_empty() {
            return Err(RpcClientError::Protocol("no data".into()));
        }
        Ok(peers)
    }

    pub async fn add_peer(&self, endpoint: &str, descriptor: &NodeDescriptor) -> Result<()> {
        let added: bool = self.call(endpoint, RpcMethod::AddPeer, descriptor).await?;
        if !added {
            return Err(RpcClientError::Protocol("connect failed".into()));
        }
        Ok(())
    }

    /// Ask the remote node to ping `descriptor` back and register it.
    pub async fn connect(&self, endpoint: &str, descriptor: &NodeDescriptor) -> Result<()> {
        let connected: bool = self.call(endpoint, RpcMethod::Connect, descriptor).await?;
        if !connected {
            return Err(RpcClientError::Protocol(format!(
                "remote node could not reach {}",
                descriptor.rpc_url()
            )));
        }
        Ok(())
    }
}
