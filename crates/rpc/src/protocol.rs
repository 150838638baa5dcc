use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Literal answer to `Node.Ping`.
pub const PONG: &str = "pong";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    Id,
    Ping,
    Pins,
    PinVideo,
    Peers,
    AddPeer,
    Connect,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 7] = [
        RpcMethod::Id,
        RpcMethod::Ping,
        RpcMethod::Pins,
        RpcMethod::PinVideo,
        RpcMethod::Peers,
        RpcMethod::AddPeer,
        RpcMethod::Connect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::Id => "Node.ID",
            RpcMethod::Ping => "Node.Ping",
            RpcMethod::Pins => "Node.Pins",
            RpcMethod::PinVideo => "Node.PinVideo",
            RpcMethod::Peers => "Node.Peers",
            RpcMethod::AddPeer => "Node.AddPeer",
            RpcMethod::Connect => "Node.Connect",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RpcMethod {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        RpcMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == name)
            .ok_or_else(|| format!("unknown method {name:?}"))
    }
}
