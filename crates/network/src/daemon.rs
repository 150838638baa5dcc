//! Client for the local content-network daemon (Kubo-compatible HTTP API).

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::DaemonError;

type Result<T> = std::result::Result<T, DaemonError>;

/// Identity the daemon reports for itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonIdentity {
    pub id: String,
    pub addresses: Vec<String>,
    pub agent_version: String,
}

/// One live connection of the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    pub peer_id: String,
    /// Remote address as the daemon reports it.
    pub address: String,
}

/// Operations the engine needs from the content-network daemon.
#[async_trait]
pub trait DaemonClient: Send + Sync {
    async fn is_ready(&self) -> bool;
    async fn identity(&self) -> Result<DaemonIdentity>;
    async fn connections(&self) -> Result<Vec<PeerConnection>>;
    async fn pin_add(&self, cid: &str) -> Result<()>;
    async fn pin_list(&self) -> Result<Vec<String>>;
    async fn pin_remove(&self, cid: &str) -> Result<()>;
}

/// HTTP client for a Kubo daemon.
///
/// The API address is either configured directly or read from the `api` file
/// the daemon writes into its repository when it starts.
#[derive(Debug)]
pub struct KuboClient {
    client: reqwest::Client,
    api_url: RwLock<Option<String>>,
    repo_path: Option<PathBuf>,
}

impl KuboClient {
    pub fn new(api_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
            api_url: RwLock::new(Some(api_url.into().trim_end_matches('/').to_string())),
            repo_path: None,
        })
    }

    /// Resolve the API address from `<repo>/api` on first use.
    pub fn from_repo(repo_path: impl Into<PathBuf>, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
            api_url: RwLock::new(None),
            repo_path: Some(repo_path.into()),
        })
    }

    async fn api_url(&self) -> Result<String> {
        let cached = self.api_url.read().clone();
        if let Some(url) = cached {
            return Ok(url);
        }
        let repo = self
            .repo_path
            .as_ref()
            .ok_or_else(|| DaemonError::ApiAddress("no API address configured".into()))?;
        let api_file = repo.join("api");
        let raw = tokio::fs::read_to_string(&api_file).await.map_err(|err| {
            DaemonError::ApiAddress(format!("{}: {err}", api_file.display()))
        })?;
        let url = api_url_from_multiaddr(raw.trim())?;
        debug!(api_url = %url, "resolved daemon API address from repository");
        *self.api_url.write() = Some(url.clone());
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, args: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/api/v0/{command}", self.api_url().await?);
        let response = self.client.post(url).query(args).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<KuboErrorBody>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(DaemonError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| DaemonError::Decode(format!("{command}: {err}")))
    }
}

#[async_trait]
impl DaemonClient for KuboClient {
    async fn is_ready(&self) -> bool {
        match self.call::<KuboVersion>("version", &[]).await {
            Ok(version) => {
                debug!(version = %version.version, "content daemon is ready");
                true
            }
            Err(err) => {
                warn!(error = %err, "content daemon readiness check failed");
                // Re-read the api file next time; the daemon may have restarted on a new port.
                if self.repo_path.is_some() {
                    *self.api_url.write() = None;
                }
                false
            }
        }
    }

    async fn identity(&self) -> Result<DaemonIdentity> {
        let body: KuboId = self.call("id", &[]).await?;
        Ok(DaemonIdentity {
            id: body.id,
            addresses: body.addresses.unwrap_or_default(),
            agent_version: body.agent_version.unwrap_or_default(),
        })
    }

    async fn connections(&self) -> Result<Vec<PeerConnection>> {
        let body: KuboSwarmPeers = self.call("swarm/peers", &[]).await?;
        Ok(body
            .peers
            .unwrap_or_default()
            .into_iter()
            .map(|peer| PeerConnection {
                peer_id: peer.peer,
                address: peer.addr,
            })
            .collect())
    }

    async fn pin_add(&self, cid: &str) -> Result<()> {
        let _: serde_json::Value = self.call("pin/add", &[("arg", cid)]).await?;
        Ok(())
    }

    async fn pin_list(&self) -> Result<Vec<String>> {
        let body: KuboPinList = self.call("pin/ls", &[("type", "recursive")]).await?;
        let mut keys: Vec<String> = body.keys.unwrap_or_default().into_keys().collect();
        keys.sort();
        Ok(keys)
    }

    async fn pin_remove(&self, cid: &str) -> Result<()> {
        let _: serde_json::Value = self.call("pin/rm", &[("arg", cid)]).await?;
        Ok(())
    }
}

fn build_client(request_timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(request_timeout).build()?)
}

/// Convert the daemon's `/ip4/127.0.0.1/tcp/5001` API multiaddr into an HTTP base URL.
fn api_url_from_multiaddr(raw: &str) -> Result<String> {
    let address = peerlink_types::PeerAddress::parse(raw)
        .map_err(|err| DaemonError::ApiAddress(format!("{raw:?}: {err}")))?;
    let endpoint = crate::probe::extract_endpoint(&address)
        .ok_or_else(|| DaemonError::ApiAddress(format!("no host in {raw:?}")))?;
    let port = endpoint
        .port
        .ok_or_else(|| DaemonError::ApiAddress(format!("no tcp port in {raw:?}")))?;
    Ok(format!("http://{}", endpoint.socket_target(port)))
}

#[derive(Debug, Deserialize)]
struct KuboErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct KuboVersion {
    #[serde(rename = "Version")]
    version: String,
}

#[derive(Debug, Deserialize)]
struct KuboId {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Addresses")]
    addresses: Option<Vec<String>>,
    #[serde(rename = "AgentVersion")]
    agent_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KuboSwarmPeers {
    #[serde(rename = "Peers")]
    peers: Option<Vec<KuboSwarmPeer>>,
}

#[derive(Debug, Deserialize)]
struct KuboSwarmPeer {
    #[serde(rename = "Addr")]
    addr: String,
    #[serde(rename = "Peer")]
    peer: String,
}

#[derive(Debug, Deserialize)]
struct KuboPinList {
    #[serde(rename = "Keys")]
    keys: Option<HashMap<String, serde_json::Value>>,
}
