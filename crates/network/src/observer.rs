//! Local peer observers.
//!
//! An observer asks a local service which peers it is connected to and keeps
//! the ones that answer a liveness probe. Those form the public candidate set.
//! Private candidates would need a relay-address format that no service
//! exposes yet, so the private set is always empty.

use async_trait::async_trait;
use peerlink_types::{ObservedPeers, PeerAddress, PeerSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::daemon::DaemonClient;
use crate::errors::ObserveError;
use crate::ledger_node::LedgerNodeClient;
use crate::probe::LivenessProber;

/// Produces the locally observed peer set for one network.
#[async_trait]
pub trait PeerSource: Send + Sync {
    /// Short name used in logs and metrics labels.
    fn name(&self) -> &str;

    async fn observe(&self) -> Result<ObservedPeers, ObserveError>;
}

/// Observer for the content-network daemon.
pub struct ContentPeerObserver {
    daemon: Arc<dyn DaemonClient>,
    prober: LivenessProber,
}

impl ContentPeerObserver {
    pub fn new(daemon: Arc<dyn DaemonClient>, prober: LivenessProber) -> Self {
        Self { daemon, prober }
    }
}

#[async_trait]
impl PeerSource for ContentPeerObserver {
    fn name(&self) -> &str {
        "content"
    }

    async fn observe(&self) -> Result<ObservedPeers, ObserveError> {
        if !self.daemon.is_ready().await {
            return Err(ObserveError::DaemonUnreachable {
                service: "content daemon",
            });
        }

        let identity = self.daemon.identity().await?;
        info!(
            network = self.name(),
            peer_id = %identity.id,
            agent = %identity.agent_version,
            listen_addrs = identity.addresses.len(),
            "observing local peers"
        );

        let connections = self.daemon.connections().await?;
        let candidates = parse_candidates(
            self.name(),
            connections.into_iter().map(|connection| connection.address),
        );
        Ok(classify(self.name(), &self.prober, candidates).await)
    }
}

/// Observer for the ledger-network node.
pub struct LedgerPeerObserver {
    node: Arc<dyn LedgerNodeClient>,
    prober: LivenessProber,
}

impl LedgerPeerObserver {
    pub fn new(node: Arc<dyn LedgerNodeClient>, prober: LivenessProber) -> Self {
        Self { node, prober }
    }
}

#[async_trait]
impl PeerSource for LedgerPeerObserver {
    fn name(&self) -> &str {
        "ledger"
    }

    async fn observe(&self) -> Result<ObservedPeers, ObserveError> {
        if !self.node.is_ready().await {
            return Err(ObserveError::DaemonUnreachable {
                service: "ledger node",
            });
        }

        let info = self.node.node_info().await?;
        info!(
            network = self.name(),
            node_id = %info.id,
            client = %info.name,
            "observing local peers"
        );

        let peers = self.node.peers().await?;
        let candidates = parse_candidates(self.name(), peers.iter().map(|peer| peer.dialable()));
        Ok(classify(self.name(), &self.prober, candidates).await)
    }
}

fn parse_candidates<I>(network: &str, raw: I) -> Vec<PeerAddress>
where
    I: IntoIterator<Item = String>,
{
    raw.into_iter()
        .filter_map(|address| match PeerAddress::parse(&address) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!(network, %address, error = %err, "ignoring unparseable peer address");
                None
            }
        })
        .collect()
}

async fn classify(network: &str, prober: &LivenessProber, candidates: Vec<PeerAddress>) -> ObservedPeers {
    let connected = candidates.len();
    let verdicts = prober.probe_all(candidates).await;

    let public: PeerSet = verdicts
        .into_iter()
        .filter_map(|(address, alive)| alive.then_some(address))
        .collect();

    debug!(
        network,
        connected,
        reachable = public.len(),
        "classified connected peers"
    );

    ObservedPeers {
        private: PeerSet::default(),
        public,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::{DaemonIdentity, PeerConnection};
    use crate::errors::DaemonError;
    use crate::probe::ProbeConfig;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct FakeDaemon {
        ready: bool,
        connections: Vec<PeerConnection>,
    }

    #[async_trait]
    impl DaemonClient for FakeDaemon {
        async fn is_ready(&self) -> bool {
            self.ready
        }

        async fn identity(&self) -> Result<DaemonIdentity, DaemonError> {
            Ok(DaemonIdentity {
                id: "QmSelf".into(),
                addresses: vec![],
                agent_version: "fake/0.1".into(),
            })
        }

        async fn connections(&self) -> Result<Vec<PeerConnection>, DaemonError> {
            Ok(self.connections.clone())
        }

        async fn pin_add(&self, _cid: &str) -> Result<(), DaemonError> {
            Ok(())
        }

        async fn pin_list(&self) -> Result<Vec<String>, DaemonError> {
            Ok(vec![])
        }

        async fn pin_remove(&self, _cid: &str) -> Result<(), DaemonError> {
            Ok(())
        }
    }

    fn prober() -> LivenessProber {
        LivenessProber::new(ProbeConfig {
            timeout: Duration::from_millis(500),
            concurrency: 4,
            default_port: 4001,
        })
    }

    #[tokio::test]
    async fn unready_daemon_aborts_observation() {
        let observer = ContentPeerObserver::new(
            Arc::new(FakeDaemon {
                ready: false,
                connections: vec![],
            }),
            prober(),
        );
        assert!(matches!(
            observer.observe().await,
            Err(ObserveError::DaemonUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn only_reachable_peers_become_public_candidates() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_port = listener.local_addr().unwrap().port();
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = dead.local_addr().unwrap().port();
        drop(dead);

        let live = format!("/ip4/127.0.0.1/tcp/{live_port}");
        let observer = ContentPeerObserver::new(
            Arc::new(FakeDaemon {
                ready: true,
                connections: vec![
                    PeerConnection {
                        peer_id: "QmLive".into(),
                        address: live.clone(),
                    },
                    PeerConnection {
                        peer_id: "QmDead".into(),
                        address: format!("/ip4/127.0.0.1/tcp/{dead_port}"),
                    },
                    PeerConnection {
                        peer_id: "QmBroken".into(),
                        address: "not an address".into(),
                    },
                ],
            }),
            prober(),
        );

        let observed = observer.observe().await.unwrap();
        assert!(observed.private.is_empty());
        assert_eq!(observed.public.len(), 1);
        assert!(observed
            .public
            .contains(&PeerAddress::parse(&live).unwrap()));
    }
}
