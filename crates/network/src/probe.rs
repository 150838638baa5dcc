//! Endpoint extraction and liveness probing.
//!
//! A probe is a plain TCP connect under a deadline; the connection is dropped
//! as soon as it is established. Independent candidates are probed
//! concurrently with a bounded worker count.

use futures::stream::{self, StreamExt};
use peerlink_types::PeerAddress;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use url::{Host, Url};

/// Host and optional port embedded in a peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    /// `host:port` with IPv6 hosts bracketed, using `default_port` when the
    /// address did not carry one.
    pub fn socket_target(&self, default_port: u16) -> String {
        let port = self.port.unwrap_or(default_port);
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{port}", self.host)
        } else {
            format!("{}:{port}", self.host)
        }
    }
}

/// Extract the dialable host (and port, when present) from a peer address.
///
/// Understands multiaddr-style paths (`/ip4/…/tcp/…`, `/ip6`, `/dns`,
/// `/dns4`, `/dns6`) and `identity@host:port` strings with or without an
/// `enode://` scheme. Returns `None` when no host can be found.
pub fn extract_endpoint(address: &PeerAddress) -> Option<Endpoint> {
    let raw = address.as_str();
    if raw.starts_with('/') {
        extract_multiaddr_endpoint(raw)
    } else {
        extract_authority_endpoint(raw)
    }
}

fn extract_multiaddr_endpoint(raw: &str) -> Option<Endpoint> {
    let mut segments = raw.split('/').skip(1);
    let mut host = None;
    let mut port = None;

    while let Some(protocol) = segments.next() {
        match protocol {
            "ip4" | "ip6" => {
                let value = segments.next()?;
                let ip: IpAddr = value.parse().ok()?;
                if host.is_none() {
                    host = Some(ip.to_string());
                }
            }
            "dns" | "dns4" | "dns6" => {
                let value = segments.next()?;
                if value.is_empty() {
                    return None;
                }
                if host.is_none() {
                    host = Some(value.to_string());
                }
            }
            "tcp" => {
                let value = segments.next()?;
                if port.is_none() {
                    port = Some(value.parse::<u16>().ok()?);
                }
            }
            // Everything after a relay hop describes the target, not the dialable hop.
            "p2p-circuit" => break,
            "udp" | "p2p" | "ipfs" | "sni" => {
                segments.next();
            }
            _ => {}
        }
    }

    host.map(|host| Endpoint { host, port })
}

fn extract_authority_endpoint(raw: &str) -> Option<Endpoint> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("enode://{raw}")
    };
    let url = Url::parse(&candidate).ok()?;
    let host = match url.host()? {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };
    Some(Endpoint {
        host,
        port: url.port(),
    })
}

/// Liveness probe settings.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Deadline for a single connection attempt.
    pub timeout: Duration,
    /// Maximum number of probes in flight.
    pub concurrency: usize,
    /// Port used when an address does not embed one.
    pub default_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            concurrency: 16,
            default_port: 4001,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LivenessProber {
    config: ProbeConfig,
}

impl LivenessProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe one address. Addresses without an extractable host are unreachable.
    pub async fn probe(&self, address: &PeerAddress) -> bool {
        match extract_endpoint(address) {
            Some(endpoint) => {
                let target = endpoint.socket_target(self.config.default_port);
                self.probe_target(&target).await
            }
            None => {
                debug!(%address, "no dialable endpoint in address");
                false
            }
        }
    }

    pub async fn probe_target(&self, target: &str) -> bool {
        match timeout(self.config.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                debug!(target, error = %err, "liveness probe failed");
                false
            }
            Err(_) => {
                debug!(target, timeout_ms = self.config.timeout.as_millis() as u64, "liveness probe timed out");
                false
            }
        }
    }

    /// Probe every address concurrently; one verdict per distinct address.
    pub async fn probe_all<I>(&self, addresses: I) -> HashMap<PeerAddress, bool>
    where
        I: IntoIterator<Item = PeerAddress>,
    {
        let concurrency = self.config.concurrency.max(1);
        let mut unique: Vec<PeerAddress> = addresses.into_iter().collect();
        unique.sort();
        unique.dedup();

        stream::iter(unique)
            .map(|address| async move {
                let alive = self.probe(&address).await;
                (address, alive)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }
}

impl Default for LivenessProber {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn addr(s: &str) -> PeerAddress {
        PeerAddress::parse(s).unwrap()
    }

    fn endpoint(host: &str, port: Option<u16>) -> Option<Endpoint> {
        Some(Endpoint {
            host: host.to_string(),
            port,
        })
    }

    #[test]
    fn multiaddr_endpoints() {
        assert_eq!(
            extract_endpoint(&addr("/ip4/10.0.0.1/tcp/4001/p2p/QmPeer")),
            endpoint("10.0.0.1", Some(4001))
        );
        assert_eq!(
            extract_endpoint(&addr("/ip6/::1/tcp/4002")),
            endpoint("::1", Some(4002))
        );
        assert_eq!(
            extract_endpoint(&addr("/dns4/node.example.org/tcp/4001")),
            endpoint("node.example.org", Some(4001))
        );
        assert_eq!(
            extract_endpoint(&addr("/ip4/10.0.0.1/udp/4001/quic")),
            endpoint("10.0.0.1", None)
        );
    }

    #[test]
    fn relay_address_uses_first_hop() {
        assert_eq!(
            extract_endpoint(&addr(
                "/ip4/1.2.3.4/tcp/4001/p2p/QmRelay/p2p-circuit/ip4/10.0.0.9/tcp/9"
            )),
            endpoint("1.2.3.4", Some(4001))
        );
    }

    #[test]
    fn malformed_multiaddrs_yield_nothing() {
        assert_eq!(extract_endpoint(&addr("/ip4/not-an-ip/tcp/4001")), None);
        assert_eq!(extract_endpoint(&addr("/ip4/10.0.0.1/tcp/huge")), None);
        assert_eq!(extract_endpoint(&addr("/p2p/QmOnlyId")), None);
    }

    #[test]
    fn ledger_style_endpoints() {
        assert_eq!(
            extract_endpoint(&addr("enode://abcdef@10.0.0.3:30303?discport=0")),
            endpoint("10.0.0.3", Some(30303))
        );
        assert_eq!(
            extract_endpoint(&addr("abcdef@10.0.0.3:30303")),
            endpoint("10.0.0.3", Some(30303))
        );
        assert_eq!(
            extract_endpoint(&addr("abcdef@[::1]:30303")),
            endpoint("::1", Some(30303))
        );
    }

    #[test]
    fn socket_target_brackets_ipv6_and_applies_default_port() {
        assert_eq!(
            Endpoint {
                host: "::1".into(),
                port: None
            }
            .socket_target(4001),
            "[::1]:4001"
        );
        assert_eq!(
            Endpoint {
                host: "10.0.0.1".into(),
                port: Some(9)
            }
            .socket_target(4001),
            "10.0.0.1:9"
        );
    }

    #[tokio::test]
    async fn probe_distinguishes_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let open_port = listener.local_addr().expect("addr").port();

        let closed = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let closed_port = closed.local_addr().expect("addr").port();
        drop(closed);

        let prober = LivenessProber::new(ProbeConfig {
            timeout: Duration::from_millis(500),
            concurrency: 4,
            default_port: open_port,
        });

        let open = addr(&format!("/ip4/127.0.0.1/tcp/{open_port}"));
        let closed = addr(&format!("/ip4/127.0.0.1/tcp/{closed_port}"));
        let defaulted = addr("/ip4/127.0.0.1");
        let nowhere = addr("/p2p/QmOnlyId");

        let verdicts = prober
            .probe_all(vec![
                open.clone(),
                closed.clone(),
                defaulted.clone(),
                nowhere.clone(),
                open.clone(),
            ])
            .await;

        assert_eq!(verdicts.len(), 4);
        assert!(verdicts[&open]);
        assert!(!verdicts[&closed]);
        assert!(verdicts[&defaulted]);
        assert!(!verdicts[&nowhere]);
    }
}
