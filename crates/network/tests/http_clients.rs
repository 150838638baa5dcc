use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use peerlink_network::{
    ContentPeerObserver, DaemonClient, DaemonError, JsonRpcLedgerClient, KuboClient,
    LedgerError, LedgerNodeClient, LedgerPeerObserver, LivenessProber, PeerSource, ProbeConfig,
};
use peerlink_types::PeerAddress;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    addr
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn prober(default_port: u16) -> LivenessProber {
    LivenessProber::new(ProbeConfig {
        timeout: Duration::from_millis(500),
        concurrency: 8,
        default_port,
    })
}

fn kubo_mock(live_peer: String, dead_peer: String) -> Router {
    Router::new()
        .route(
            "/api/v0/version",
            post(|| async { Json(json!({"Version": "0.29.0", "Commit": ""})) }),
        )
        .route(
            "/api/v0/id",
            post(|| async {
                Json(json!({
                    "ID": "QmSelf",
                    "Addresses": ["/ip4/127.0.0.1/tcp/4001/p2p/QmSelf"],
                    "AgentVersion": "kubo/0.29.0"
                }))
            }),
        )
        .route(
            "/api/v0/swarm/peers",
            post(move || {
                let live = live_peer.clone();
                let dead = dead_peer.clone();
                async move {
                    Json(json!({
                        "Peers": [
                            {"Addr": live, "Peer": "QmLive"},
                            {"Addr": dead, "Peer": "QmDead"}
                        ]
                    }))
                }
            }),
        )
        .route(
            "/api/v0/pin/ls",
            post(|Query(query): Query<HashMap<String, String>>| async move {
                assert_eq!(query.get("type").map(String::as_str), Some("recursive"));
                Json(json!({"Keys": {"QmB": {"Type": "recursive"}, "QmA": {"Type": "recursive"}}}))
            }),
        )
        .route(
            "/api/v0/pin/add",
            post(|Query(query): Query<HashMap<String, String>>| async move {
                match query.get("arg").map(String::as_str) {
                    Some("QmGood") => (StatusCode::OK, Json(json!({"Pins": ["QmGood"]}))).into_response(),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"Message": "invalid path", "Code": 0, "Type": "error"})),
                    )
                        .into_response(),
                }
            }),
        )
}

#[tokio::test]
async fn kubo_client_speaks_the_daemon_api() {
    let addr = spawn(kubo_mock(String::new(), String::new())).await;
    let client = KuboClient::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();

    assert!(client.is_ready().await);
    let identity = client.identity().await.unwrap();
    assert_eq!(identity.id, "QmSelf");
    assert_eq!(identity.agent_version, "kubo/0.29.0");

    assert_eq!(client.pin_list().await.unwrap(), vec!["QmA", "QmB"]);
    client.pin_add("QmGood").await.unwrap();
    match client.pin_add("nonsense").await {
        Err(DaemonError::Status { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "invalid path");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn kubo_client_resolves_api_from_repo_file() {
    let addr = spawn(kubo_mock(String::new(), String::new())).await;
    let repo = tempfile::tempdir().unwrap();
    std::fs::write(
        repo.path().join("api"),
        format!("/ip4/127.0.0.1/tcp/{}\n", addr.port()),
    )
    .unwrap();

    let client = KuboClient::from_repo(repo.path(), Duration::from_secs(2)).unwrap();
    assert!(client.is_ready().await);
    assert_eq!(client.identity().await.unwrap().id, "QmSelf");
}

#[tokio::test]
async fn kubo_client_picks_up_api_file_written_after_startup() {
    let addr = spawn(kubo_mock(String::new(), String::new())).await;
    let repo = tempfile::tempdir().unwrap();
    let client = KuboClient::from_repo(repo.path(), Duration::from_secs(2)).unwrap();

    assert!(!client.is_ready().await);
    assert!(matches!(
        client.identity().await,
        Err(DaemonError::ApiAddress(_))
    ));

    tokio::fs::write(
        repo.path().join("api"),
        format!("/ip4/127.0.0.1/tcp/{}\n", addr.port()),
    )
    .await
    .unwrap();
    assert!(client.is_ready().await);
}

#[tokio::test]
async fn content_observer_keeps_only_reachable_connections() {
    let live_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live = format!("/ip4/127.0.0.1/tcp/{}", live_listener.local_addr().unwrap().port());
    let dead = format!("/ip4/127.0.0.1/tcp/{}", closed_port().await);

    let addr = spawn(kubo_mock(live.clone(), dead)).await;
    let daemon = KuboClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let observer = ContentPeerObserver::new(Arc::new(daemon), prober(4001));

    let observed = observer.observe().await.unwrap();
    assert!(observed.private.is_empty());
    assert_eq!(
        observed.public.to_vec(),
        vec![PeerAddress::parse(&live).unwrap()]
    );
}

async fn ledger_rpc(Json(request): Json<Value>, live: String, dead: String) -> Json<Value> {
    let id = request["id"].clone();
    let result = match request["method"].as_str() {
        Some("web3_clientVersion") => json!("Geth/v1.13.0"),
        Some("admin_nodeInfo") => json!({
            "id": "selfid",
            "enode": "enode://selfid@127.0.0.1:30303",
            "name": "Geth/v1.13.0"
        }),
        Some("admin_peers") => json!([
            {"id": "aa", "enode": format!("enode://aa@{live}?discport=0"),
             "network": {"remoteAddress": live, "inbound": false}},
            {"id": "bb", "enode": format!("enode://bb@{dead}"),
             "network": {"remoteAddress": dead, "inbound": true}}
        ]),
        _ => {
            return Json(json!({
                "jsonrpc": "2.0", "id": id,
                "error": {"code": -32601, "message": "the method does not exist"}
            }))
        }
    };
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

#[tokio::test]
async fn ledger_observer_reports_reachable_enodes() {
    let live_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live = format!("127.0.0.1:{}", live_listener.local_addr().unwrap().port());
    let dead = format!("127.0.0.1:{}", closed_port().await);

    let app = Router::new().route(
        "/",
        post(move |body: Json<Value>| ledger_rpc(body, live.clone(), dead.clone())),
    );
    let addr = spawn(app).await;
    let node = JsonRpcLedgerClient::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();

    assert!(node.is_ready().await);
    assert_eq!(node.node_info().await.unwrap().id, "selfid");
    assert_eq!(node.peers().await.unwrap().len(), 2);

    let observer = LedgerPeerObserver::new(Arc::new(node), prober(30303));
    let observed = observer.observe().await.unwrap();
    let public: Vec<String> = observed
        .public
        .iter()
        .map(|address| address.to_string())
        .collect();
    assert_eq!(
        public,
        vec![format!(
            "enode://aa@127.0.0.1:{}",
            live_listener.local_addr().unwrap().port()
        )]
    );
}

#[tokio::test]
async fn ledger_rpc_errors_surface_as_rpc_errors() {
    let app = Router::new().route(
        "/",
        post(|Json(request): Json<Value>| async move {
            Json(json!({
                "jsonrpc": "2.0", "id": request["id"],
                "error": {"code": -32601, "message": "the method admin_peers does not exist"}
            }))
        }),
    );
    let addr = spawn(app).await;
    let node = JsonRpcLedgerClient::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();

    assert!(matches!(
        node.peers().await,
        Err(LedgerError::Rpc { code: -32601, .. })
    ));
    assert!(!node.is_ready().await);
}
