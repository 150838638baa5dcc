use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use peerlink_network::{DaemonClient, DaemonError, DaemonIdentity, PeerConnection};
use peerlink_rpc::{build_router, NodeTable, RpcClient, RpcClientError, RpcState};
use peerlink_types::NodeDescriptor;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
struct FakeDaemon {
    pins: Mutex<Vec<String>>,
}

#[async_trait]
impl DaemonClient for FakeDaemon {
    async fn is_ready(&self) -> bool {
        true
    }

    async fn identity(&self) -> Result<DaemonIdentity, DaemonError> {
        Ok(DaemonIdentity {
            id: "QmSelf".into(),
            addresses: vec![],
            agent_version: "fake".into(),
        })
    }

    async fn connections(&self) -> Result<Vec<PeerConnection>, DaemonError> {
        Ok(vec![])
    }

    async fn pin_add(&self, cid: &str) -> Result<(), DaemonError> {
        self.pins.lock().push(cid.to_string());
        Ok(())
    }

    async fn pin_list(&self) -> Result<Vec<String>, DaemonError> {
        Ok(self.pins.lock().clone())
    }

    async fn pin_remove(&self, cid: &str) -> Result<(), DaemonError> {
        self.pins.lock().retain(|pin| pin != cid);
        Ok(())
    }
}

struct Node {
    descriptor: NodeDescriptor,
    table: NodeTable,
}

impl Node {
    fn endpoint(&self) -> String {
        self.descriptor.rpc_url()
    }
}

fn client() -> RpcClient {
    RpcClient::new(Duration::from_secs(2)).unwrap()
}

async fn spawn_node(id: &str, daemon: Option<Arc<dyn DaemonClient>>) -> Node {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let descriptor = NodeDescriptor::new(id, "127.0.0.1", port);
    let table = NodeTable::new();

    let mut state = RpcState::new(descriptor.clone(), table.clone(), client());
    if let Some(daemon) = daemon {
        state = state.with_daemon(daemon);
    }
    let app = build_router(Arc::new(state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("rpc server");
    });

    Node { descriptor, table }
}

async fn spawn_raw(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    format!("http://{addr}/rpc")
}

#[tokio::test]
async fn identity_and_ping() {
    let node = spawn_node("QmA", None).await;
    let rpc = client();

    assert_eq!(rpc.id(&node.endpoint()).await.unwrap(), node.descriptor);
    rpc.ping(&node.endpoint()).await.unwrap();
}

#[tokio::test]
async fn ping_with_unexpected_literal_is_a_protocol_error() {
    let endpoint = spawn_raw(Router::new().route(
        "/rpc",
        post(|Json(request): Json<Value>| async move {
            Json(json!({"id": request["id"], "result": "pang", "error": null}))
        }),
    ))
    .await;

    assert!(matches!(
        client().ping(&endpoint).await,
        Err(RpcClientError::Protocol(_))
    ));
}

#[tokio::test]
async fn add_peer_registers_and_peers_lists_it() {
    let node = spawn_node("QmA", None).await;
    let rpc = client();
    let caller = NodeDescriptor::new("QmCaller", "10.0.0.9", 14009);

    match rpc.peers(&node.endpoint(), &caller).await {
        Err(RpcClientError::Protocol(message)) => assert_eq!(message, "no data"),
        other => panic!("expected no data, got {other:?}"),
    }

    rpc.add_peer(&node.endpoint(), &caller).await.unwrap();
    assert!(node.table.contains(&caller));
    assert_eq!(rpc.peers(&node.endpoint(), &caller).await.unwrap(), vec![caller]);
}

#[tokio::test]
async fn add_peer_false_is_connect_failed() {
    let endpoint = spawn_raw(Router::new().route(
        "/rpc",
        post(|Json(request): Json<Value>| async move {
            Json(json!({"id": request["id"], "result": false}))
        }),
    ))
    .await;

    let descriptor = NodeDescriptor::new("QmX", "127.0.0.1", 1);
    match client().add_peer(&endpoint, &descriptor).await {
        Err(RpcClientError::Protocol(message)) => assert_eq!(message, "connect failed"),
        other => panic!("expected connect failed, got {other:?}"),
    }
}

#[tokio::test]
async fn connect_pings_back_before_registering() {
    let a = spawn_node("QmA", None).await;
    let b = spawn_node("QmB", None).await;
    let rpc = client();

    rpc.connect(&a.endpoint(), &b.descriptor).await.unwrap();
    assert!(a.table.contains(&b.descriptor));

    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = closed.local_addr().unwrap().port();
    drop(closed);
    let ghost = NodeDescriptor::new("QmGhost", "127.0.0.1", dead_port);

    assert!(matches!(
        rpc.connect(&a.endpoint(), &ghost).await,
        Err(RpcClientError::Protocol(_))
    ));
    assert!(!a.table.contains(&ghost));
}

#[tokio::test]
async fn pin_calls_go_through_the_daemon() {
    let daemon = Arc::new(FakeDaemon::default());
    let node = spawn_node("QmA", Some(daemon.clone() as Arc<dyn DaemonClient>)).await;
    let rpc = client();

    assert!(rpc.pin_video(&node.endpoint(), "QmVideo").await.unwrap());
    assert_eq!(rpc.pins(&node.endpoint()).await.unwrap(), vec!["QmVideo"]);
    assert_eq!(daemon.pins.lock().len(), 1);
}

#[tokio::test]
async fn pin_calls_without_daemon_are_remote_errors() {
    let node = spawn_node("QmA", None).await;
    assert!(matches!(
        client().pins(&node.endpoint()).await,
        Err(RpcClientError::Remote(_))
    ));
}

#[tokio::test]
async fn unknown_methods_and_bad_params_are_reported_in_the_envelope() {
    let node = spawn_node("QmA", None).await;
    let http = reqwest::Client::new();

    let unknown: Value = http
        .post(node.endpoint())
        .json(&json!({"method": "Node.Reboot", "params": null, "id": 9}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unknown["id"], 9);
    assert!(unknown["error"].as_str().unwrap().contains("unknown method"));

    let bad: Value = http
        .post(node.endpoint())
        .json(&json!({"method": "Node.AddPeer", "params": "not a descriptor", "id": 10}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(bad["error"].as_str().unwrap().contains("invalid params"));
    assert!(node.table.is_empty());
}

#[tokio::test]
async fn health_and_disabled_metrics() {
    let node = spawn_node("QmA", None).await;
    let base = format!("http://127.0.0.1:{}", node.descriptor.port);
    let http = reqwest::Client::new();

    let health: Value = http
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["node"], node.descriptor.key());

    let metrics = http.get(format!("{base}/metrics")).send().await.unwrap();
    assert_eq!(metrics.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn identity_is_served_once_it_becomes_known() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(RpcState::awaiting_identity(NodeTable::new(), client()));
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("rpc server");
    });
    let endpoint = format!("http://127.0.0.1:{port}/rpc");
    let rpc = client();

    rpc.ping(&endpoint).await.unwrap();
    match rpc.id(&endpoint).await {
        Err(RpcClientError::Remote(message)) => assert!(message.contains("not known yet")),
        other => panic!("expected a remote error, got {other:?}"),
    }

    let descriptor = NodeDescriptor::new("QmLate", "127.0.0.1", port);
    state.set_descriptor(descriptor.clone());
    assert_eq!(rpc.id(&endpoint).await.unwrap(), descriptor);
}
