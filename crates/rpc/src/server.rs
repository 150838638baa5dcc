use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use peerlink_network::DaemonClient;
use peerlink_types::NodeDescriptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::client::RpcClient;
use crate::node_table::NodeTable;
use crate::protocol::{RpcMethod, RpcRequest, RpcResponse, PONG};

/// Shared state behind the RPC router.
pub struct RpcState {
    descriptor: RwLock<Option<NodeDescriptor>>,
    table: NodeTable,
    daemon: Option<Arc<dyn DaemonClient>>,
    client: RpcClient,
    metrics: Option<PrometheusHandle>,
    started_at: Instant,
    req_total: AtomicU64,
}

impl RpcState {
    pub fn new(descriptor: NodeDescriptor, table: NodeTable, client: RpcClient) -> Self {
        let state = Self::awaiting_identity(table, client);
        state.set_descriptor(descriptor);
        state
    }

    /// State for a node whose identity is learned later, e.g. once its
    /// content daemon comes up. `Node.ID` fails until [`set_descriptor`] runs.
    ///
    /// [`set_descriptor`]: RpcState::set_descriptor
    pub fn awaiting_identity(table: NodeTable, client: RpcClient) -> Self {
        Self {
            descriptor: RwLock::new(None),
            table,
            daemon: None,
            client,
            metrics: None,
            started_at: Instant::now(),
            req_total: AtomicU64::new(0),
        }
    }

    pub fn with_daemon(mut self, daemon: Arc<dyn DaemonClient>) -> Self {
        self.daemon = Some(daemon);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn descriptor(&self) -> Option<NodeDescriptor> {
        self.descriptor.read().clone()
    }

    pub fn set_descriptor(&self, descriptor: NodeDescriptor) {
        info!(node = %descriptor, "node identity set");
        *self.descriptor.write() = Some(descriptor);
    }

    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    fn record_request(&self) -> u64 {
        self.req_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

type SharedState = Arc<RpcState>;

pub fn build_router(state: Arc<RpcState>) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` completes.
pub async fn serve<F>(state: Arc<RpcState>, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind_listener(addr).await?;
    let local = listener
        .local_addr()
        .context("failed to read RPC listener address")?;
    match state.descriptor() {
        Some(node) => info!(%local, %node, "RPC server listening"),
        None => info!(%local, "RPC server listening; node identity not known yet"),
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("RPC server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {addr}"))
    }
}

async fn handle_rpc(State(state): State<SharedState>, Json(request): Json<RpcRequest>) -> Json<RpcResponse> {
    state.record_request();
    let id = request.id;

    let method = match request.method.parse::<RpcMethod>() {
        Ok(method) => method,
        Err(err) => {
            debug!(method = %request.method, "rejecting unknown rpc method");
            return Json(RpcResponse::err(id, err));
        }
    };

    let outcome = dispatch(&state, method, request.params).await;
    Json(match outcome {
        Ok(result) => RpcResponse::ok(id, result),
        Err(error) => {
            debug!(%method, %error, "rpc call failed");
            RpcResponse::err(id, error)
        }
    })
}

async fn dispatch(state: &RpcState, method: RpcMethod, params: Value) -> Result<Value, String> {
    match method {
        RpcMethod::Id => match state.descriptor() {
            Some(descriptor) => to_result(descriptor),
            None => Err("node identity is not known yet".into()),
        },
        RpcMethod::Ping => to_result(PONG),
        RpcMethod::Pins => {
            let daemon = pinning_daemon(state)?;
            let pins = daemon
                .pin_list()
                .await
                .map_err(|err| format!("listing pins failed: {err}"))?;
            to_result(pins)
        }
        RpcMethod::PinVideo => {
            let cid: String = parse_params(method, params)?;
            if cid.trim().is_empty() {
                return Err("cid must not be empty".into());
            }
            let daemon = pinning_daemon(state)?;
            daemon
                .pin_add(&cid)
                .await
                .map_err(|err| format!("pinning {cid} failed: {err}"))?;
            info!(%cid, "pinned content");
            to_result(true)
        }
        RpcMethod::Peers => {
            let caller: NodeDescriptor = parse_params(method, params)?;
            let peers = state.table.list();
            debug!(caller = %caller, known = peers.len(), "serving node table");
            to_result(peers)
        }
        RpcMethod::AddPeer => {
            let descriptor: NodeDescriptor = parse_params(method, params)?;
            if state.table.register(&descriptor) {
                info!(node = %descriptor, "registered node");
            }
            to_result(true)
        }
        RpcMethod::Connect => {
            let descriptor: NodeDescriptor = parse_params(method, params)?;
            match state.client.ping(&descriptor.rpc_url()).await {
                Ok(()) => {
                    if state.table.register(&descriptor) {
                        info!(node = %descriptor, "connected to node");
                    }
                    to_result(true)
                }
                Err(err) => {
                    warn!(node = %descriptor, error = %err, "connect ping failed");
                    to_result(false)
                }
            }
        }
    }
}

fn pinning_daemon(state: &RpcState) -> Result<&Arc<dyn DaemonClient>, String> {
    state
        .daemon
        .as_ref()
        .ok_or_else(|| "pinning is not available on this node".to_string())
}

fn parse_params<T: DeserializeOwned>(method: RpcMethod, params: Value) -> Result<T, String> {
    serde_json::from_value(params).map_err(|err| format!("invalid params for {method}: {err}"))
}

fn to_result<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|err| format!("failed to encode result: {err}"))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node: Option<String>,
    uptime_secs: u64,
    known_nodes: usize,
    req_total: u64,
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    Json(HealthResponse {
        status: "ok",
        node: state.descriptor().map(|descriptor| descriptor.key()),
        uptime_secs: state.uptime().as_secs(),
        known_nodes: state.table.len(),
        req_total,
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Response {
    state.record_request();
    let Some(handle) = state.metrics.as_ref() else {
        return (StatusCode::NOT_FOUND, "metrics exporter disabled").into_response();
    };

    let mut response = Response::new(Body::from(handle.render()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
