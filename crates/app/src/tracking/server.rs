//! WebSocket and HTTP endpoints.
//!
//! The server runs on a dedicated thread with its own single-threaded tokio
//! runtime so the pipeline threads never touch async code. Routes:
//! `/` upgrades to a WebSocket peer, `/metrics` serves Prometheus text,
//! `/frame.jpg` and `/telemetry` serve the latest broadcast.

use std::{net::SocketAddr, thread};

use anyhow::{Context, Result, anyhow, bail};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::{
    broadcast::{PEER_QUEUE_CAPACITY, PeerHub, PeerMessage, SharedHub},
    data::SharedLatest,
    telemetry,
};

/// Shared state behind the handlers.
#[derive(Clone)]
pub struct ServerState {
    pub hub: SharedHub,
    pub latest: SharedLatest,
}

/// Handle for the server thread.
pub struct PeerServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PeerServer {
    /// Address actually bound, useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal the server to stop and block until the thread exits.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Bind `addr` and serve until [`PeerServer::stop`]. Returns once the
/// listener is bound, or with the bind error.
pub fn spawn_server(addr: SocketAddr, state: ServerState) -> Result<PeerServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (init_tx, init_rx) = crossbeam_channel::bounded::<Result<SocketAddr, String>>(1);

    let handle = telemetry::spawn_thread("facecast-server", move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = init_tx.send(Err(format!("failed to build server runtime: {err}")));
                return;
            }
        };

        runtime.block_on(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    let _ = init_tx.send(Err(format!("failed to bind {addr}: {err}")));
                    return;
                }
            };
            let local_addr = match listener.local_addr() {
                Ok(local_addr) => local_addr,
                Err(err) => {
                    let _ = init_tx.send(Err(format!("failed to read bound address: {err}")));
                    return;
                }
            };
            let _ = init_tx.send(Ok(local_addr));

            let served = axum::serve(listener, router(state))
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                error!("server error: {err}");
            }
        });
    })
    .context("failed to spawn server thread")?;

    match init_rx.recv() {
        Ok(Ok(local_addr)) => {
            info!("peers can connect at ws://{local_addr}/");
            Ok(PeerServer {
                local_addr,
                shutdown: Some(shutdown_tx),
                handle: Some(handle),
            })
        }
        Ok(Err(message)) => {
            let _ = handle.join();
            Err(anyhow!(message))
        }
        Err(_) => {
            let _ = handle.join();
            bail!("server thread exited before binding")
        }
    }
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/frame.jpg", get(frame_handler))
        .route("/telemetry", get(telemetry_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| peer_session(socket, state.hub))
}

async fn peer_session(socket: WebSocket, hub: SharedHub) {
    let (tx, mut rx) = mpsc::channel::<PeerMessage>(PEER_QUEUE_CAPACITY);
    let Some(id) = with_hub(&hub, |hub| hub.register(tx)) else {
        return;
    };
    info!(peer = id, "peer connected");

    let (mut outgoing, mut incoming) = socket.split();
    let forward = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let message = match message {
                PeerMessage::Text(text) => Message::Text(text),
                PeerMessage::Binary(bytes) => Message::Binary(bytes),
            };
            if outgoing.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = incoming.next().await {
        let message = match message {
            Message::Text(text) => PeerMessage::Text(text),
            Message::Binary(bytes) => PeerMessage::Binary(bytes),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        let relayed = with_hub(&hub, |hub| hub.relay(id, &message)).unwrap_or(0);
        debug!(peer = id, relayed, "relayed peer message");
    }

    with_hub(&hub, |hub| hub.unregister(id));
    forward.abort();
    info!(peer = id, "peer disconnected");
}

fn with_hub<T>(hub: &SharedHub, f: impl FnOnce(&mut PeerHub) -> T) -> Option<T> {
    match hub.lock() {
        Ok(mut guard) => Some(f(&mut guard)),
        Err(_) => {
            error!("peer hub poisoned");
            None
        }
    }
}

async fn metrics_handler() -> Response {
    match telemetry::prometheus_handle() {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

async fn frame_handler(State(state): State<ServerState>) -> Response {
    let jpeg = state.latest.lock().ok().and_then(|latest| latest.jpeg.clone());
    match jpeg {
        Some(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn telemetry_handler(State(state): State<ServerState>) -> Response {
    let json = state
        .latest
        .lock()
        .ok()
        .and_then(|latest| latest.telemetry_json.clone());
    match json {
        Some(json) => ([(header::CONTENT_TYPE, "application/json")], json).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
