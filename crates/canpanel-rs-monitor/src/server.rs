//! Implements the web server and WebSocket logic using axum.

use crate::model::PanelSnapshot;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{Html, IntoResponse},
    routing::get,
};
use log::{debug, error, info, trace};
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Handed to every handler; each socket subscribes to the sender.
#[derive(Clone)]
pub(super) struct MonitorState {
    pub(super) snapshots: broadcast::Sender<PanelSnapshot>,
}

pub(super) fn router(snapshots: broadcast::Sender<PanelSnapshot>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(upgrade))
        .with_state(MonitorState { snapshots })
}

/// Binds to `addr` and serves until the server fails.
pub(super) async fn start_web_server(
    addr: SocketAddr,
    snapshots: broadcast::Sender<PanelSnapshot>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| error!("[Monitor] Cannot bind {}: {}", addr, e))?;
    info!("[Monitor] Serving http://{}", addr);
    axum::serve(listener, router(snapshots))
        .await
        .inspect_err(|e| error!("[Monitor] Server stopped: {}", e))
}

async fn index() -> impl IntoResponse {
    Html(include_str!("web/monitor.html"))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<MonitorState>) -> impl IntoResponse {
    let snapshots = state.snapshots.subscribe();
    ws.on_upgrade(move |socket| stream_snapshots(socket, snapshots))
}

/// What the socket loop does after one event.
enum Flow {
    Continue,
    Stop(&'static str),
}

/// Pushes every snapshot to the client as JSON until either side goes away.
async fn stream_snapshots(mut socket: WebSocket, mut snapshots: broadcast::Receiver<PanelSnapshot>) {
    debug!("[Monitor] Client connected.");
    let reason = loop {
        let flow = tokio::select! {
            received = snapshots.recv() => match received {
                Ok(snapshot) => send_snapshot(&mut socket, &snapshot).await,
                // A slow client skips snapshots; only the newest matter.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!("[Monitor] Client skipped {} snapshot(s).", skipped);
                    Flow::Continue
                }
                Err(broadcast::error::RecvError::Closed) => Flow::Stop("panel gone"),
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => Flow::Stop("client closed"),
                Some(Ok(_)) => Flow::Continue,
                Some(Err(_)) => Flow::Stop("socket error"),
            },
        };
        if let Flow::Stop(reason) = flow {
            break reason;
        }
    };
    debug!("[Monitor] Client disconnected: {}.", reason);
}

async fn send_snapshot(socket: &mut WebSocket, snapshot: &PanelSnapshot) -> Flow {
    let json = match serde_json::to_string(snapshot) {
        Ok(json) => json,
        Err(e) => {
            error!("[Monitor] Snapshot not serializable: {}", e);
            return Flow::Continue;
        }
    };
    match socket.send(Message::Text(json.into())).await {
        Ok(()) => Flow::Continue,
        Err(_) => Flow::Stop("send failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn root_serves_the_embedded_page() {
        let (snapshots, _) = broadcast::channel(4);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(snapshots)).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("canpanel-rs monitor"));
    }
}
