//! WebSocket transport: upgrade, per-connection loop, graceful serve.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::connections::ConnectionRegistry;
use crate::dispatcher::Dispatcher;
use crate::protocol::OutboundMessage;

/// Shared state handed to every connection.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Request handler.
    pub dispatcher: Arc<Dispatcher>,
    /// Live connection set.
    pub connections: Arc<ConnectionRegistry>,
}

impl AppState {
    /// State around `dispatcher` with an empty connection registry.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            connections: Arc::new(ConnectionRegistry::new()),
        }
    }
}

/// Router accepting WebSocket upgrades at any path.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(ws_handler).with_state(state)
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the underlying I/O error if the accept loop fails.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Parley server listening");
    }
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// One connection: frames are answered strictly in order, one at a time.
async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let guard = state.connections.register(peer);
    let (mut sender, mut receiver) = socket.split();

    while let Some(frame) = receiver.next().await {
        let reply = match frame {
            Ok(Message::Text(text)) => state.dispatcher.handle(text.as_str()).await,
            Ok(Message::Binary(bytes)) => state.dispatcher.handle_bytes(&bytes).await,
            Ok(Message::Close(_)) => {
                debug!(connection_id = %guard.id(), "Close frame received");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                warn!(connection_id = %guard.id(), error = %e, "WebSocket receive failed");
                break;
            }
        };

        if let Err(e) = send(&mut sender, &reply).await {
            warn!(connection_id = %guard.id(), error = %e, "Could not deliver reply; closing connection");
            break;
        }
    }
}

async fn send<S>(sender: &mut S, reply: &OutboundMessage) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match serde_json::to_string(reply) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Failed to encode reply");
            return Err(e.to_string());
        }
    };
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}
