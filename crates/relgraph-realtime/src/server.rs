//! Axum WebSocket server: upgrades `/ws/performance` connections, registers a
//! [`SubscriberSession`], and relays control frames (subscribe/
//! unsubscribe/filter/ping) from the client.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::background_tasks::pong_message;
use crate::origin::{OriginChecker, PermissiveOriginChecker};
use crate::session::{
    ClientControl, Envelope, EnvelopeType, SessionRegistry, SubscriberHandle, SubscriberSession,
};
use relgraph_metrics::GraphPerformanceMapper;

const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct RealtimeServerConfig {
    pub max_connections: usize,
    pub origin_checker: Arc<dyn OriginChecker>,
}

impl Default for RealtimeServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            origin_checker: Arc::new(PermissiveOriginChecker),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub mapper: Arc<GraphPerformanceMapper>,
    pub config: RealtimeServerConfig,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/performance", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    format!("{{\"connections\":{}}}", state.registry.len())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> axum::response::Response {
    if state.registry.len() >= state.config.max_connections {
        return (StatusCode::TOO_MANY_REQUESTS, "subscriber limit reached").into_response();
    }

    let origin = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.config.origin_checker.check(origin) {
        return (StatusCode::FORBIDDEN, "origin not permitted").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    let session = Arc::new(SubscriberSession::new(session_id));
    *session.state.write() = crate::session::SessionState::Active;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_CAPACITY);
    let handle = Arc::new(SubscriberHandle::new(outbound_tx));
    state.registry.insert(session.clone(), handle.clone());

    info!(session = %session_id, total = state.registry.len(), "subscriber connected");

    if let Some(cached) = state.mapper.current() {
        if let Ok(data) = serde_json::to_value(&cached) {
            let envelope = Envelope::new(EnvelopeType::Initial, crate::session::TOPIC_PERFORMANCE, data);
            if let Ok(text) = serde_json::to_string(&envelope) {
                handle.try_send(Message::Text(text.into()));
            }
        }
    }

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        session.touch();
        match message {
            Message::Text(text) => {
                if let Err(e) = handle_control_frame(&text, &session, &handle) {
                    warn!(session = %session_id, error = %e, "malformed control frame, closing session");
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    state.registry.remove(&session_id);
    info!(session = %session_id, "subscriber disconnected");
}

fn handle_control_frame(
    text: &str,
    session: &Arc<SubscriberSession>,
    handle: &Arc<SubscriberHandle>,
) -> relgraph_common::Result<()> {
    let control: ClientControl = serde_json::from_str(text)
        .map_err(|e| crate::error::protocol_error(format!("invalid control frame: {e}")))?;

    match control {
        ClientControl::Subscribe { topic } => {
            session.topics.write().insert(topic);
        }
        ClientControl::Unsubscribe { topic } => {
            session.topics.write().remove(&topic);
        }
        ClientControl::Filter { topic, predicate } => {
            if predicate.is_null() {
                session.clear_filter(&topic);
            } else {
                session.set_filter(topic, predicate);
            }
        }
        ClientControl::Ping => {
            handle.try_send(pong_message());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_permissive_and_bounded() {
        let config = RealtimeServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert!(config.origin_checker.check(None));
    }
}
