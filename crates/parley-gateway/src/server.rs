// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
};
use dashmap::DashMap;
use parley_broadcast::ChannelHub;
use parley_config::model::ServerConfig;
use parley_core::{ParleyError, UserId};
use parley_messaging::Engine;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthConfig, SOCKET_ID_HEADER, USER_ID_HEADER, USER_NAME_HEADER, USER_ROLE_HEADER,
    auth_middleware,
};
use crate::handlers;
use crate::ws;

/// One live WebSocket connection.
#[derive(Debug, Clone)]
pub struct SocketInfo {
    pub user_id: UserId,
    pub connected_at: Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub engine: Arc<Engine>,
    /// Present when the native driver is selected; backs `/ws`.
    pub hub: Option<Arc<ChannelHub>>,
    pub auth: AuthConfig,
    /// socket_id -> connection info.
    pub sockets: Arc<DashMap<String, SocketInfo>>,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(engine: Arc<Engine>, hub: Option<Arc<ChannelHub>>, auth: AuthConfig) -> Self {
        Self {
            engine,
            hub,
            auth,
            sockets: Arc::new(DashMap::new()),
            started_at: Instant::now(),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_ROLE_HEADER),
            HeaderName::from_static(USER_NAME_HEADER),
            HeaderName::from_static(SOCKET_ID_HEADER),
        ])
}

/// Builds the full route table:
/// - GET /health (public)
/// - /v1/conversations/... and POST /v1/presence (service token + identity headers)
/// - GET /ws (token and identity in the query string)
pub fn build_router(state: GatewayState, allowed_origins: &[String]) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/v1/conversations",
            get(handlers::list_conversations).post(handlers::open_conversation),
        )
        .route("/v1/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/v1/conversations/{id}/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .route(
            "/v1/conversations/{id}/attachments",
            post(handlers::send_attachment),
        )
        .route("/v1/conversations/{id}/read", post(handlers::mark_read))
        .route("/v1/conversations/{id}/typing", post(handlers::set_typing))
        .route("/v1/presence", post(handlers::set_presence))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Auth happens during the handshake, not via middleware.
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
}

/// Binds `host:port` and serves until `shutdown` is cancelled.
///
/// With the native driver, the hub counts as attached for as long as the
/// server runs.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), ParleyError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;
    serve(listener, config, state, shutdown).await
}

/// Serves on an already bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), ParleyError> {
    let hub = state.hub.clone();
    let app = build_router(state, &config.allowed_origins);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Gateway server listening on {addr}");
    }
    if let Some(hub) = &hub {
        hub.attach();
    }

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ParleyError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        });

    if let Some(hub) = &hub {
        hub.detach();
    }
    result
}
