// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication middleware for the gateway.
//!
//! The upstream identity provider authenticates end users and calls us with
//! a shared service token (`Authorization: Bearer <token>`) plus the caller's
//! identity in `X-User-Id`, `X-User-Role` and `X-User-Name`. `X-Socket-Id`
//! optionally names the caller's own WebSocket.
//!
//! When no token is configured, all requests are rejected (fail-closed).

use std::str::FromStr;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use parley_core::{Actor, ParleyError, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const SOCKET_ID_HEADER: &str = "x-socket-id";

/// Authentication configuration for the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected service token. `None` rejects everything.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl AuthConfig {
    /// Checks a presented token against the configured one.
    pub fn verify(&self, presented: Option<&str>) -> Result<(), ParleyError> {
        let Some(expected) = self.bearer_token.as_deref().filter(|t| !t.is_empty()) else {
            tracing::error!("gateway has no service token configured -- rejecting request");
            return Err(ParleyError::Unauthorized);
        };
        match presented {
            Some(token) if token == expected => Ok(()),
            _ => Err(ParleyError::Unauthorized),
        }
    }
}

/// Builds the caller from raw identity values.
///
/// The display name falls back to `User {id}` when absent or blank.
pub fn actor_from_parts(
    user_id: Option<&str>,
    role: Option<&str>,
    name: Option<&str>,
    socket_id: Option<&str>,
) -> Result<Actor, ParleyError> {
    let id = user_id
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .map(UserId)
        .ok_or(ParleyError::Unauthorized)?;
    let role = role
        .and_then(|v| Role::from_str(v.trim()).ok())
        .ok_or(ParleyError::Unauthorized)?;
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("User {id}"));

    let mut actor = Actor::new(id, role, name);
    if let Some(socket) = socket_id.map(str::trim).filter(|s| !s.is_empty()) {
        actor = actor.with_socket_id(socket);
    }
    Ok(actor)
}

/// Reads the caller from the identity headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ParleyError> {
    let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    // Names may carry non-ASCII characters, which `to_str` refuses.
    let name = headers
        .get(USER_NAME_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    actor_from_parts(
        text(USER_ID_HEADER),
        text(USER_ROLE_HEADER),
        name.as_deref(),
        text(SOCKET_ID_HEADER),
    )
}

/// Validates the service token and attaches the caller as an `Actor` extension.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    auth.verify(token)?;

    let actor = actor_from_headers(request.headers())?;
    tracing::trace!(user_id = actor.id.0, role = %actor.role, "request authenticated");
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}
