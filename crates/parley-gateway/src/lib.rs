// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Parley conversation engine.
//!
//! The gateway exposes the engine's operations as a JSON API for the
//! upstream identity provider and, when the native broadcast driver is
//! selected, serves its channel hub to browsers over `/ws`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use error::ApiError;
pub use server::{GatewayState, SocketInfo, build_router, serve, start_server};
