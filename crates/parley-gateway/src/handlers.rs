// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Handlers are thin: they decode the request, call one engine operation as
//! the authenticated [`Actor`], and encode the result.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use parley_core::{
    Actor, BookingRef, Conversation, ConversationId, ConversationLink, ConversationSummary,
    Message, MessageId, MessagePage, PageRequest, UserId,
};
use parley_messaging::AttachmentUpload;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub driver: String,
    pub driver_ready: bool,
    pub connections: usize,
}

/// Request body for POST /v1/conversations.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenConversationRequest {
    pub counterparty_id: UserId,
    #[serde(default)]
    pub booking_id: Option<i64>,
    #[serde(default)]
    pub service_name: Option<String>,
}

/// Query string for GET /v1/conversations/{id}/messages.
#[derive(Debug, Default, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub before: Option<i64>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Request body for POST /v1/conversations/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<SendMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendMetadata {
    #[serde(default)]
    pub booking: Option<BookingRef>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Deserialize)]
pub struct TypingRequest {
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub is_online: bool,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let driver = state.engine.driver();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        driver: driver.name().to_string(),
        driver_ready: driver.is_ready(),
        connections: state.sockets.len(),
    })
}

/// GET /v1/conversations
pub async fn list_conversations(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.engine.conversations.list(&actor).await?))
}

/// POST /v1/conversations
pub async fn open_conversation(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<OpenConversationRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let link = ConversationLink {
        booking_id: body.booking_id,
        service_name: body.service_name,
    };
    let conversation = state
        .engine
        .conversations
        .get_or_create(&actor, body.counterparty_id, &link)
        .await?;
    Ok(Json(conversation))
}

/// GET /v1/conversations/{id}
pub async fn get_conversation(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(
        state
            .engine
            .conversations
            .get(&actor, ConversationId(id))
            .await?,
    ))
}

/// GET /v1/conversations/{id}/messages?before=&limit=
pub async fn list_messages(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    let page = PageRequest {
        before: query.before.map(MessageId),
        // Zero means the configured default.
        limit: query.limit.unwrap_or(0),
    };
    Ok(Json(
        state
            .engine
            .messages
            .list(ConversationId(id), &actor, page)
            .await?,
    ))
}

/// POST /v1/conversations/{id}/messages
pub async fn send_message(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let booking = body.metadata.and_then(|m| m.booking);
    let message = state
        .engine
        .messages
        .send(ConversationId(id), &actor, &body.content, booking)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /v1/conversations/{id}/attachments
pub async fn send_attachment(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(upload): Json<AttachmentUpload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .engine
        .messages
        .send_attachment(ConversationId(id), &actor, upload)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /v1/conversations/{id}/read
pub async fn mark_read(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let message_ids = state
        .engine
        .messages
        .mark_read(ConversationId(id), &actor)
        .await?;
    Ok(Json(MarkReadResponse { message_ids }))
}

/// POST /v1/conversations/{id}/typing
pub async fn set_typing(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(body): Json<TypingRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .typing
        .set_typing(ConversationId(id), &actor, body.is_typing)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/presence
pub async fn set_presence(
    State(state): State<GatewayState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<PresenceRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .presence
        .set_presence(&actor, body.is_online)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
