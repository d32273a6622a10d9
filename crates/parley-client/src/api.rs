// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the gateway's JSON API.
//!
//! Identity is forwarded the way the upstream identity provider does it: a
//! service bearer token plus `X-User-*` headers. The socket id learned from
//! the WebSocket transport is sent as `X-Socket-Id` so the gateway does not
//! echo our own events back to us.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use parley_core::{
    Actor, BookingRef, Conversation, ConversationId, ConversationLink, ConversationSummary,
    Message, MessageId, MessagePage, PageRequest, ParleyError, UserId,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::subscription::MessageFeed;
use crate::typing::TypingSink;

pub const SOCKET_ID_HEADER: &str = "x-socket-id";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Gateway API client acting as one user.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    socket_id: Arc<RwLock<Option<String>>>,
}

#[derive(Serialize)]
struct OpenConversationRequest<'a> {
    counterparty_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    booking_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<&'a str>,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<SendMetadata<'a>>,
}

#[derive(Serialize)]
struct SendMetadata<'a> {
    booking: &'a BookingRef,
}

/// File reference sent to `POST /v1/conversations/{id}/attachments`.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentRequest {
    pub url: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Deserialize)]
struct MarkReadResponse {
    message_ids: Vec<MessageId>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    field: Option<String>,
    message: String,
}

impl ApiClient {
    /// Builds a client for `base_url` authenticated as `actor`.
    pub fn new(base_url: &str, token: &str, actor: &Actor) -> Result<Self, ParleyError> {
        Self::with_timeout(base_url, token, actor, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        token: &str,
        actor: &Actor,
        timeout: Duration,
    ) -> Result<Self, ParleyError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .ok_or_else(|| {
                ParleyError::Config(format!("gateway URL `{base_url}` must be an absolute http(s) URL"))
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        headers.insert("x-user-id", header_value(&actor.id.to_string())?);
        headers.insert("x-user-role", header_value(&actor.role.to_string())?);
        headers.insert(
            "x-user-name",
            HeaderValue::from_bytes(actor.display_name.as_bytes()).map_err(|e| {
                ParleyError::Config(format!("invalid display name for header: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Transport {
                message: format!("failed to build API client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url,
            socket_id: Arc::new(RwLock::new(actor.socket_id.clone())),
        })
    }

    /// Socket id to exclude from native broadcasts of our own actions.
    pub fn set_socket_id(&self, socket_id: Option<String>) {
        if let Ok(mut slot) = self.socket_id.write() {
            *slot = socket_id;
        }
    }

    pub fn socket_id(&self) -> Option<String> {
        self.socket_id.read().ok().and_then(|s| s.clone())
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ParleyError> {
        self.send(self.client.get(self.url("/v1/conversations"))).await
    }

    pub async fn open_conversation(
        &self,
        counterparty: UserId,
        link: &ConversationLink,
    ) -> Result<Conversation, ParleyError> {
        let body = OpenConversationRequest {
            counterparty_id: counterparty,
            booking_id: link.booking_id,
            service_name: link.service_name.as_deref(),
        };
        self.send(self.client.post(self.url("/v1/conversations")).json(&body))
            .await
    }

    pub async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, ParleyError> {
        self.send(self.client.get(self.url(&format!("/v1/conversations/{id}"))))
            .await
    }

    pub async fn list_messages(
        &self,
        id: ConversationId,
        page: &PageRequest,
    ) -> Result<MessagePage, ParleyError> {
        let mut url = self.url(&format!("/v1/conversations/{id}/messages"));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &page.limit.to_string());
            if let Some(before) = page.before {
                query.append_pair("before", &before.to_string());
            }
        }
        self.send(self.client.get(url)).await
    }

    pub async fn send_message(
        &self,
        id: ConversationId,
        content: &str,
        booking: Option<&BookingRef>,
    ) -> Result<Message, ParleyError> {
        let body = SendMessageRequest {
            content,
            metadata: booking.map(|booking| SendMetadata { booking }),
        };
        self.send(
            self.client
                .post(self.url(&format!("/v1/conversations/{id}/messages")))
                .json(&body),
        )
        .await
    }

    pub async fn send_attachment(
        &self,
        id: ConversationId,
        attachment: &AttachmentRequest,
    ) -> Result<Message, ParleyError> {
        self.send(
            self.client
                .post(self.url(&format!("/v1/conversations/{id}/attachments")))
                .json(attachment),
        )
        .await
    }

    /// Returns the ids whose read marker changed.
    pub async fn mark_read(&self, id: ConversationId) -> Result<Vec<MessageId>, ParleyError> {
        let response: MarkReadResponse = self
            .send(self.client.post(self.url(&format!("/v1/conversations/{id}/read"))))
            .await?;
        Ok(response.message_ids)
    }

    pub async fn set_typing(&self, id: ConversationId, is_typing: bool) -> Result<(), ParleyError> {
        self.send_no_content(
            self.client
                .post(self.url(&format!("/v1/conversations/{id}/typing")))
                .json(&serde_json::json!({ "is_typing": is_typing })),
        )
        .await
    }

    pub async fn set_presence(&self, is_online: bool) -> Result<(), ParleyError> {
        self.send_no_content(
            self.client
                .post(self.url("/v1/presence"))
                .json(&serde_json::json!({ "is_online": is_online })),
        )
        .await
    }

    /// `path` appended to the base URL's own path.
    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let prefix = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{path}"));
        url
    }

    fn prepare(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.socket_id() {
            Some(id) => request.header(SOCKET_ID_HEADER, id),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ParleyError> {
        let response = self.execute(request).await?;
        response.json::<T>().await.map_err(|e| ParleyError::Transport {
            message: format!("failed to decode API response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    async fn send_no_content(&self, request: reqwest::RequestBuilder) -> Result<(), ParleyError> {
        self.execute(request).await.map(|_| ())
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ParleyError> {
        let response = self
            .prepare(request)
            .send()
            .await
            .map_err(|e| ParleyError::Transport {
                message: format!("API request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        debug!(%status, path = %url, "API request rejected");
        Err(map_status(status, &url, &body))
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ParleyError> {
    HeaderValue::from_str(value)
        .map_err(|e| ParleyError::Config(format!("invalid header value `{value}`: {e}")))
}

/// Turns a gateway error response back into the error the server raised.
fn map_status(status: reqwest::StatusCode, path: &str, body: &str) -> ParleyError {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|r| r.error)
        .unwrap_or(ErrorDetail {
            field: None,
            message: body.to_string(),
        });

    match status.as_u16() {
        401 => ParleyError::Unauthorized,
        403 => ParleyError::Forbidden(detail.message),
        404 => ParleyError::NotFound {
            entity: "resource",
            id: path.to_string(),
        },
        422 => ParleyError::Validation {
            field: detail.field.unwrap_or_else(|| "request".into()),
            reason: detail.message,
        },
        _ => ParleyError::transport(format!("gateway returned {status}: {}", detail.message)),
    }
}

#[async_trait]
impl MessageFeed for ApiClient {
    async fn fetch_recent(
        &self,
        conversation: ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, ParleyError> {
        self.list_messages(conversation, &PageRequest::latest(limit))
            .await
            .map(|page| page.messages)
    }
}

#[async_trait]
impl TypingSink for ApiClient {
    async fn send_typing(
        &self,
        conversation: ConversationId,
        is_typing: bool,
    ) -> Result<(), ParleyError> {
        self.set_typing(conversation, is_typing).await
    }
}
