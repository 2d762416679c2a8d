// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Outbound transport
//
// The chat backend behind a trait so the session can be driven by the
// real HTTP client or an in-memory double. The transport enforces the
// overall request timeout; the read loop has none of its own.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::TryStreamExt;
use serde::Serialize;

use crate::config::BackendConfig;
use crate::message::ChatTurn;
use crate::session::ConversationId;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The read was aborted by a user-initiated cancel.
    #[error("request aborted")]
    Aborted,
    #[error("backend request timed out: {0}")]
    Timeout(String),
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// True for the abort signature of a user cancel, as opposed to a
    /// genuine failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }

    /// Human-readable message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            TransportError::Aborted => String::new(),
            TransportError::Timeout(msg) | TransportError::Transport(msg) => msg.clone(),
            TransportError::Status { status, body } if body.trim().is_empty() => {
                format!("HTTP {status}")
            }
            TransportError::Status { status, body } => format!("HTTP {status}: {}", body.trim()),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else {
            TransportError::Transport(e.to_string())
        }
    }
}

/// One message-send: the turns to send and the conversation they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub conversation_id: ConversationId,
    pub turns: Vec<ChatTurn>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the request and return the raw response body stream.
    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, TransportError>;

    /// Ask the backend to stop generating for `conversation_id`.
    async fn cancel(&self, conversation_id: ConversationId) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StreamBody<'a> {
    messages: &'a [ChatTurn],
    conversation_id: i64,
}

#[derive(Serialize)]
struct CancelBody {
    conversation_id: i64,
}

pub struct HttpChatTransport {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpChatTransport {
    pub fn new(client: reqwest::Client, config: BackendConfig) -> Self {
        Self { client, config }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::new(client, config.clone()))
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let req = self.client.post(url).timeout(self.config.timeout());
        match &self.config.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, TransportError> {
        let body = StreamBody {
            messages: &request.turns,
            conversation_id: request.conversation_id.as_i64(),
        };
        let resp = self
            .post(self.config.stream_url())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let stream = resp.bytes_stream().map_err(TransportError::from);
        Ok(Box::pin(stream))
    }

    async fn cancel(&self, conversation_id: ConversationId) -> Result<(), TransportError> {
        let body = CancelBody {
            conversation_id: conversation_id.as_i64(),
        };
        let resp = self.post(self.config.cancel_url()).json(&body).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}
