//! HTTP adapters for the dialogue engine and the entity lookup service

use super::EngineError;
use crate::enrich::Entity;
use crate::runtime::{EntityLookup, TurnClient};
use crate::state_machine::{Identity, SessionId, TurnResponse};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

fn build_client(timeout: Duration) -> Result<Client, EngineError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EngineError::from_reqwest(&e))
}

fn parse_base_url(base_url: &str) -> Result<Url, EngineError> {
    Url::parse(base_url)
        .map_err(|e| EngineError::invalid_request(format!("Invalid base URL {base_url}: {e}")))
}

/// Append path segments to the base URL, percent-encoding each one
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, EngineError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| EngineError::invalid_request(format!("Base URL cannot carry a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Send a request and return the body of a successful response
async fn send(request: RequestBuilder, token: Option<&str>) -> Result<String, EngineError> {
    let request = match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    };

    let start = Instant::now();
    let response = request.send().await.map_err(|e| EngineError::from_reqwest(&e))?;

    let status = response.status();
    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| EngineError::network(format!("Failed to read response: {e}")))?;

    tracing::debug!(
        url = %url,
        status = %status,
        duration_ms = %start.elapsed().as_millis(),
        "Remote call completed"
    );

    if !status.is_success() {
        return Err(EngineError::from_status(status, &body));
    }
    Ok(body)
}

// ============================================================================
// Dialogue Engine
// ============================================================================

/// Turn protocol client over HTTP+JSON
pub struct HttpTurnClient {
    client: Client,
    base_url: Url,
}

impl HttpTurnClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: parse_base_url(base_url)?,
        })
    }
}

#[async_trait]
impl TurnClient for HttpTurnClient {
    async fn start_session(
        &self,
        identity: &Identity,
        session_id: &SessionId,
    ) -> Result<(), EngineError> {
        let url = endpoint(&self.base_url, &["session", "start"])?;
        let body = StartSessionRequest {
            identity: &identity.user_id,
            session_id: session_id.as_str(),
        };

        // The acknowledgement body carries nothing we use
        send(self.client.post(url).json(&body), identity.token.as_deref()).await?;
        Ok(())
    }

    async fn continue_turn(
        &self,
        identity: &Identity,
        session_id: &SessionId,
        text: &str,
    ) -> Result<TurnResponse, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::invalid_request("Turn text is empty"));
        }

        let url = endpoint(&self.base_url, &["session", "turn"])?;
        let body = TurnRequest {
            identity: &identity.user_id,
            session_id: session_id.as_str(),
            text,
        };

        let raw = send(self.client.post(url).json(&body), identity.token.as_deref()).await?;
        let reply: TurnReply = serde_json::from_str(&raw).map_err(|e| {
            EngineError::unknown(format!("Failed to parse turn response: {e} - body: {raw}"))
        })?;
        Ok(reply.into())
    }
}

// ============================================================================
// Entity Lookup
// ============================================================================

/// Entity lookup client over HTTP+JSON
pub struct HttpEntityLookup {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpEntityLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: parse_base_url(base_url)?,
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

#[async_trait]
impl EntityLookup for HttpEntityLookup {
    async fn lookup(&self, entity_id: &str) -> Result<Entity, EngineError> {
        let url = endpoint(&self.base_url, &["entity", entity_id])?;
        let raw = send(self.client.get(url), self.token.as_deref()).await?;
        serde_json::from_str(&raw).map_err(|e| {
            EngineError::unknown(format!("Failed to parse entity {entity_id}: {e} - body: {raw}"))
        })
    }
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest<'a> {
    identity: &'a str,
    session_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TurnRequest<'a> {
    identity: &'a str,
    session_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TurnReply {
    cur_state: String,
    #[serde(default)]
    text_content: String,
    #[serde(default)]
    product_list: Option<Vec<String>>,
}

impl From<TurnReply> for TurnResponse {
    fn from(reply: TurnReply) -> Self {
        TurnResponse {
            state: reply.cur_state,
            text: reply.text_content,
            entity_ids: reply.product_list.unwrap_or_default(),
        }
    }
}
