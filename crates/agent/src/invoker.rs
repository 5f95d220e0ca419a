//! Client for the hosted conversational-agent endpoint.
//!
//! One call is one request/response cycle. The endpoint streams its answer as
//! newline-delimited completion events; every event carrying a `chunk.bytes`
//! payload (base64) contributes to the final text, in arrival order.

use std::time::Duration;

use architect_core::config::InvocationConfig;
use architect_core::SessionId;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{future, stream, Stream, StreamExt};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentTarget {
    pub agent_id: String,
    pub alias_id: String,
}

impl AgentTarget {
    /// Accepts either a bare agent id or a full ARN; the id is the last `/` segment.
    pub fn from_identifier(identifier: &str, alias_id: &str) -> Self {
        let identifier = identifier.trim();
        let agent_id = identifier.rsplit('/').next().unwrap_or(identifier);
        Self { agent_id: agent_id.to_owned(), alias_id: alias_id.to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentInvocationResult {
    pub response_text: String,
    pub session_id: SessionId,
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("agent invocation timed out after {}", display_timeout(.0))]
    Timeout(Duration),
    #[error("agent endpoint unreachable: {0}")]
    Transport(String),
    #[error("agent endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("agent response could not be decoded: {0}")]
    Decode(String),
}

impl InvocationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TimeoutError",
            Self::Transport(_) => "TransportError",
            Self::Endpoint { .. } => "EndpointError",
            Self::Decode(_) => "DecodeError",
        }
    }

    fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Whole seconds print as `600s`, anything finer as milliseconds.
fn display_timeout(timeout: &Duration) -> String {
    let millis = timeout.as_millis();
    if millis > 0 && millis % 1000 == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{millis}ms")
    }
}

#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        target: &AgentTarget,
        prompt: &str,
        session_id: &SessionId,
    ) -> Result<AgentInvocationResult, InvocationError>;
}

/// One element of the streamed completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionFragment {
    pub bytes: Option<Vec<u8>>,
}

impl CompletionFragment {
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: Some(bytes.into()) }
    }

    pub fn empty() -> Self {
        Self { bytes: None }
    }
}

/// Concatenates fragment payloads in delivery order; the first error aborts.
pub async fn collect_completion<S>(
    session_id: SessionId,
    fragments: S,
) -> Result<AgentInvocationResult, InvocationError>
where
    S: Stream<Item = Result<CompletionFragment, InvocationError>>,
{
    let mut fragments = std::pin::pin!(fragments);
    let mut payload = Vec::new();

    while let Some(fragment) = fragments.next().await {
        if let Some(bytes) = fragment?.bytes {
            payload.extend_from_slice(&bytes);
        }
    }

    // Decoded once so multi-byte characters split across chunks survive.
    let response_text = String::from_utf8(payload)
        .map_err(|error| InvocationError::Decode(format!("invalid utf-8: {error}")))?;

    Ok(AgentInvocationResult { response_text, session_id })
}

#[derive(Debug, Deserialize)]
struct CompletionEvent {
    #[serde(default)]
    chunk: Option<ChunkPayload>,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    bytes: Option<String>,
}

/// Splits a byte stream into NDJSON completion events.
#[derive(Debug, Default)]
struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<CompletionFragment, InvocationError>> {
        self.buffer.extend_from_slice(bytes);
        let mut fragments = Vec::new();

        while let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=position).collect();
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            fragments.push(decode_event(&line));
        }

        fragments
    }
}

fn decode_event(line: &[u8]) -> Result<CompletionFragment, InvocationError> {
    let event: CompletionEvent = serde_json::from_slice(line)
        .map_err(|error| InvocationError::Decode(format!("invalid completion event: {error}")))?;

    let Some(encoded) = event.chunk.and_then(|chunk| chunk.bytes) else {
        return Ok(CompletionFragment::empty());
    };

    STANDARD
        .decode(encoded.as_bytes())
        .map(CompletionFragment::data)
        .map_err(|error| InvocationError::Decode(format!("invalid chunk payload: {error}")))
}

pub struct HttpAgentInvoker {
    client: Client,
    endpoint: Url,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpAgentInvoker {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, InvocationError> {
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .build()
            .map_err(|error| InvocationError::Transport(error.to_string()))?;

        let endpoint = endpoint.into();
        let endpoint = Url::parse(&endpoint).map_err(|error| {
            InvocationError::Transport(format!("invalid agent endpoint `{endpoint}`: {error}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(InvocationError::Transport(format!(
                "agent endpoint `{endpoint}` cannot carry a path"
            )));
        }

        Ok(Self { client, endpoint, api_key, timeout })
    }

    pub fn from_config(config: &InvocationConfig) -> Result<Self, InvocationError> {
        Self::new(
            config.resolved_endpoint(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Each id is pushed as one percent-encoded path segment, so client-chosen
    /// session ids cannot add segments or a query to the route.
    fn invocation_url(
        &self,
        target: &AgentTarget,
        session_id: &SessionId,
    ) -> Result<Url, InvocationError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| InvocationError::Transport("agent endpoint cannot carry a path".into()))?
            .pop_if_empty()
            .push("agents")
            .push(&target.agent_id)
            .push("agentAliases")
            .push(&target.alias_id)
            .push("sessions")
            .push(&session_id.0)
            .push("text");
        Ok(url)
    }

    async fn invoke_streaming(
        &self,
        target: &AgentTarget,
        prompt: &str,
        session_id: &SessionId,
    ) -> Result<AgentInvocationResult, InvocationError> {
        let timeout = self.timeout;
        let mut request = self
            .client
            .post(self.invocation_url(target, session_id)?)
            .json(&json!({ "inputText": prompt }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| InvocationError::from_reqwest(error, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvocationError::Endpoint { status: status.as_u16(), body });
        }

        let fragments = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|error| InvocationError::from_reqwest(error, timeout))
            })
            // Trailing newline flushes an unterminated final event.
            .chain(stream::once(future::ready(Ok(b"\n".to_vec()))))
            .scan(FrameDecoder::default(), |decoder, chunk| {
                let decoded = match chunk {
                    Ok(bytes) => decoder.push(&bytes),
                    Err(error) => vec![Err(error)],
                };
                future::ready(Some(stream::iter(decoded)))
            })
            .flatten();

        collect_completion(session_id.clone(), fragments).await
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn invoke(
        &self,
        target: &AgentTarget,
        prompt: &str,
        session_id: &SessionId,
    ) -> Result<AgentInvocationResult, InvocationError> {
        let preview: String = prompt.chars().take(100).collect();
        info!(
            event_name = "agent.invocation.start",
            agent_id = %target.agent_id,
            alias_id = %target.alias_id,
            session_id = %session_id,
            prompt_preview = %preview,
            "invoking agent"
        );

        let outcome = tokio::time::timeout(
            self.timeout,
            self.invoke_streaming(target, prompt, session_id),
        )
        .await
        .unwrap_or_else(|_| Err(InvocationError::Timeout(self.timeout)));

        match &outcome {
            Ok(result) => debug!(
                event_name = "agent.invocation.complete",
                agent_id = %target.agent_id,
                session_id = %session_id,
                response_len = result.response_text.len(),
                "agent invocation completed"
            ),
            Err(error) => warn!(
                event_name = "agent.invocation.failed",
                agent_id = %target.agent_id,
                session_id = %session_id,
                error_kind = error.kind(),
                error = %error,
                "agent invocation failed"
            ),
        }

        outcome
    }
}
