// Completion client adapter. Two wire shapes are supported behind one
// interface, selected by configuration:
//   - `generate`: Ollama-style /api/generate with an opaque context token
//     replayed between calls, streaming line-delimited JSON records;
//   - `chat`: OpenAI-style /v1/chat/completions resending the full message
//     history, streaming SSE `data:` lines.
// Both stream text chunks through an mpsc channel as they arrive and return
// the concatenated reply.

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::{BackendKind, Config};
use crate::conversation::ConversationState;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion endpoint returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("completion stream reported an error: {0}")]
    Stream(String),
    #[error("malformed completion payload: {0}")]
    Payload(String),
}

/// Sampling options sent with every generate-mode request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SamplingOptions {
    pub top_k: u32,
    pub top_p: f32,
    pub temperature: f32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        SamplingOptions {
            top_k: 40,
            top_p: 0.9,
            temperature: 0.8,
        }
    }
}

/// The polymorphic completion backend owned by one session.
pub enum CompletionBackend {
    Chat(ChatBackend),
    Generate(GenerateBackend),
}

impl CompletionBackend {
    pub fn from_config(config: &Config) -> Self {
        match config.backend {
            BackendKind::Chat => CompletionBackend::Chat(ChatBackend::new(
                &config.endpoint,
                &config.model,
                config.api_key.clone().unwrap_or_default(),
            )),
            BackendKind::Generate => {
                CompletionBackend::Generate(GenerateBackend::new(&config.endpoint, &config.model))
            }
        }
    }

    /// Run one completion for the conversation, streaming chunks through
    /// `tx` and returning the concatenated reply. The generate variant also
    /// captures the new context token on success.
    pub async fn complete(
        &mut self,
        conversation: &ConversationState,
        tx: &mpsc::Sender<String>,
    ) -> Result<String, CompletionError> {
        match self {
            CompletionBackend::Chat(backend) => backend.complete(conversation, tx).await,
            CompletionBackend::Generate(backend) => backend.complete(conversation, tx).await,
        }
    }

    /// One non-streaming request outside the conversation, used by the
    /// classifier. Never touches the session's context token.
    pub async fn one_shot(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        match self {
            CompletionBackend::Chat(backend) => backend.one_shot(system, user).await,
            CompletionBackend::Generate(backend) => backend.one_shot(system, user).await,
        }
    }

    /// The opaque context token held for the next generate-mode call.
    /// `None` for the chat variant, which resends the history instead.
    pub fn context_token(&self) -> Option<&[i64]> {
        match self {
            CompletionBackend::Chat(_) => None,
            CompletionBackend::Generate(backend) => Some(&backend.context),
        }
    }
}

// Reassembles complete lines from arbitrarily-split stream chunks.
#[derive(Default)]
struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let mut line: String = self.buf.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// The residual partial line once the stream closes, if any. A final
    /// record sent without a trailing newline still counts.
    fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

// --- Generate variant (Ollama-style /api/generate) ---

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    context: &'a [i64],
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateRecord {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    context: Option<Vec<i64>>,
}

pub struct GenerateBackend {
    client: Client,
    base_url: String,
    model: String,
    options: SamplingOptions,
    context: Vec<i64>,
}

impl GenerateBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        GenerateBackend {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options: SamplingOptions::default(),
            context: Vec::new(),
        }
    }

    async fn complete(
        &mut self,
        conversation: &ConversationState,
        tx: &mpsc::Sender<String>,
    ) -> Result<String, CompletionError> {
        let prompt = conversation
            .last_user()
            .ok_or_else(|| CompletionError::Payload("conversation has no user message".into()))?;
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            context: &self.context,
            stream: true,
            options: self.options,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut accumulated = String::new();
        let mut ended = false;

        while !ended {
            let batch = match stream.next().await {
                Some(chunk) => lines.push(&chunk?),
                None => {
                    ended = true;
                    lines.finish().into_iter().collect()
                }
            };
            for line in batch {
                if line.trim().is_empty() {
                    continue;
                }
                let record: GenerateRecord = serde_json::from_str(&line)
                    .map_err(|e| CompletionError::Payload(format!("bad stream record: {e}")))?;
                if let Some(message) = record.error {
                    error!(%message, "generate stream reported an error");
                    return Err(CompletionError::Stream(message));
                }
                if !record.response.is_empty() {
                    accumulated.push_str(&record.response);
                    let _ = tx.send(record.response).await;
                }
                if record.done {
                    if let Some(context) = record.context {
                        debug!(len = context.len(), "captured new context token");
                        self.context = context;
                    }
                    return Ok(accumulated);
                }
            }
        }
        Err(CompletionError::Payload(
            "stream ended before the final record".into(),
        ))
    }

    async fn one_shot(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let prompt = format!("{system}\n\n{user}");
        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            context: &[],
            stream: false,
            options: self.options,
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let record: GenerateRecord = response
            .json()
            .await
            .map_err(|e| CompletionError::Payload(format!("bad generate response: {e}")))?;
        if let Some(message) = record.error {
            return Err(CompletionError::Stream(message));
        }
        Ok(record.response.trim().to_string())
    }
}

// --- Chat variant (OpenAI-style /v1/chat/completions) ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct ChatBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatBackend {
    pub fn new(base_url: &str, model: &str, api_key: String) -> Self {
        ChatBackend {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    fn wire_messages<'a>(conversation: &'a ConversationState) -> Vec<WireMessage<'a>> {
        conversation
            .as_replay_list()
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect()
    }

    async fn complete(
        &self,
        conversation: &ConversationState,
        tx: &mpsc::Sender<String>,
    ) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: Self::wire_messages(conversation),
            stream: true,
        };
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut accumulated = String::new();
        let mut ended = false;

        while !ended {
            let batch = match stream.next().await {
                Some(chunk) => lines.push(&chunk?),
                None => {
                    ended = true;
                    lines.finish().into_iter().collect()
                }
            };
            for line in batch {
                let line = line.trim();
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(accumulated);
                }
                let parsed: ChatStreamChunk = serde_json::from_str(data)
                    .map_err(|e| CompletionError::Payload(format!("bad SSE record: {e}")))?;
                if let Some(delta) = parsed
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                {
                    accumulated.push_str(delta);
                    let _ = tx.send(delta.to_string()).await;
                }
            }
        }
        // Some servers close the stream without a [DONE] marker.
        Ok(accumulated)
    }

    async fn one_shot(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let messages = vec![
            WireMessage {
                role: "system",
                content: system,
            },
            WireMessage {
                role: "user",
                content: user,
            },
        ];
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Payload(format!("bad chat response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| CompletionError::Payload("chat response has no choices".into()))
    }
}

async fn status_error(response: reqwest::Response) -> CompletionError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read error body".to_string());
    error!(%status, %body, "completion endpoint returned an error status");
    CompletionError::Status { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"respon").is_empty());
        let lines = buffer.push(b"se\":\"hi\"}\n{\"done\":true}\n");
        assert_eq!(lines, vec![r#"{"response":"hi"}"#, r#"{"done":true}"#]);
    }

    #[test]
    fn test_line_buffer_finish_flushes_residual() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"done\":true}").is_empty());
        assert_eq!(buffer.finish(), Some(r#"{"done":true}"#.to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_strips_carriage_returns() {
        let mut buffer = LineBuffer::default();
        let lines = buffer.push(b"data: one\r\ndata: two\r\n");
        assert_eq!(lines, vec!["data: one", "data: two"]);
    }

    #[test]
    fn test_sampling_defaults() {
        let options = SamplingOptions::default();
        assert_eq!(options.top_k, 40);
        assert!((options.top_p - 0.9).abs() < f32::EPSILON);
        assert!((options.temperature - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_generate_record_defaults() {
        let record: GenerateRecord = serde_json::from_str(r#"{"response":"Hi"}"#).unwrap();
        assert_eq!(record.response, "Hi");
        assert!(!record.done);
        assert!(record.error.is_none());
        assert!(record.context.is_none());
    }
}
