//! [`ModelGateway`] backed by the Gemini REST API.
//!
//! Chat replies use `streamGenerateContent?alt=sse`; quizzes use
//! `generateContent` with a JSON response schema. The REST API is stateless,
//! so the only model-side session state kept here is the attachment pinned by
//! the first turn of each session, which is re-sent inline with the first
//! user turn of every later request.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attachment::Attachment;
use crate::config::Config;
use crate::conversation::Exchange;
use crate::error::GatewayError;
use crate::gateway::{ModelGateway, ReplyStream, SessionHandle};

// -- Request types ----------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
pub struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiBlob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

// -- Response types ---------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub error: Option<GeminiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponseContent {
    #[serde(default)]
    pub parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    /// Thinking models flag their reasoning parts; those are not shown.
    #[serde(default)]
    pub thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl GeminiResponse {
    /// Visible text of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| p.thought != Some(true))
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn text_part(text: &str) -> GeminiPart {
    GeminiPart::Text {
        text: text.to_string(),
    }
}

fn inline_part(attachment: &Attachment) -> GeminiPart {
    GeminiPart::InlineData {
        inline_data: GeminiBlob {
            mime_type: attachment.mime_type().to_string(),
            data: attachment.payload().to_string(),
        },
    }
}

/// Build the `contents` list for a chat request. `inline` is attached to the
/// earliest user turn so the model always sees the file first.
pub fn build_chat_contents(
    prior: &[Exchange],
    text: &str,
    inline: Option<&Attachment>,
) -> Vec<GeminiContent> {
    let mut contents = Vec::with_capacity(prior.len() * 2 + 1);
    let mut inline = inline;
    let mut user_content = |message: &str| {
        let mut parts = Vec::new();
        if let Some(att) = inline.take() {
            parts.push(inline_part(att));
        }
        parts.push(text_part(message));
        GeminiContent {
            role: Some("user".to_string()),
            parts,
        }
    };
    for exchange in prior {
        contents.push(user_content(&exchange.user));
        contents.push(GeminiContent {
            role: Some("model".to_string()),
            parts: vec![text_part(&exchange.model)],
        });
    }
    contents.push(user_content(text));
    contents
}

// -- SSE decoding -----------------------------------------------------------

/// Turns raw SSE bytes into cumulative reply text.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    buffer: Vec<u8>,
    cumulative: String,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.cumulative
    }

    /// Feed bytes; returns one item per `data:` event that changed the text
    /// or reported an error.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, GatewayError>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(item) = self.process_line(line.trim()) {
                out.push(item);
            }
        }
        out
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Option<Result<String, GatewayError>> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        self.process_line(line.trim())
    }

    fn process_line(&mut self, line: &str) -> Option<Result<String, GatewayError>> {
        let json_str = line.strip_prefix("data:")?.trim();
        if json_str.is_empty() || json_str == "[DONE]" {
            return None;
        }
        let parsed = match serde_json::from_str::<GeminiResponse>(json_str) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "skipping undecodable SSE event");
                return None;
            }
        };
        if let Some(err) = parsed.error {
            return Some(Err(GatewayError::Http {
                status: err.code,
                body: err.message,
            }));
        }
        let delta = parsed.text();
        if delta.is_empty() {
            return None;
        }
        self.cumulative.push_str(&delta);
        Some(Ok(self.cumulative.clone()))
    }
}

struct SseState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseAccumulator,
    ready: VecDeque<Result<String, GatewayError>>,
    finished: bool,
}

// -- Gateway ----------------------------------------------------------------

pub struct GeminiGateway {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
    quiz_temperature: f32,
    pinned: Mutex<HashMap<Uuid, Attachment>>,
}

impl GeminiGateway {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let api_key = config.resolve_api_key().ok_or(GatewayError::MissingApiKey)?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(GeminiGateway {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            quiz_temperature: config.quiz_temperature,
            pinned: Mutex::new(HashMap::new()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn streaming_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        )
    }

    pub fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn pinned_for(&self, session: &SessionHandle) -> Option<Attachment> {
        self.pinned
            .lock()
            .ok()
            .and_then(|map| map.get(&session.id).cloned())
    }

    fn pin(&self, session: &SessionHandle, attachment: &Attachment) {
        if let Ok(mut map) = self.pinned.lock() {
            map.insert(session.id, attachment.clone());
        }
    }

    async fn post(&self, url: &str, body: &GeminiRequest) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            warn!(status = status.as_u16(), "Gemini request failed");
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    fn discard_session(&self, session: &SessionHandle) {
        if let Ok(mut map) = self.pinned.lock() {
            if map.remove(&session.id).is_some() {
                info!(session = %session.id, "discarded pinned attachment");
            }
        }
    }

    async fn stream_reply(
        &self,
        session: &SessionHandle,
        prior: &[Exchange],
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<ReplyStream, GatewayError> {
        if let Some(att) = attachment {
            self.pin(session, att);
        }
        let inline = attachment.cloned().or_else(|| self.pinned_for(session));
        let request = GeminiRequest {
            contents: build_chat_contents(prior, text, inline.as_ref()),
            system_instruction: Some(GeminiContent {
                role: None,
                parts: vec![text_part(&session.system_instruction)],
            }),
            generation_config: Some(GeminiGenerationConfig {
                temperature: session.temperature,
                response_mime_type: None,
                response_schema: None,
            }),
        };
        debug!(
            session = %session.id,
            prior = prior.len(),
            inline = inline.is_some(),
            "opening reply stream"
        );

        let response = self.post(&self.streaming_url(), &request).await?;
        let state = SseState {
            bytes: response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()))
                .boxed(),
            decoder: SseAccumulator::new(),
            ready: VecDeque::new(),
            finished: false,
        };

        let stream = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(item) = st.ready.pop_front() {
                    return Some((item, st));
                }
                if st.finished {
                    return None;
                }
                match st.bytes.next().await {
                    Some(Ok(chunk)) => st.ready.extend(st.decoder.push(&chunk)),
                    Some(Err(e)) => {
                        st.finished = true;
                        st.ready.push_back(Err(e.into()));
                    }
                    None => {
                        st.finished = true;
                        st.ready.extend(st.decoder.finish());
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn generate_structured(
        &self,
        attachment: &Attachment,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, GatewayError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![inline_part(attachment), text_part(prompt)],
            }],
            system_instruction: None,
            generation_config: Some(GeminiGenerationConfig {
                temperature: self.quiz_temperature,
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(schema.clone()),
            }),
        };

        let response: GeminiResponse = self.post(&self.generate_url(), &request).await?.json().await?;
        if let Some(err) = response.error {
            return Err(GatewayError::Http {
                status: err.code,
                body: err.message,
            });
        }
        let text = response.text();
        if text.trim().is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}
