//! Gemini `generateContent` client for the shopping assistant.
//!
//! Sends the system instruction, the whole conversation and the sampling
//! temperature in one request and returns the text of the first candidate.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::assistant::{AssistantError, ChatRole, CompletionRequest, TextCompletion};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig").field("model", &self.model).finish_non_exhaustive()
    }
}

/// [`TextCompletion`] over the Gemini REST API.
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(backend_error)?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String { format!("{API_BASE}/models/{}:generateContent", self.config.model) }
}

#[async_trait]
impl TextCompletion for GeminiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AssistantError> {
        debug!(model = %self.config.model, turns = request.contents.len(), "requesting completion");
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.config.api_key.as_str())
            .json(&GenerateRequest::from_completion(&request))
            .send()
            .await
            .map_err(backend_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Backend(format!("Gemini API error ({status}): {body}")));
        }
        let body: GenerateResponse = response.json().await.map_err(backend_error)?;
        Ok(body.into_text())
    }
}

fn backend_error(e: reqwest::Error) -> AssistantError { AssistantError::Backend(e.to_string()) }

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

impl<'a> GenerateRequest<'a> {
    fn from_completion(request: &'a CompletionRequest) -> Self {
        let contents = request
            .contents
            .iter()
            .map(|m| Content {
                role: Some(match m.role {
                    ChatRole::User => "user",
                    ChatRole::Model => "model",
                }),
                parts: vec![Part { text: &m.content }],
            })
            .collect();
        Self {
            system_instruction: Content { role: None, parts: vec![Part { text: &request.system_instruction }] },
            contents,
            generation_config: GenerationConfig { temperature: request.temperature },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text parts of the first candidate, joined; empty when there is none.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default()
    }
}
