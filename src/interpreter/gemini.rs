//! Gemini `generateContent` client
//!
//! One attempt per request. The only timeout is the HTTP client's own.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::schema::{classification_prompt, response_schema};
use super::{IntentService, InterpretError, TextGenerator};

/// Default public endpoint
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Default model for both classification and chef prompts
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Connection settings for the generative service
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateRequest {
    fn prompt(text: String, generation_config: Option<GenerationConfig>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text }],
            }],
            generation_config,
        }
    }
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, if non-empty
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// HTTP client for the hosted model
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    settings: ServiceSettings,
}

impl GeminiClient {
    pub fn new(settings: ServiceSettings) -> Result<Self, InterpretError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| InterpretError::Transport(e.to_string()))?;

        Ok(Self { client, settings })
    }

    pub fn has_api_key(&self) -> bool {
        self.settings.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    async fn generate_content(&self, request: &GenerateRequest) -> Result<String, InterpretError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(InterpretError::MissingApiKey)?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| InterpretError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InterpretError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InterpretError::Malformed(e.to_string()))?;

        let text = body.text().ok_or(InterpretError::EmptyResponse)?;
        debug!(model = %self.settings.model, chars = text.len(), "model replied");
        Ok(text)
    }
}

#[async_trait]
impl IntentService for GeminiClient {
    async fn classify(&self, utterance: &str) -> Result<String, InterpretError> {
        let request = GenerateRequest::prompt(
            classification_prompt(utterance),
            Some(GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(),
            }),
        );
        self.generate_content(&request).await
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, InterpretError> {
        let request = GenerateRequest::prompt(prompt.to_string(), None);
        self.generate_content(&request).await
    }
}
