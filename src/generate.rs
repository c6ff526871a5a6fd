//! Drafting post bodies with an external text-generation model.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::GeminiConfig;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no generation API key configured")]
    MissingKey,

    /// Carries no URL: the request URL holds the API key.
    #[error("generation request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("generation service answered {0}")]
    Status(u16),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Text of the first candidate, or an empty string when the answer has none.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

pub fn blog_prompt(title: &str) -> String {
    format!("Write a concise blog post about: {title}")
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

pub struct Gemini {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl Gemini {
    pub fn new(http: reqwest::Client, config: GeminiConfig) -> Self {
        Gemini { http, config }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl TextGenerator for Gemini {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let Some(key) = self.config.api_key.as_deref() else {
            return Err(GenerationError::MissingKey);
        };

        let response = self
            .http
            .post(self.url())
            .query(&[("key", key)])
            .json(&GenerateRequest {
                contents: [Content {
                    parts: [Part { text: prompt }],
                }],
            })
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.without_url()))?;

        if !response.status().is_success() {
            return Err(GenerationError::Status(response.status().as_u16()));
        }

        // A body that is not JSON counts as malformed, same as a missing field.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(first_candidate_text(&body))
    }
}

fn first_candidate_text(body: &Value) -> String {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
