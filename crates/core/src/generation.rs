use crate::error::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Knobs for one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
}

/// Narrow interface to the generative model service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: serde_json::Value,
}

/// Generation client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaGenerator {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: json!({
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
                "stop": options.stop_sequences,
            }),
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: OllamaGenerateResponse = response.json().await?;
        Ok(parsed.response.trim().to_string())
    }
}
