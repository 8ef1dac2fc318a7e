//! Ollama-backed completion client for the generation service.
//!
//! One request/response contract: prompt in, raw model text out. Parsing
//! and validation of that text belong to `autodev-core::generate`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use autodev_core::domain::{AutodevError, Result};
use autodev_core::generate::CompletionBackend;

/// Generation service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Full generate endpoint, e.g. `http://localhost:11434/api/generate`.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Whole-request deadline; generation is slow.
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            endpoint: std::env::var("AUTODEV_OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434/api/generate".to_string()),
            model: std::env::var("AUTODEV_OLLAMA_MODEL")
                .unwrap_or_else(|_| "qwen2.5-coder:7b".to_string()),
            temperature: 0.2,
            timeout: Duration::from_secs(180),
        }
    }
}

impl OllamaConfig {
    /// Create a config from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Non-streaming client for an Ollama-style `/api/generate` endpoint.
pub struct OllamaBackend {
    config: OllamaConfig,
    http: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("autodev/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        OllamaBackend { config, http }
    }

    /// Create client from environment variables.
    pub fn from_env() -> Self {
        Self::new(OllamaConfig::from_env())
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(
            event = "generate.request",
            model = %self.config.model,
            prompt_chars = prompt.len(),
        );
        let payload = GenerateRequest {
            model: &self.config.model,
            prompt,
            system,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AutodevError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AutodevError::RemoteService {
                status: status.as_u16(),
                message,
            });
        }
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AutodevError::Transport(e.to_string()))?;
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_config_default() {
        let config = OllamaConfig::default();
        assert!(config.endpoint.ends_with("/api/generate"));
        assert!(!config.model.is_empty());
        assert_eq!(config.timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_generate_request_wire_shape() {
        let payload = GenerateRequest {
            model: "qwen2.5-coder:7b",
            prompt: "p",
            system: "s",
            stream: false,
            options: GenerateOptions { temperature: 0.5 },
        };
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["model"], "qwen2.5-coder:7b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["temperature"], 0.5);
    }
}
