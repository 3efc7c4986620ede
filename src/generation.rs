//! Text-generation backends.

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Type of text-generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Ollama-compatible HTTP API
    Ollama,
    /// No backend; every request reports the generator as unavailable
    Offline,
}

impl GeneratorKind {
    /// Creates a generator of this kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn create(self, config: &GenerationConfig) -> Result<Box<dyn TextGenerator>> {
        match self {
            Self::Ollama => Ok(Box::new(OllamaGenerator::new(config)?)),
            Self::Offline => Ok(Box::new(OfflineGenerator)),
        }
    }
}

/// A capability that turns one prompt into one textual response.
///
/// The response is free text; callers must not assume it is valid JSON.
pub trait TextGenerator {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Sends `prompt` and returns the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] if the backend is unreachable or its
    /// reply does not carry any text.
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Client for the Ollama HTTP API.
///
/// Uses `/api/chat` first and falls back to `/api/generate` when the chat
/// call fails or answers with an unexpected shape.
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::generation("ollama", format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn chat(&self, prompt: &str) -> std::result::Result<String, String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| format!("Ollama not reachable: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("chat returned HTTP {}", status.as_u16()));
        }

        resp.json::<OllamaChatResponse>()
            .map(|r| r.message.content)
            .map_err(|e| format!("unexpected chat response: {e}"))
    }

    fn complete(&self, prompt: &str) -> std::result::Result<String, String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| format!("Ollama not reachable: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("generate returned HTTP {}", status.as_u16()));
        }

        resp.json::<OllamaGenerateResponse>()
            .map(|r| r.response)
            .map_err(|e| format!("unexpected generate response: {e}"))
    }
}

impl TextGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Using model: {}", self.model);

        match self.chat(prompt) {
            Ok(text) => Ok(text),
            Err(chat_err) => {
                warn!("Chat request failed ({}); retrying with /api/generate", chat_err);
                self.complete(prompt).map_err(|generate_err| {
                    Error::generation(
                        self.name(),
                        format!("chat: {chat_err}; generate: {generate_err}"),
                    )
                })
            }
        }
    }
}

/// Backend used when no model is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::generation(self.name(), "text generation disabled"))
    }
}
