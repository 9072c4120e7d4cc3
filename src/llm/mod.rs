//! Language-model capability used by the NL→SQL translator.
//!
//! The only operation the rest of the crate needs is `complete(prompt)`;
//! the concrete client speaks the Gemini `generateContent` REST API.

#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeminiConfig;
use crate::{Result, TidepoolError};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Capability boundary for query synthesis. Implemented by [`GeminiClient`]
/// in production and by canned doubles in tests.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GeminiConfig, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_API_BASE.to_string()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            agent,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

impl LanguageModel for GeminiClient {
    #[inline]
    fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion from {} (prompt length: {})",
            self.model,
            prompt.len()
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            // Deterministic output; query synthesis should not be creative.
            generation_config: GenerationConfig { temperature: 0.0 },
        };

        let request_json = serde_json::to_string(&request)
            .map_err(|e| TidepoolError::LanguageModel(format!("request serialization: {e}")))?;

        let response_text = self
            .agent
            .post(&self.endpoint())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| TidepoolError::LanguageModel(e.to_string()))?;

        let response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| TidepoolError::LanguageModel(format!("response parsing: {e}")))?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| {
                TidepoolError::LanguageModel("response contained no candidates".to_string())
            })?;

        debug!("Received completion ({} chars)", text.len());
        Ok(text)
    }
}
