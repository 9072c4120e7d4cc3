
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::{Result, TidepoolError};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| TidepoolError::EmbeddingProvider(e.to_string()))?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.ollama.model.clone(),
            batch_size: config.ollama.batch_size,
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Check that the server is reachable and lists the configured model.
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .map_err(|e| TidepoolError::EmbeddingProvider(e.to_string()))?;

        debug!("Pinging embedding server at {}", url);

        let response_text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| TidepoolError::EmbeddingProvider(e.to_string()))?;

        if response_text.contains(self.model.split(':').next().unwrap_or(&self.model)) {
            Ok(())
        } else {
            Err(TidepoolError::EmbeddingProvider(format!(
                "model '{}' is not available on the server",
                self.model
            )))
        }
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: self.model.clone(),
            inputs: texts.to_vec(),
        };

        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| TidepoolError::EmbeddingProvider(e.to_string()))?;

        let request_json = serde_json::to_string(&request)
            .map_err(|e| TidepoolError::EmbeddingProvider(format!("request serialization: {e}")))?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| TidepoolError::EmbeddingProvider(e.to_string()))?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| TidepoolError::EmbeddingProvider(format!("response parsing: {e}")))?;

        if response.embeddings.len() != texts.len() {
            return Err(TidepoolError::EmbeddingProvider(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }
}

impl EmbeddingProvider for OllamaClient {
    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_single_batch(chunk)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}
