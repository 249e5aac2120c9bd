// Generation module
// Ollama-backed answer generation behind the ChatModelProvider seam

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;

const GENERATE_TIMEOUT_SECONDS: u64 = 120;
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Produces answer text from an assembled prompt.
///
/// One attempt per call; there is no retry above the transport. The caller
/// owns the degradation policy when generation fails.
#[async_trait]
pub trait ChatModelProvider: Send + Sync {
    /// Generate the full answer at once.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate the answer as incremental text chunks.
    async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>>;
}

/// Blocking HTTP client for the Ollama generate API.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(GENERATE_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.ollama.chat_model.clone(),
            agent,
        })
    }

    /// Generate a complete answer in one response.
    #[inline]
    pub fn generate_blocking(&self, prompt: &str) -> Result<String> {
        debug!(
            "Generating answer with model {} (prompt length: {})",
            self.model,
            prompt.len()
        );

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generate request")?;

        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generate URL")?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Failed to call generate endpoint")?;

        let response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse generate response")?;

        debug!("Generated answer ({} chars)", response.response.len());
        Ok(response.response)
    }

    /// Stream answer chunks into `sender` until the model reports done.
    fn stream_blocking(&self, prompt: &str, sender: &mpsc::Sender<Result<String>>) -> Result<()> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: true,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generate request")?;

        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generate URL")?;

        let response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .context("Failed to call generate endpoint")?;

        let reader = BufReader::new(response.into_body().into_reader());
        for line in reader.lines() {
            let line = line.context("Failed to read stream line")?;
            if line.trim().is_empty() {
                continue;
            }

            let chunk: GenerateResponse =
                serde_json::from_str(&line).context("Failed to parse stream chunk")?;

            if !chunk.response.is_empty()
                && sender.blocking_send(Ok(chunk.response)).is_err()
            {
                // Receiver dropped; the client went away.
                debug!("Stream receiver dropped, aborting generation read");
                return Ok(());
            }

            if chunk.done {
                break;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ChatModelProvider for OllamaGenerator {
    #[inline]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let generator = self.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || generator.generate_blocking(&prompt))
            .await
            .context("Generation task panicked")?
    }

    #[inline]
    async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>> {
        let (sender, receiver) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let generator = self.clone();
        let prompt = prompt.to_string();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = generator.stream_blocking(&prompt, &sender) {
                warn!("Streaming generation failed: {}", e);
                // Best effort; the receiver may already be gone.
                let _ = sender.blocking_send(Err(e));
            }
        });

        Ok(receiver)
    }
}
