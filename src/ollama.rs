//! Local Ollama backend (`POST /api/generate`, non-streaming).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::provider::{Generate, ProviderError};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "mistral";

#[derive(Clone)]
pub struct Ollama {
  pub client: reqwest::Client,
  pub base_url: String,
  pub model: String,
}

impl Ollama {
  /// Enabled unless OLLAMA_ENABLED is "0"/"false"; base URL and model come from env.
  pub fn from_env() -> Option<Self> {
    let enabled = std::env::var("OLLAMA_ENABLED")
      .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
      .unwrap_or(true);
    if !enabled {
      return None;
    }
    let base_url = std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
    Self::new(&base_url, &model)
  }

  pub fn new(base_url: &str, model: &str) -> Option<Self> {
    // Local models are slow on CPU; the pipeline timeout is the real bound.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(600))
      .build()
      .ok()?;
    Some(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      model: model.to_string(),
    })
  }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  response: Option<String>,
  /// Nanoseconds, as reported by Ollama.
  #[serde(default)]
  total_duration: Option<u64>,
}

#[async_trait]
impl Generate for Ollama {
  #[instrument(level = "info", target = "provider", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
    let url = format!("{}/api/generate", self.base_url);
    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .json(&GenerateRequest { model: &self.model, prompt, stream: false })
      .send()
      .await
      .map_err(|e| {
        if e.is_connect() {
          ProviderError::Transport(format!("cannot reach Ollama at {}; is `ollama serve` running?", self.base_url))
        } else {
          ProviderError::from(e)
        }
      })?;

    if !res.status().is_success() {
      let status = res.status();
      let message = res.text().await.unwrap_or_default();
      error!(target: "provider", %status, elapsed = ?start.elapsed(), "Ollama call failed");
      return Err(ProviderError::Http { status: status.as_u16(), message });
    }

    let body: GenerateResponse = res.json().await?;
    let text = body.response.unwrap_or_default();
    info!(
      target: "provider",
      elapsed = ?start.elapsed(),
      model_duration = ?body.total_duration.map(Duration::from_nanos),
      response_len = text.len(),
      "Ollama response received"
    );
    if text.trim().is_empty() {
      return Err(ProviderError::Empty);
    }
    Ok(text)
  }

  fn model(&self) -> &str {
    &self.model
  }
}
