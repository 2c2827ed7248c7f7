//! Generation provider seam: one `generate(prompt) -> text` capability per backend.
//!
//! Backends are picked by an exhaustive match over `Provider`; there is no
//! string-prefix dispatch anywhere else in the crate.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::domain::Provider;
use crate::ollama::Ollama;
use crate::openai::OpenAI;

#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("transport error: {0}")]
  Transport(String),
  #[error("HTTP {status}: {message}")]
  Http { status: u16, message: String },
  #[error("undecodable response: {0}")]
  Decode(String),
  #[error("empty completion")]
  Empty,
  #[error("timed out after {0:?}")]
  Timeout(Duration),
}

impl From<reqwest::Error> for ProviderError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      ProviderError::Transport(format!("request timed out: {e}"))
    } else if e.is_decode() {
      ProviderError::Decode(e.to_string())
    } else {
      ProviderError::Transport(e.to_string())
    }
  }
}

/// A text-completion backend. Output is untrusted and may be anything.
#[async_trait]
pub trait Generate: Send + Sync {
  async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

  /// Model identifier, for logs and the providers listing.
  fn model(&self) -> &str;
}

/// The configured backends, at most one per `Provider` variant.
#[derive(Clone, Default)]
pub struct Providers {
  pub openai: Option<Arc<dyn Generate>>,
  pub ollama: Option<Arc<dyn Generate>>,
}

impl Providers {
  /// Build from env: OpenAI only with an API key, Ollama unless OLLAMA_ENABLED is false.
  pub fn from_env() -> Self {
    let openai = OpenAI::from_env().map(|oa| {
      info!(target: "pdfquiz_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI-compatible provider enabled.");
      Arc::new(oa) as Arc<dyn Generate>
    });
    if openai.is_none() {
      info!(target: "pdfquiz_backend", "OpenAI provider disabled (no OPENAI_API_KEY).");
    }

    let ollama = Ollama::from_env().map(|ol| {
      info!(target: "pdfquiz_backend", base_url = %ol.base_url, model = %ol.model, "Ollama provider enabled.");
      Arc::new(ol) as Arc<dyn Generate>
    });
    if ollama.is_none() {
      info!(target: "pdfquiz_backend", "Ollama provider disabled.");
    }

    Self { openai, ollama }
  }

  pub fn get(&self, provider: Provider) -> Option<&Arc<dyn Generate>> {
    match provider {
      Provider::OpenAi => self.openai.as_ref(),
      Provider::Ollama => self.ollama.as_ref(),
    }
  }

  pub fn configured(&self) -> Vec<Provider> {
    Provider::ALL.into_iter().filter(|p| self.get(*p).is_some()).collect()
  }

  /// DEFAULT_PROVIDER if set and configured, else the first configured backend.
  pub fn default_provider(&self, preferred: Option<Provider>) -> Option<Provider> {
    preferred
      .filter(|p| self.get(*p).is_some())
      .or_else(|| self.configured().into_iter().next())
  }
}

/// Call `generate` bounded by `timeout`; elapsed time maps to `ProviderError::Timeout`.
pub async fn generate_with_timeout(
  backend: &dyn Generate,
  prompt: &str,
  timeout: Duration,
) -> Result<String, ProviderError> {
  match tokio::time::timeout(timeout, backend.generate(prompt)).await {
    Ok(res) => res,
    Err(_) => Err(ProviderError::Timeout(timeout)),
  }
}
