//! Application state: config, providers, text source, and the in-memory result store.
//!
//! This module owns:
//!   - the loaded `AppConfig` (prompts + pipeline/extraction/store knobs)
//!   - the configured generation backends
//!   - the text source (native extraction + OCR fallback)
//!   - results by id, so exports never depend on "whatever ran last"

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{load_config_from_env, AppConfig};
use crate::domain::Provider;
use crate::extract::TextSource;
use crate::protocol::GenerateOut;
use crate::provider::Providers;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub providers: Providers,
    pub default_provider: Option<Provider>,
    pub text_source: TextSource,
    pub results: ResultStore,
}

impl AppState {
    /// Build state from env: load config, init providers and the text source.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env();
        let providers = Providers::from_env();

        let preferred = std::env::var("DEFAULT_PROVIDER").ok().and_then(|p| match p.parse::<Provider>() {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(target: "pdfquiz_backend", error = %e, "Ignoring DEFAULT_PROVIDER");
                None
            }
        });

        let text_source = TextSource::from_config(&config.extraction);
        info!(
            target: "pdfquiz_backend",
            ocr_enabled = config.extraction.ocr_enabled,
            ocr_language = %config.extraction.ocr_language,
            max_results = config.store.max_results,
            "Text source and result store ready"
        );

        Self::from_parts(config, providers, preferred, text_source)
    }

    pub fn from_parts(
        config: AppConfig,
        providers: Providers,
        preferred: Option<Provider>,
        text_source: TextSource,
    ) -> Self {
        let default_provider = providers.default_provider(preferred);
        match default_provider {
            Some(p) => info!(target: "pdfquiz_backend", provider = %p, "Default provider selected"),
            None => tracing::error!(target: "pdfquiz_backend", "No generation provider configured; generate requests will be rejected"),
        }
        let results = ResultStore::new(config.store.max_results);
        Self {
            config: Arc::new(config),
            providers,
            default_provider,
            text_source,
            results,
        }
    }
}

/// Results keyed by a generated id, bounded; oldest entries are evicted first.
#[derive(Clone)]
pub struct ResultStore {
    inner: Arc<RwLock<StoreInner>>,
    capacity: usize,
}

#[derive(Default)]
struct StoreInner {
    by_id: HashMap<String, Arc<GenerateOut>>,
    order: VecDeque<String>,
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            capacity: capacity.max(1),
        }
    }

    /// Fresh UUID v4 key for a result about to be stored.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[instrument(level = "debug", skip(self, result), fields(id = %result.id))]
    pub async fn insert(&self, result: GenerateOut) -> Arc<GenerateOut> {
        let result = Arc::new(result);
        let mut inner = self.inner.write().await;
        let id = result.id.clone();
        if inner.by_id.insert(id.clone(), result.clone()).is_none() {
            inner.order.push_back(id);
        }
        while inner.order.len() > self.capacity {
            if let Some(old) = inner.order.pop_front() {
                inner.by_id.remove(&old);
                debug!(target: "pdfquiz_backend", evicted = %old, "Result evicted");
            }
        }
        debug!(target: "pdfquiz_backend", stored = inner.by_id.len(), "Result stored");
        result
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get(&self, id: &str) -> Option<Arc<GenerateOut>> {
        self.inner.read().await.by_id.get(id).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }
}
