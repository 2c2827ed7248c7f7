//! PDF Quiz · summary and multiple-choice question backend
//!
//! - Axum HTTP API: upload a PDF, get a summary and validated MCQs back
//! - Native text extraction with pdftoppm + tesseract OCR fallback
//! - OpenAI-compatible or local Ollama generation
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables the OpenAI-compatible provider if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_MODEL        : default "gpt-4o-mini"
//!   OLLAMA_ENABLED      : "false" disables the local provider (default enabled)
//!   OLLAMA_BASE_URL     : default "http://localhost:11434"
//!   OLLAMA_MODEL        : default "mistral"
//!   DEFAULT_PROVIDER    : "openai" | "ollama"
//!   PDFQUIZ_CONFIG_PATH : path to TOML config (prompts, pipeline, extraction, store, server)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod error;
mod planner;
mod prompt;
mod repair;
mod assembler;
mod provider;
mod openai;
mod ollama;
mod pipeline;
mod extract;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: config, providers, text source, result store.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "pdfquiz_backend", %addr, providers = ?state.providers.configured(), "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "pdfquiz_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "pdfquiz_backend", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "pdfquiz_backend", "Shutdown signal received");
}
