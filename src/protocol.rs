//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Diagnostic, ExtractionMethod, McqRecord, Provider};

/// Everything one generate call produced; also what the result store keeps.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOut {
    pub id: String,
    /// Markdown; `None` when disabled or when the summary call failed.
    pub summary: Option<String>,
    pub mcqs: Vec<McqRecord>,
    pub topics: Vec<String>,
    pub metadata: Metadata,
    pub timing: Timing,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub chapter: String,
    pub difficulty: String,
    pub question_count: usize,
    pub obtained_count: usize,
    pub extraction_method: ExtractionMethod,
    pub provider: Provider,
    pub model: String,
}

/// Wall-clock durations formatted like "1.25s".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub extraction_time: String,
    pub summary_time: String,
    pub mcq_time: String,
    pub total_time: String,
}

/// Form fields of `POST /api/v1/generate`, after multipart parsing.
#[derive(Clone, Debug, Default)]
pub struct GenerateParams {
    pub question_count: Option<String>,
    pub difficulty: Option<String>,
    pub topic: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOut {
    pub name: Provider,
    pub model: String,
    pub batch_size: usize,
}

#[derive(Debug, Serialize)]
pub struct ProvidersOut {
    pub providers: Vec<ProviderOut>,
    pub default: Option<Provider>,
}
