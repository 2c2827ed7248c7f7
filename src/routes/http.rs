//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs ids and sizes, never document text.

use std::sync::Arc;

use axum::{
  extract::{multipart::MultipartError, Multipart, Path, State},
  http::{header, StatusCode},
  response::IntoResponse,
  Json,
};
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::logic::{process_document, render_json, render_txt};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_providers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let providers = state
    .providers
    .configured()
    .into_iter()
    .filter_map(|p| {
      state.providers.get(p).map(|backend| ProviderOut {
        name: p,
        model: backend.model().to_string(),
        batch_size: state.config.pipeline.batch_size(p),
      })
    })
    .collect();
  Json(ProvidersOut { providers, default: state.default_provider })
}

fn bad_multipart(e: MultipartError) -> AppError {
  if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
    AppError::PayloadTooLarge(format!("upload too large: {}", e.body_text()))
  } else {
    AppError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
  }
}

#[instrument(level = "info", skip(state, multipart))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  mut multipart: Multipart,
) -> Result<Json<GenerateOut>, AppError> {
  let mut pdf: Option<Vec<u8>> = None;
  let mut params = GenerateParams::default();

  while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
    let name = field.name().unwrap_or_default().to_string();
    match name.as_str() {
      "pdf_file" => pdf = Some(field.bytes().await.map_err(bad_multipart)?.to_vec()),
      "question_count" => params.question_count = Some(field.text().await.map_err(bad_multipart)?),
      "difficulty" => params.difficulty = Some(field.text().await.map_err(bad_multipart)?),
      "chapter" | "topic" => params.topic = Some(field.text().await.map_err(bad_multipart)?),
      "provider" => params.provider = Some(field.text().await.map_err(bad_multipart)?),
      other => debug!(target: "pdfquiz_backend", field = %other, "Ignoring unknown form field"),
    }
  }

  let pdf = pdf.ok_or_else(|| AppError::BadRequest("pdf_file is required".into()))?;
  info!(target: "pdfquiz_backend", bytes = pdf.len(), ?params, "HTTP generate received");
  let out = process_document(&state, pdf, params).await?;
  Ok(Json(out))
}

async fn stored(state: &AppState, id: &str) -> Result<Arc<GenerateOut>, AppError> {
  state
    .results
    .get(id)
    .await
    .ok_or_else(|| AppError::NotFound(format!("no result with id '{id}'")))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_result(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<GenerateOut>, AppError> {
  let result = stored(&state, &id).await?;
  Ok(Json((*result).clone()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_download_txt(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let result = stored(&state, &id).await?;
  let body = render_txt(&result);
  info!(target: "pdfquiz_backend", %id, bytes = body.len(), "TXT export served");
  Ok((
    [
      (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
      (header::CONTENT_DISPOSITION, "attachment; filename=\"results.txt\""),
    ],
    body,
  ))
}

#[instrument(level = "info", skip(state))]
pub async fn http_download_json(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let result = stored(&state, &id).await?;
  let body = render_json(&result)?;
  info!(target: "pdfquiz_backend", %id, bytes = body.len(), "JSON export served");
  Ok((
    [
      (header::CONTENT_TYPE, "application/json"),
      (header::CONTENT_DISPOSITION, "attachment; filename=\"results.json\""),
    ],
    body,
  ))
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
  };
  use serde_json::Value;
  use tower::ServiceExt;

  use crate::config::AppConfig;
  use crate::logic::tests::{mcq_json, test_state, test_state_with_pages};
  use crate::protocol::tests::sample_result;
  use crate::provider::testing::Scripted;
  use crate::routes::build_router;
  use crate::state::AppState;

  const BOUNDARY: &str = "pdfquiz-test-boundary";

  fn multipart_body(fields: &[(&str, &str)], pdf: Option<&[u8]>) -> Body {
    let mut body = Vec::new();
    for (name, value) in fields {
      body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
      );
    }
    if let Some(pdf) = pdf {
      body.extend_from_slice(
        format!(
          "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"pdf_file\"; filename=\"doc.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
      );
      body.extend_from_slice(pdf);
      body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
  }

  fn generate_request(fields: &[(&str, &str)], pdf: Option<&[u8]>) -> Request<Body> {
    Request::builder()
      .method("POST")
      .uri("/api/v1/generate")
      .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
      .body(multipart_body(fields, pdf))
      .unwrap()
  }

  fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
  }

  async fn json_body(res: axum::response::Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn app(state: AppState) -> (Router, Arc<AppState>) {
    let state = Arc::new(state);
    (build_router(state.clone()), state)
  }

  #[tokio::test]
  async fn health_is_ok() {
    let (state, _) = test_state(Scripted::ok(&[]), AppConfig::default());
    let (router, _) = app(state);
    let res = router.oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["ok"], true);
  }

  #[tokio::test]
  async fn providers_lists_configured_backends() {
    let (state, _) = test_state(Scripted::ok(&[]), AppConfig::default());
    let (router, _) = app(state);
    let v = json_body(router.oneshot(get("/api/v1/providers")).await.unwrap()).await;
    assert_eq!(v["default"], "ollama");
    assert_eq!(v["providers"][0]["name"], "ollama");
    assert_eq!(v["providers"][0]["model"], "scripted");
    assert_eq!(v["providers"][0]["batchSize"], 10);
  }

  #[tokio::test]
  async fn generate_then_fetch_and_download() {
    let (state, _) = test_state(Scripted::ok(&["# Notes", &mcq_json(2, "Cells")]), AppConfig::default());
    let (router, _) = app(state);

    let res = router
      .clone()
      .oneshot(generate_request(&[("question_count", "2"), ("chapter", "Cells")], Some(&b"%PDF-1.4"[..])))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = json_body(res).await;
    assert_eq!(v["mcqs"].as_array().unwrap().len(), 2);
    assert_eq!(v["mcqs"][1]["id"], 2);
    assert_eq!(v["metadata"]["chapter"], "Cells");
    assert_eq!(v["metadata"]["obtainedCount"], 2);
    assert_eq!(v["summary"], "# Notes");
    let id = v["id"].as_str().unwrap().to_string();

    let fetched = json_body(router.clone().oneshot(get(&format!("/api/v1/results/{id}"))).await.unwrap()).await;
    assert_eq!(fetched["id"], id.as_str());

    let txt = router.clone().oneshot(get(&format!("/api/v1/results/{id}/download/txt"))).await.unwrap();
    assert_eq!(txt.status(), StatusCode::OK);
    assert_eq!(
      txt.headers()["content-disposition"],
      "attachment; filename=\"results.txt\""
    );
    let text = String::from_utf8(to_bytes(txt.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(text.contains("✅ Correct Answer: C. c"));

    let json = router.oneshot(get(&format!("/api/v1/results/{id}/download/json"))).await.unwrap();
    assert_eq!(json.headers()["content-disposition"], "attachment; filename=\"results.json\"");
    assert_eq!(json_body(json).await.as_array().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn missing_pdf_is_bad_request() {
    let (state, _) = test_state(Scripted::ok(&[]), AppConfig::default());
    let (router, _) = app(state);
    let res = router.oneshot(generate_request(&[("question_count", "3")], None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "pdf_file is required");
  }

  #[tokio::test]
  async fn unconfigured_provider_is_unavailable() {
    let (state, backend) = test_state(Scripted::ok(&[]), AppConfig::default());
    let (router, _) = app(state);
    let res = router
      .oneshot(generate_request(&[("provider", "openai")], Some(&b"%PDF"[..])))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(backend.prompt_count(), 0);
  }

  #[tokio::test]
  async fn unknown_result_is_not_found() {
    let (state, _) = test_state(Scripted::ok(&[]), AppConfig::default());
    let (router, state) = app(state);
    state.results.insert(sample_result("known")).await;
    let res = router.clone().oneshot(get("/api/v1/results/unknown/download/txt")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = router.oneshot(get("/api/v1/results/known")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn textless_document_is_unprocessable() {
    let (state, backend) = test_state_with_pages(Scripted::ok(&[]), AppConfig::default(), vec!["  ".into()]);
    let (router, _) = app(state);
    let res = router
      .oneshot(generate_request(&[("question_count", "2")], Some(&b"%PDF"[..])))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(res).await["error"], "no text could be extracted from the document");
    assert_eq!(backend.prompt_count(), 0);
  }

  #[tokio::test]
  async fn oversized_upload_is_rejected() {
    let mut config = AppConfig::default();
    config.server.max_upload_bytes = 256;
    let (state, backend) = test_state(Scripted::ok(&[]), config);
    let (router, state) = app(state);
    let pdf = vec![b'x'; 4096];
    let res = router
      .oneshot(generate_request(&[("question_count", "1")], Some(&pdf[..])))
      .await
      .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json_body(res).await["error"].as_str().unwrap().starts_with("upload too large"));
    assert_eq!(backend.prompt_count(), 0);
    assert_eq!(state.results.len().await, 0);
  }
}
