use crate::error::ApiError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use study_rag_core::{
    AdminOutcome, AdminService, ChatRequest, ChatResponse, DocumentUpload, IngestionPipeline,
    QueryPipeline, SkippedChunk,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryPipeline>,
    pub ingestion: Arc<IngestionPipeline>,
    pub admin: Arc<AdminService>,
}

#[derive(Debug, Default, Clone)]
pub struct StaticMounts {
    /// Built frontend served for every unknown GET, with `index.html` fallback.
    pub frontend_dir: Option<PathBuf>,
    /// Directory of locally stored uploads, served under `/files`.
    pub files_dir: Option<PathBuf>,
}

pub fn router(state: AppState, mounts: StaticMounts) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/admin/delete-topic", delete(delete_topic))
        .route("/admin/nuke-system", delete(nuke_system))
        .with_state(state);

    if let Some(files_dir) = mounts.files_dir {
        app = app.nest_service("/files", ServeDir::new(files_dir));
    }
    if let Some(frontend_dir) = mounts.frontend_dir {
        let index = frontend_dir.join("index.html");
        app = app.fallback_service(ServeDir::new(frontend_dir).fallback(ServeFile::new(index)));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(mode = %request.mode, difficulty = %request.difficulty, "chat request");
    Ok(Json(state.query.answer(&request).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub filename: String,
    pub chunks: usize,
    pub indexed: usize,
    pub skipped_chunks: Vec<SkippedChunk>,
    pub pdf_url: String,
}

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut filename = None;
    let mut bytes = None;
    let mut subject = None;
    let mut chapter = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::BadRequest(format!("Failed to read multipart field: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                bytes = Some(field.bytes().await.map_err(|error| {
                    ApiError::BadRequest(format!("Failed to read file: {error}"))
                })?);
            }
            "subject" | "chapter" => {
                let text = field.text().await.map_err(|error| {
                    ApiError::BadRequest(format!("Failed to read {name}: {error}"))
                })?;
                if name == "subject" {
                    subject = Some(text);
                } else {
                    chapter = Some(text);
                }
            }
            _ => {}
        }
    }

    let (Some(filename), Some(bytes)) = (filename, bytes) else {
        return Err(ApiError::BadRequest("file is required".to_string()));
    };
    let upload = DocumentUpload {
        filename,
        bytes: bytes.to_vec(),
        subject: subject.ok_or_else(|| ApiError::BadRequest("subject is required".to_string()))?,
        chapter: chapter.ok_or_else(|| ApiError::BadRequest("chapter is required".to_string()))?,
    };

    ingest_upload(&state, upload).await.map(Json)
}

pub async fn ingest_upload(
    state: &AppState,
    upload: DocumentUpload,
) -> Result<UploadResponse, ApiError> {
    info!(filename = %upload.filename, subject = %upload.subject, chapter = %upload.chapter, "upload received");
    let report = state.ingestion.ingest(upload).await?;

    Ok(UploadResponse {
        status: "success".to_string(),
        filename: report.document.filename,
        chunks: report.chunk_count,
        indexed: report.indexed_count,
        skipped_chunks: report.skipped_chunks,
        pdf_url: report.document.pdf_url,
    })
}

#[derive(Debug, Deserialize)]
pub struct DeleteTopicRequest {
    pub subject: String,
}

#[derive(Debug, Deserialize)]
pub struct NukeRequest {
    pub confirmation: String,
}

fn admin_secret(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ADMIN_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
}

pub async fn delete_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DeleteTopicRequest>,
) -> Result<Json<AdminOutcome>, ApiError> {
    let outcome = state
        .admin
        .delete_topic(admin_secret(&headers), &request.subject)
        .await?;
    Ok(Json(outcome))
}

pub async fn nuke_system(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NukeRequest>,
) -> Result<Json<AdminOutcome>, ApiError> {
    let outcome = state
        .admin
        .nuke(admin_secret(&headers), &request.confirmation)
        .await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{HeaderValue, StatusCode};
    use study_rag_core::{
        CharacterNgramEmbedder, Generator, InMemoryVectorStore, IngestError, IngestionOptions,
        LocalStorage, PageText, PdfExtractor, QueryOptions, UpstreamError,
        NOT_FOUND_ANSWER,
    };
    use tempfile::TempDir;

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, UpstreamError> {
            Ok("Normalization reduces redundancy \u{2192} fewer anomalies.".to_string())
        }
    }

    struct TextPages;

    impl PdfExtractor for TextPages {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
            Ok(vec![PageText {
                number: 1,
                text: "Normalization reduces redundancy in relational tables.".to_string(),
            }])
        }
    }

    fn state(dir: &TempDir) -> (AppState, Arc<InMemoryVectorStore>) {
        let embedder = Arc::new(CharacterNgramEmbedder { dimensions: 64 });
        let index = Arc::new(InMemoryVectorStore::new());
        let storage = Arc::new(LocalStorage::new(dir.path()));

        let ingestion = IngestionPipeline::new(
            embedder.clone(),
            index.clone(),
            storage.clone(),
            Arc::new(TextPages),
            IngestionOptions::default(),
        )
        .expect("pipeline");
        let query = QueryPipeline::new(
            embedder,
            index.clone(),
            Arc::new(EchoGenerator),
            QueryOptions::default(),
        );
        let admin = AdminService::new(index.clone(), storage, Some("s3cret".to_string()));

        (
            AppState {
                query: Arc::new(query),
                ingestion: Arc::new(ingestion),
                admin: Arc::new(admin),
            },
            index,
        )
    }

    fn upload_request() -> DocumentUpload {
        DocumentUpload {
            filename: "DBMS Unit 1.pdf".to_string(),
            bytes: b"%PDF-1.4".to_vec(),
            subject: "DBMS".to_string(),
            chapter: "Normalization".to_string(),
        }
    }

    #[tokio::test]
    async fn upload_then_chat_cites_the_file() -> Result<(), ApiError> {
        let dir = TempDir::new().expect("tempdir");
        let (state, _index) = state(&dir);

        let uploaded = ingest_upload(&state, upload_request()).await?;
        assert_eq!(uploaded.status, "success");
        assert_eq!(uploaded.filename, "DBMS_Unit_1.pdf");
        assert_eq!(uploaded.chunks, 1);
        assert_eq!(uploaded.indexed, 1);

        let Json(response) = chat(
            State(state),
            Json(ChatRequest::new("Normalization reduces redundancy in relational tables")),
        )
        .await?;

        assert_eq!(response.answer, "Normalization reduces redundancy -> fewer anomalies.");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].source, "DBMS_Unit_1.pdf");
        assert_eq!(response.sources[0].chapter, "Normalization");
        Ok(())
    }

    #[tokio::test]
    async fn chat_on_empty_index_returns_not_found() -> Result<(), ApiError> {
        let dir = TempDir::new().expect("tempdir");
        let (state, _index) = state(&dir);

        let Json(response) = chat(State(state), Json(ChatRequest::new("What is paging?"))).await?;
        assert_eq!(response.answer, NOT_FOUND_ANSWER);
        assert!(response.sources.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn empty_question_is_bad_request() {
        let dir = TempDir::new().expect("tempdir");
        let (state, _index) = state(&dir);

        let error = chat(State(state), Json(ChatRequest::new(""))).await.err();
        assert_eq!(error.map(|e| e.status()), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn admin_routes_check_the_secret_header() -> Result<(), ApiError> {
        let dir = TempDir::new().expect("tempdir");
        let (state, index) = state(&dir);
        ingest_upload(&state, upload_request()).await?;

        let forbidden = nuke_system(
            State(state.clone()),
            HeaderMap::new(),
            Json(NukeRequest {
                confirmation: "DELETE_EVERYTHING".to_string(),
            }),
        )
        .await
        .err();
        assert_eq!(forbidden.map(|e| e.status()), Some(StatusCode::FORBIDDEN));
        assert_eq!(index.len().await, 1);

        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_SECRET_HEADER, HeaderValue::from_static("s3cret"));

        let mismatch = nuke_system(
            State(state.clone()),
            headers.clone(),
            Json(NukeRequest {
                confirmation: "WRONG".to_string(),
            }),
        )
        .await
        .err();
        assert_eq!(mismatch.map(|e| e.status()), Some(StatusCode::BAD_REQUEST));
        assert_eq!(index.len().await, 1);

        let Json(outcome) = delete_topic(
            State(state),
            headers,
            Json(DeleteTopicRequest {
                subject: "DBMS".to_string(),
            }),
        )
        .await?;
        assert_eq!(outcome.message, "Deleted all memories for topic: DBMS");
        assert!(index.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_version() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
