//! HTTP surface for Rusty RAG.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /index` – Load a PDF file or directory, chunk it, embed new chunks, and persist them
//!   in a collection. Returns the indexing summary (`added_count`, `skipped_existing`, ...).
//! - `POST /query` – Retrieve the top `k` chunks for a question and render the prompt.
//! - `POST /answer` – Same as `/query`, then answer with the configured language model.
//! - `GET /collections` – List collections under the store root.
//! - `DELETE /collections/:name` – Remove a collection and all of its state.
//! - `GET /metrics` – Observe indexing and query counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::loader::LoadError;
use crate::processing::{ProcessingError, RagApi, RetrievalError};
use crate::store::{ScoredChunk, StoreError};
use axum::{
    Json, Router,
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Build the HTTP router exposing the RAG API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/index", post(index_documents::<S>))
        .route("/query", post(query::<S>))
        .route("/answer", post(answer::<S>))
        .route("/collections", get(list_collections::<S>))
        .route("/collections/:name", delete(delete_collection::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /index` endpoint.
#[derive(Deserialize)]
struct IndexRequest {
    /// PDF file or directory of PDFs, resolved on the server.
    path: PathBuf,
    /// Target collection, created on first use.
    collection: String,
}

async fn index_documents<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<crate::processing::IndexSummary>, AppError>
where
    S: RagApi,
{
    let summary = service.index(&request.path, &request.collection).await?;
    tracing::info!(
        collection = %request.collection,
        added = summary.added_count,
        skipped = summary.skipped_existing,
        "Index request completed"
    );
    Ok(Json(summary))
}

/// Request body shared by `POST /query` and `POST /answer`.
#[derive(Deserialize)]
struct QuestionRequest {
    collection: String,
    question: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResult {
    id: String,
    text: String,
    source: String,
    page: usize,
    score: f32,
}

impl From<ScoredChunk> for QueryResult {
    fn from(hit: ScoredChunk) -> Self {
        Self {
            id: hit.metadata.id,
            text: hit.text,
            source: hit.metadata.source,
            page: hit.metadata.page,
            score: hit.score,
        }
    }
}

#[derive(Serialize)]
struct QueryResponse {
    prompt: String,
    results: Vec<QueryResult>,
}

async fn query<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: RagApi,
{
    let prompt = service
        .build_prompt(&request.collection, &request.question, request.k)
        .await?;
    Ok(Json(QueryResponse {
        prompt: prompt.prompt,
        results: prompt.results.into_iter().map(QueryResult::from).collect(),
    }))
}

async fn answer<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<crate::processing::Answer>, AppError>
where
    S: RagApi,
{
    let answer = service
        .answer(&request.collection, &request.question, request.k)
        .await?;
    Ok(Json(answer))
}

#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<String>,
}

async fn list_collections<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<CollectionsResponse>, AppError>
where
    S: RagApi,
{
    let collections = service.list_collections().await?;
    Ok(Json(CollectionsResponse { collections }))
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn delete_collection<S>(
    State(service): State<Arc<S>>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<DeleteResponse>, AppError>
where
    S: RagApi,
{
    let deleted = service.delete_collection(&name).await?;
    Ok(Json(DeleteResponse { deleted }))
}

async fn get_metrics<S>(
    State(service): State<Arc<S>>,
) -> Json<crate::metrics::MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "index",
                method: "POST",
                path: "/index",
                description: "Load PDFs from a server-side path, chunk them, and add chunks not yet stored in the collection.",
                request_example: Some(json!({
                    "path": "data/reports",
                    "collection": "reports"
                })),
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Retrieve the nearest chunks and return the rendered question-answering prompt.",
                request_example: Some(json!({
                    "collection": "reports",
                    "question": "What changed in Q3?",
                    "k": 5
                })),
            },
            CommandDescriptor {
                name: "answer",
                method: "POST",
                path: "/answer",
                description: "Answer a question from retrieved context; requires GENERATION_MODEL.",
                request_example: Some(json!({
                    "collection": "reports",
                    "question": "What changed in Q3?"
                })),
            },
            CommandDescriptor {
                name: "list_collections",
                method: "GET",
                path: "/collections",
                description: "Return the names of collections under the store root.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_collection",
                method: "DELETE",
                path: "/collections/:name",
                description: "Irreversibly remove a collection and all of its chunks.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return indexing and query counters.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Processing(ProcessingError),
    Retrieval(RetrievalError),
    Store(StoreError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        let store_error = match self {
            Self::Processing(ProcessingError::Load(LoadError::NotFound(_))) => {
                return StatusCode::NOT_FOUND;
            }
            Self::Processing(ProcessingError::Store(error))
            | Self::Retrieval(RetrievalError::Store(error))
            | Self::Store(error) => Some(error),
            _ => None,
        };
        match store_error {
            Some(error) if error.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Processing(error) => error.to_string(),
            Self::Retrieval(error) => error.to_string(),
            Self::Store(error) => error.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "Request failed");
        }
        (status, message).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}

impl From<RetrievalError> for AppError {
    fn from(inner: RetrievalError) -> Self {
        Self::Retrieval(inner)
    }
}

impl From<StoreError> for AppError {
    fn from(inner: StoreError) -> Self {
        Self::Store(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::loader::LoadError;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{Answer, IndexSummary, ProcessingError, RagApi, RagPrompt, RetrievalError};
    use crate::store::{ChunkMetadata, ScoredChunk, StoreError};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_index_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let index = commands
            .iter()
            .find(|cmd| cmd.name == "index")
            .expect("index command present");

        assert_eq!(index.method, "POST");
        assert_eq!(index.path, "/index");
        assert!(commands.iter().any(|cmd| cmd.method == "DELETE"));
    }

    #[tokio::test]
    async fn index_route_forwards_path_and_collection() {
        let service = Arc::new(StubRagService::default());
        let response = send(
            service.clone(),
            Method::POST,
            "/index",
            Some(json!({ "path": "docs/a.pdf", "collection": "reports" })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["added_count"], 3);
        assert_eq!(json["skipped_existing"], 1);

        let calls = service.index_calls.lock().await.clone();
        assert_eq!(calls, vec![(PathBuf::from("docs/a.pdf"), "reports".to_string())]);
    }

    #[tokio::test]
    async fn missing_document_maps_to_not_found() {
        let response = send(
            Arc::new(StubRagService::default()),
            Method::POST,
            "/index",
            Some(json!({ "path": "missing.pdf", "collection": "reports" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn query_route_flattens_results() {
        let response = send(
            Arc::new(StubRagService::default()),
            Method::POST,
            "/query",
            Some(json!({ "collection": "reports", "question": "why?", "k": 1 })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["prompt"], "prompt for why?");
        assert_eq!(json["results"][0]["id"], "a.pdf:0:0");
        assert_eq!(json["results"][0]["page"], 0);
        assert_eq!(json["results"][0]["source"], "a.pdf");
    }

    #[tokio::test]
    async fn zero_k_maps_to_bad_request() {
        let response = send(
            Arc::new(StubRagService::default()),
            Method::POST,
            "/query",
            Some(json!({ "collection": "reports", "question": "why?", "k": 0 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disabled_generation_is_a_server_error() {
        let response = send(
            Arc::new(StubRagService::default()),
            Method::POST,
            "/answer",
            Some(json!({ "collection": "reports", "question": "why?" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn delete_route_reports_outcome() {
        let response = send(
            Arc::new(StubRagService::default()),
            Method::DELETE,
            "/collections/reports",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["deleted"], true);
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let response = send(
            Arc::new(StubRagService::default()),
            Method::GET,
            "/metrics",
            None,
        )
        .await;
        let json = body_json(response).await;
        assert_eq!(json["index_runs"], 7);
    }

    async fn send(
        service: Arc<StubRagService>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        create_router(service)
            .oneshot(request)
            .await
            .expect("router response")
    }

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[derive(Default)]
    struct StubRagService {
        index_calls: Mutex<Vec<(PathBuf, String)>>,
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn index(
            &self,
            source: &Path,
            collection: &str,
        ) -> Result<IndexSummary, ProcessingError> {
            if source == Path::new("missing.pdf") {
                return Err(LoadError::NotFound(source.to_path_buf()).into());
            }
            self.index_calls
                .lock()
                .await
                .push((source.to_path_buf(), collection.to_string()));
            Ok(IndexSummary {
                added_count: 3,
                pages_loaded: 2,
                chunks_total: 4,
                skipped_existing: 1,
                stale_count: 0,
                existing_before: 1,
            })
        }

        async fn build_prompt(
            &self,
            _collection: &str,
            query_text: &str,
            k: Option<usize>,
        ) -> Result<RagPrompt, RetrievalError> {
            if k == Some(0) {
                return Err(StoreError::InvalidK(0).into());
            }
            Ok(RagPrompt {
                prompt: format!("prompt for {query_text}"),
                results: vec![ScoredChunk {
                    text: "Alpha.".into(),
                    metadata: ChunkMetadata {
                        id: "a.pdf:0:0".into(),
                        source: "a.pdf".into(),
                        page: 0,
                        content_hash: String::new(),
                        indexed_at: String::new(),
                    },
                    score: 0.9,
                }],
            })
        }

        async fn answer(
            &self,
            _collection: &str,
            _question: &str,
            _k: Option<usize>,
        ) -> Result<Answer, RetrievalError> {
            Err(RetrievalError::GenerationDisabled)
        }

        async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
            Ok(vec!["reports".into()])
        }

        async fn delete_collection(&self, _collection: &str) -> Result<bool, StoreError> {
            Ok(true)
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                index_runs: 7,
                ..MetricsSnapshot::default()
            }
        }
    }
}
