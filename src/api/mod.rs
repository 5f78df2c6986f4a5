use axum::{
    routing::{delete, get, post},
    Router,
    Json,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    response::{Html, IntoResponse, Response},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use validator::Validate;

use crate::document::rag::{IndexedDocument, RagError, RagSystem};
use crate::llm::chat::ChatMessage;
use crate::llm::embeddings::EmbeddingError;
use crate::llm::generator::Answer;
use crate::llm::semantic_search::{RetrievalError, SearchResult};
use crate::providers::traits::ProviderError;

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Clone)]
pub struct AppState {
    rag: Arc<Mutex<RagSystem>>,
}

#[derive(Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000))]
    question: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    answer: String,
    sources: Vec<SearchResult>,
    hypothetical: Option<String>,
}

impl From<Answer> for ChatResponse {
    fn from(answer: Answer) -> Self {
        Self {
            answer: answer.text,
            sources: answer.sources,
            hypothetical: answer.hypothetical,
        }
    }
}

#[derive(Serialize)]
pub struct MessagesResponse {
    document: Option<IndexedDocument>,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
pub struct ApiResponse {
    status: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse { status: message.into() })).into_response()
}

fn provider_status(err: &ProviderError) -> StatusCode {
    match err {
        ProviderError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn status_for(err: &RagError) -> StatusCode {
    match err {
        RagError::NoDocument => StatusCode::CONFLICT,
        RagError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::Generation(e) => provider_status(e),
        RagError::Embedding(EmbeddingError::Provider(e))
        | RagError::Retrieval(RetrievalError::Embedding(EmbeddingError::Provider(e))) => provider_status(e),
        RagError::Embedding(_) | RagError::Retrieval(RetrievalError::Embedding(_)) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn rag_error_response(err: RagError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        log::error!("Request failed: {}", err);
    } else {
        log::warn!("Request rejected: {}", err);
    }

    let message = match err {
        RagError::Generation(_) | RagError::Retrieval(_) => format!("Error processing query: {}", err),
        _ => format!("Error: {}", err),
    };
    error_response(status, message)
}

fn is_pdf(file_name: &str, content_type: Option<&str>) -> bool {
    file_name.to_lowercase().ends_with(".pdf") || content_type == Some("application/pdf")
}

/// One permit shared by every pipeline route.
fn pipeline_limit() -> GlobalConcurrencyLimitLayer {
    GlobalConcurrencyLimitLayer::new(1)
}

/// Create and configure the API router
pub fn create_api(rag: RagSystem, max_upload_bytes: usize) -> Router {
    let state = AppState {
        rag: Arc::new(Mutex::new(rag)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    // One interaction at a time: uploads and questions run to completion in order
    let pipeline = Router::new()
        .route("/upload", post(upload_handler))
        .route("/chat", post(chat_handler))
        .route("/messages", get(messages_handler))
        .route("/session", delete(clear_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(pipeline_limit());

    Router::new()
        .route("/", get(index_page))
        .route("/health", get(health_check))
        .merge(pipeline)
        .layer(cors)
        .with_state(state)
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_check() -> Response {
    Json(ApiResponse {
        status: "Server is running and healthy".to_string(),
    })
    .into_response()
}

async fn upload_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut upload = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                let content_type = field.content_type().map(|c| c.to_string());
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((file_name, content_type, bytes.to_vec()));
                        break;
                    }
                    Err(e) => return error_response(e.status(), format!("Error: could not read upload: {}", e)),
                }
            }
            Ok(None) => break,
            Err(e) => return error_response(e.status(), format!("Error: invalid upload: {}", e)),
        }
    }

    let Some((file_name, content_type, bytes)) = upload else {
        return error_response(StatusCode::BAD_REQUEST, "Error: missing 'file' field");
    };

    if !is_pdf(&file_name, content_type.as_deref()) {
        return error_response(StatusCode::BAD_REQUEST, "Error: only PDF files are supported");
    }

    log::info!("Received upload {} ({} bytes)", file_name, bytes.len());

    let mut rag = state.rag.lock().await;
    match rag.index_document(&file_name, bytes).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => rag_error_response(e),
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return error_response(
                rejection.status(),
                format!("Error: invalid request: {}", rejection.body_text()),
            )
        }
    };

    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, format!("Error: invalid request: {}", e));
    }

    let question = request.question.trim();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Error: question is empty");
    }

    let mut rag = state.rag.lock().await;
    match rag.ask(question).await {
        Ok(answer) => Json(ChatResponse::from(answer)).into_response(),
        Err(e) => rag_error_response(e),
    }
}

async fn messages_handler(State(state): State<AppState>) -> Response {
    let rag = state.rag.lock().await;
    Json(MessagesResponse {
        document: rag.active_document().cloned(),
        messages: rag.messages().to_vec(),
    })
    .into_response()
}

async fn clear_handler(State(state): State<AppState>) -> Response {
    let mut rag = state.rag.lock().await;
    match rag.clear().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => rag_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::vector_db::VectorDB;
    use crate::document::processor::ProcessedDocument;
    use crate::providers::mock::MockProvider;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn rag_system(temp: &TempDir, provider: Arc<MockProvider>) -> RagSystem {
        let mut config = AppConfig::from_lookup(|_| None);
        config.upload_dir = temp.path().join("uploads");
        config.hyde_enabled = false;
        let vector_db = VectorDB::open_in_memory().await.unwrap();
        RagSystem::new(&config, vector_db, provider.clone(), provider).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn chat_request(question: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "question": question }).to_string()))
            .unwrap()
    }

    fn multipart_request(file_name: &str, content: &str) -> Request<Body> {
        let boundary = "PDFCHATBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{content}\r\n--{b}--\r\n",
            b = boundary,
            name = file_name,
            content = content,
        );
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_index_page() {
        let temp = TempDir::new().unwrap();
        let app = create_api(rag_system(&temp, Arc::new(MockProvider::new())).await, 1024 * 1024);

        let response = app.clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_without_document_is_conflict() {
        let temp = TempDir::new().unwrap();
        let app = create_api(rag_system(&temp, Arc::new(MockProvider::new())).await, 1024 * 1024);

        let response = app.oneshot(chat_request("What is this about?")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert!(body["status"].as_str().unwrap().contains("Upload a PDF"));
    }

    #[tokio::test]
    async fn test_malformed_chat_body_gets_json_error() {
        let temp = TempDir::new().unwrap();
        let app = create_api(rag_system(&temp, Arc::new(MockProvider::new())).await, 1024 * 1024);

        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["status"].as_str().unwrap().starts_with("Error: invalid request"));
    }

    #[tokio::test]
    async fn test_pipeline_limit_is_shared_across_routes() {
        use std::convert::Infallible;
        use std::time::Duration;
        use tower::{Layer, Service};

        let layer = pipeline_limit();
        let mut upload = layer.layer(tower::service_fn(|_: ()| async { Ok::<_, Infallible>(()) }));
        let mut chat = layer.layer(tower::service_fn(|_: ()| async { Ok::<_, Infallible>(()) }));

        upload.ready().await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), chat.ready()).await;
        assert!(waited.is_err(), "second route acquired a permit while the first held it");

        upload.call(()).await.unwrap();
        chat.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_question() {
        let temp = TempDir::new().unwrap();
        let app = create_api(rag_system(&temp, Arc::new(MockProvider::new())).await, 1024 * 1024);

        let response = app.clone().oneshot(chat_request("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(chat_request("   ")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_answers_with_sources() {
        let temp = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let mut rag = rag_system(&temp, provider.clone()).await;
        rag.index_processed(
            ProcessedDocument {
                file_name: "manual.pdf".to_string(),
                pages: 2,
                text_chars: 80,
                chunks: vec![
                    "Press the red button to start the machine".to_string(),
                    "Clean the filter every two weeks".to_string(),
                ],
            },
            "doc_manual",
        )
        .await
        .unwrap();
        provider.push_response("Key Insight: press the red button");

        let app = create_api(rag, 1024 * 1024);
        let response = app.clone()
            .oneshot(chat_request("Press the red button to start the machine"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["answer"], "Key Insight: press the red button");
        assert_eq!(body["sources"][0]["chunk_index"], 0);
        assert_eq!(body["sources"][0]["source"], "manual.pdf");

        let response = app
            .oneshot(Request::builder().uri("/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["document"]["file_name"], "manual.pdf");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_generation_failure_is_bad_gateway() {
        let temp = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let mut rag = rag_system(&temp, provider.clone()).await;
        rag.index_processed(
            ProcessedDocument {
                file_name: "a.pdf".to_string(),
                pages: 1,
                text_chars: 10,
                chunks: vec!["some text".to_string()],
            },
            "doc_a",
        )
        .await
        .unwrap();
        provider.push_error("backend unavailable");

        let app = create_api(rag, 1024 * 1024);
        let response = app.oneshot(chat_request("some text")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert!(body["status"].as_str().unwrap().starts_with("Error processing query:"));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf() {
        let temp = TempDir::new().unwrap();
        let app = create_api(rag_system(&temp, Arc::new(MockProvider::new())).await, 1024 * 1024);

        let response = app.oneshot(multipart_request("notes.txt", "hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_of_corrupt_pdf_is_unprocessable() {
        let temp = TempDir::new().unwrap();
        let app = create_api(rag_system(&temp, Arc::new(MockProvider::new())).await, 1024 * 1024);

        let response = app.oneshot(multipart_request("broken.pdf", "not really a pdf")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!temp.path().join("uploads").join("broken.pdf").exists());
    }

    #[tokio::test]
    async fn test_clear_session() {
        let temp = TempDir::new().unwrap();
        let app = create_api(rag_system(&temp, Arc::new(MockProvider::new())).await, 1024 * 1024);

        let response = app
            .oneshot(Request::builder().method("DELETE").uri("/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["dropped_collections"], 0);
    }
}
