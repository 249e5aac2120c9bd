// Server module
// HTTP surface over the chat service


use axum::body::{Bytes, StreamBody};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::service::ChatService;
use crate::{Result, SupportError};

#[derive(Debug, Deserialize)]
struct AskRequest {
    user_id: String,
    question: String,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct QuestionQuery {
    question: String,
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    category: String,
}

#[derive(Debug, Deserialize)]
struct CategoryRequest {
    category: String,
    #[serde(default)]
    questions: Vec<String>,
}

impl IntoResponse for SupportError {
    #[inline]
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // Missing resources are soft: the chat flow stays non-blocking.
            Self::NotFound(_) => {
                return (StatusCode::OK, Json(serde_json::Value::Null)).into_response();
            }
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Embedding(msg) | Self::Model(msg) | Self::Index(msg) => {
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        error!("Request failed: {message}");
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Assemble the application router.
#[inline]
#[must_use]
pub fn router(service: Arc<ChatService>) -> Router {
    Router::new()
        .route("/", get(synopsis))
        .route("/chat/ask", post(chat_ask))
        .route("/chat/stream", post(chat_stream))
        .route("/chat/most_relevant", get(chat_most_relevant))
        .route("/chat/history", get(chat_history))
        .route("/chat/reset", post(chat_reset))
        .route("/chat/qa", get(qa_list).post(qa_create).put(qa_update))
        .route("/chat/qa/:id", delete(qa_delete))
        .route("/category/list", get(category_list))
        .route("/category/group_one", get(category_group_one))
        .route("/category/group", get(category_group))
        .route("/category/counts", get(category_counts))
        .route("/category/count", get(category_count))
        .route("/category/questions_belong_to", post(category_members))
        .route("/category/update", post(category_update))
        .with_state(service)
}

/// Serve the router on the configured host and port until shutdown.
#[inline]
pub async fn run(service: Arc<ChatService>) -> Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        service.config().server.host,
        service.config().server.port
    )
    .parse()
    .map_err(|e| SupportError::Config(format!("Invalid server address: {e}")))?;

    let app = router(service);
    info!("Listening on http://{addr}");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| SupportError::Config(format!("Server error: {e}")))?;

    Ok(())
}

async fn synopsis() -> Json<serde_json::Value> {
    Json(json!({
        "service": "support-chat",
        "routes": [
            "POST /chat/ask",
            "POST /chat/stream",
            "GET /chat/most_relevant?question=",
            "GET /chat/history?user_id=",
            "POST /chat/reset",
            "GET|POST|PUT /chat/qa",
            "DELETE /chat/qa/:id",
            "GET /category/list",
            "GET /category/group_one?question=",
            "GET /category/group",
            "GET /category/counts",
            "GET /category/count?category=",
            "POST /category/questions_belong_to",
            "POST /category/update",
        ],
    }))
}

async fn chat_ask(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<AskRequest>,
) -> Result<impl IntoResponse> {
    let answer = service.ask(&req.user_id, &req.question).await?;
    Ok(Json(answer))
}

async fn chat_stream(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<AskRequest>,
) -> impl IntoResponse {
    let receiver = service.ask_stream(&req.user_id, &req.question).await;
    let chunks = stream::unfold(receiver, |mut receiver| async move {
        receiver
            .recv()
            .await
            .map(|chunk| (Ok::<Bytes, Infallible>(Bytes::from(chunk)), receiver))
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        StreamBody::new(chunks),
    )
}

async fn chat_most_relevant(
    State(service): State<Arc<ChatService>>,
    Query(query): Query<QuestionQuery>,
) -> Result<impl IntoResponse> {
    let best = service.most_relevant(&query.question).await?;
    Ok(Json(best))
}

async fn chat_history(
    State(service): State<Arc<ChatService>>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    Json(service.history(&query.user_id).await)
}

async fn chat_reset(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<UserQuery>,
) -> impl IntoResponse {
    Json(service.reset(&req.user_id).await)
}

async fn qa_list(State(service): State<Arc<ChatService>>) -> Result<impl IntoResponse> {
    Ok(Json(service.list_entries()?))
}

async fn qa_create(
    State(service): State<Arc<ChatService>>,
    Json(entry): Json<crate::dataset::QaEntry>,
) -> Result<impl IntoResponse> {
    Ok(Json(service.create_entry(entry).await?))
}

async fn qa_update(
    State(service): State<Arc<ChatService>>,
    Json(entry): Json<crate::dataset::QaEntry>,
) -> Result<impl IntoResponse> {
    Ok(Json(service.update_entry(entry).await?))
}

async fn qa_delete(
    State(service): State<Arc<ChatService>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    Ok(Json(service.delete_entry(id).await?))
}

async fn category_list(State(service): State<Arc<ChatService>>) -> Result<impl IntoResponse> {
    Ok(Json(service.categories()?))
}

async fn category_group_one(
    State(service): State<Arc<ChatService>>,
    Query(query): Query<QuestionQuery>,
) -> Result<impl IntoResponse> {
    Ok(Json(service.classify(&query.question).await?))
}

async fn category_group(State(service): State<Arc<ChatService>>) -> Result<impl IntoResponse> {
    Ok(Json(service.classify_dataset().await?))
}

async fn category_counts(State(service): State<Arc<ChatService>>) -> Result<impl IntoResponse> {
    Ok(Json(service.category_counts().await?))
}

async fn category_count(
    State(service): State<Arc<ChatService>>,
    Query(query): Query<CategoryQuery>,
) -> Result<impl IntoResponse> {
    Ok(Json(service.category_count(&query.category).await?))
}

async fn category_members(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<CategoryRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        service
            .questions_belonging_to(&req.category, &req.questions)
            .await?,
    ))
}

async fn category_update(
    State(service): State<Arc<ChatService>>,
    Json(req): Json<CategoryRequest>,
) -> Result<impl IntoResponse> {
    Ok(Json(service.add_category(&req.category)?))
}
