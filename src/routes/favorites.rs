use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, request_id::RequestId},
    models::{favorite::FavoriteInsert, JobId, JobStatus, UserFavorite},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    book_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    task_id: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<UserFavorite>>> {
    Ok(Json(state.favorites.list_favorites(user_id).await?))
}

pub async fn add(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(book_id): Path<String>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let outcome = state.favorites.add_favorite(user_id, &book_id).await?;
    let message = match outcome {
        FavoriteInsert::AlreadyPresent => "Book already in favorites",
        _ => "Book added to favorites",
    };
    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(book_id): Path<String>,
) -> AppResult<StatusCode> {
    state.favorites.remove_favorite(user_id, &book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /favorites` with `{"book_id": ...}`; same behavior as `add`
pub async fn create(
    state: State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<FavoriteRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    add(state, user, Path(request.book_id)).await
}

/// `DELETE /favorites/:book_id`; same behavior as `remove`
pub async fn destroy(
    state: State<Arc<AppState>>,
    user: AuthUser,
    book_id: Path<String>,
) -> AppResult<StatusCode> {
    remove(state, user, book_id).await
}

/// Queues a recommendation job and returns its handle
pub async fn recommendations(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    AuthUser(user_id): AuthUser,
) -> AppResult<(StatusCode, Json<Value>)> {
    let task_id = state.jobs.enqueue(user_id)?;
    tracing::info!(request_id = %request_id, user_id, task_id = %task_id, "Recommendations requested");
    Ok((StatusCode::ACCEPTED, Json(json!({ "task_id": task_id }))))
}

/// Resolves a job handle to its current status
///
/// A handle queued by another user is reported as not found.
pub async fn recommendation_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<StatusQuery>,
) -> AppResult<Response> {
    let raw = query
        .task_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidInput("No task_id provided".to_string()))?;
    let task_id = JobId::parse(&raw)
        .ok_or_else(|| AppError::InvalidInput(format!("Invalid task_id {}", raw)))?;

    let status = state.jobs.poll(&task_id, user_id);
    let code = match status {
        JobStatus::Processing => StatusCode::ACCEPTED,
        JobStatus::NotFound => StatusCode::NOT_FOUND,
        JobStatus::Done { .. } | JobStatus::Failed { .. } => StatusCode::OK,
    };
    Ok((code, Json(status)).into_response())
}
