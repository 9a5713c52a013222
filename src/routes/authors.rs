use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Author,
    routes::AppState,
};

pub async fn list(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Author>>> {
    Ok(Json(state.store.list_authors().await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(author_id): Path<String>,
) -> AppResult<Json<Author>> {
    state
        .store
        .get_author(&author_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Author {}", author_id)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(author): Json<Author>,
) -> AppResult<(StatusCode, Json<Author>)> {
    if author.author_id.trim().is_empty() {
        return Err(AppError::InvalidInput("author_id is required".to_string()));
    }

    let author = state.store.create_author(author).await?;
    tracing::info!(user_id, author_id = %author.author_id, "Author created");
    Ok((StatusCode::CREATED, Json(author)))
}

/// Replaces an author; the path id wins over any id in the body
pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(author_id): Path<String>,
    Json(mut author): Json<Author>,
) -> AppResult<Json<Author>> {
    author.author_id = author_id;
    let author = state.store.update_author(author).await?;

    // Author names are part of every linked book's document.
    state.catalog_changed().await;
    tracing::info!(user_id, author_id = %author.author_id, "Author updated");
    Ok(Json(author))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(author_id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.store.delete_author(&author_id).await? {
        return Err(AppError::NotFound(format!("Author {}", author_id)));
    }

    state.catalog_changed().await;
    tracing::info!(user_id, author_id = %author_id, "Author deleted");
    Ok(StatusCode::NO_CONTENT)
}
