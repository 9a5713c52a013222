use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::BookList,
    routes::AppState,
};

pub async fn list(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<BookList>>> {
    Ok(Json(state.store.list_lists().await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(list_id): Path<i64>,
) -> AppResult<Json<BookList>> {
    state
        .store
        .get_list(list_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("List {}", list_id)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(_): AuthUser,
    Json(list): Json<BookList>,
) -> AppResult<(StatusCode, Json<BookList>)> {
    for book_id in &list.book_ids {
        if state.store.get_book(book_id).await?.is_none() {
            return Err(AppError::InvalidInput(format!("Unknown book {}", book_id)));
        }
    }
    let list = state.store.create_list(list).await?;
    Ok((StatusCode::CREATED, Json(list)))
}
