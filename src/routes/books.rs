use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Book, BookQuery},
    routes::AppState,
};

/// Lists books, optionally filtered by `?search=` on title or author name
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Vec<Book>>> {
    Ok(Json(state.store.list_books(query.search).await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
) -> AppResult<Json<Book>> {
    state
        .store
        .get_book(&book_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Book {}", book_id)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(book): Json<Book>,
) -> AppResult<(StatusCode, Json<Book>)> {
    validate(&state, &book).await?;

    let book = state.store.create_book(book).await?;
    state.catalog_changed().await;

    tracing::info!(user_id, book_id = %book.book_id, "Book created");
    Ok((StatusCode::CREATED, Json(book)))
}

/// Replaces a book; the path id wins over any id in the body
pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(book_id): Path<String>,
    Json(mut book): Json<Book>,
) -> AppResult<Json<Book>> {
    book.book_id = book_id;
    validate(&state, &book).await?;

    let book = state.store.update_book(book).await?;
    state.catalog_changed().await;

    tracing::info!(user_id, book_id = %book.book_id, "Book updated");
    Ok(Json(book))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(book_id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.store.delete_book(&book_id).await? {
        return Err(AppError::NotFound(format!("Book {}", book_id)));
    }
    state.catalog_changed().await;

    tracing::info!(user_id, book_id = %book_id, "Book deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn validate(state: &AppState, book: &Book) -> AppResult<()> {
    if book.book_id.trim().is_empty() {
        return Err(AppError::InvalidInput("book_id is required".to_string()));
    }
    if book.author_ids.is_empty() {
        return Err(AppError::InvalidInput(
            "A book needs at least one author".to_string(),
        ));
    }
    for author_id in &book.author_ids {
        if state.store.get_author(author_id).await?.is_none() {
            return Err(AppError::InvalidInput(format!("Unknown author {}", author_id)));
        }
    }
    if let Some(series_id) = &book.series_id {
        if state.store.get_series(series_id).await?.is_none() {
            return Err(AppError::InvalidInput(format!("Unknown series {}", series_id)));
        }
    }
    Ok(())
}
