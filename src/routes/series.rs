use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Series,
    routes::AppState,
};

pub async fn list(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Series>>> {
    Ok(Json(state.store.list_series().await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(series_id): Path<String>,
) -> AppResult<Json<Series>> {
    state
        .store
        .get_series(&series_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Series {}", series_id)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(_): AuthUser,
    Json(series): Json<Series>,
) -> AppResult<(StatusCode, Json<Series>)> {
    if series.series_id.trim().is_empty() {
        return Err(AppError::InvalidInput("series_id is required".to_string()));
    }
    let series = state.store.create_series(series).await?;
    Ok((StatusCode::CREATED, Json(series)))
}
