use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    middleware::{CurrentUser, RequestId},
    models::{EntryId, ListedFilm},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AddFilmRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub entry_ids: Vec<EntryId>,
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub filename: String,
}

/// The caller's list, in order, for re-rendering
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub films: Vec<ListedFilm>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddFilmResponse {
    pub entry: ListedFilm,
    /// False when the film was already listed
    pub added: bool,
    /// True when the film was new to the catalog
    pub created: bool,
    pub message: String,
    pub films: Vec<ListedFilm>,
}

/// Handler for reading the caller's list
pub async fn get_list(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<ListResponse>> {
    let films = state.engine.get_list(user_id).await?;
    Ok(Json(ListResponse { films }))
}

/// Handler for adding a film by title
pub async fn add_film(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<AddFilmRequest>,
) -> AppResult<(StatusCode, Json<AddFilmResponse>)> {
    tracing::info!(request_id = %request_id, user_id = %user_id, "Processing add film request");

    let outcome = state.engine.add_film(user_id, &request.title).await?;
    let films = state.engine.get_list(user_id).await?;

    let (status, message) = if outcome.added {
        (
            StatusCode::CREATED,
            format!("Added {} to list", outcome.entry.title),
        )
    } else {
        (
            StatusCode::OK,
            format!("{} is already on your list", outcome.entry.title),
        )
    };

    Ok((
        status,
        Json(AddFilmResponse {
            entry: outcome.entry,
            added: outcome.added,
            created: outcome.created_film,
            message,
            films,
        }),
    ))
}

/// Handler for removing an entry from the caller's list
pub async fn remove_entry(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CurrentUser(user_id): CurrentUser,
    Path(entry_id): Path<EntryId>,
) -> AppResult<Json<ListResponse>> {
    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        entry_id = %entry_id,
        "Processing remove request"
    );

    let films = state.engine.remove_film(user_id, entry_id).await?;
    Ok(Json(ListResponse { films }))
}

/// Handler for reordering the caller's list
pub async fn reorder(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<ReorderRequest>,
) -> AppResult<Json<ListResponse>> {
    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        entry_count = request.entry_ids.len(),
        "Processing reorder request"
    );

    let films = state.engine.bulk_reorder(user_id, &request.entry_ids).await?;
    Ok(Json(ListResponse { films }))
}

/// Handler for a single entry's details
pub async fn entry_detail(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(entry_id): Path<EntryId>,
) -> AppResult<Json<ListedFilm>> {
    let listed = state.engine.entry_detail(user_id, entry_id).await?;
    Ok(Json(listed))
}

/// Handler for uploading a poster image; the request body is the raw image
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CurrentUser(user_id): CurrentUser,
    Path(entry_id): Path<EntryId>,
    Query(query): Query<ImageQuery>,
    body: Bytes,
) -> AppResult<Json<ListedFilm>> {
    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        entry_id = %entry_id,
        size = body.len(),
        "Processing image upload"
    );

    let listed = state
        .engine
        .attach_image(user_id, entry_id, &body, &query.filename)
        .await?;
    Ok(Json(listed))
}
