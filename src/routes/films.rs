use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{error::AppResult, middleware::CurrentUser, models::Film, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Handler for catalog search; films already on the caller's list are left out
pub async fn search(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<Film>>> {
    let listed = state.engine.listed_titles(user_id).await?;
    let films = state.search.search(&params.q, &listed).await?;
    Ok(Json(films))
}

/// Handler for clearing search results
pub async fn clear() -> Json<Vec<Film>> {
    Json(Vec::new())
}
