use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

use super::FilmId;

/// Longest title the catalog accepts, in characters
pub const MAX_TITLE_LEN: usize = 128;

/// A film in the shared catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Film {
    pub id: FilmId,
    /// Unique across the catalog (exact match)
    pub title: String,
    /// Reference to the stored poster image, relative to the media root
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Film {
    /// Sort key used for catalog listings and search results
    pub fn sort_key(&self) -> String {
        self.title.to_lowercase()
    }
}

/// Result of a get-or-create lookup on the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct FindOrCreate {
    /// True when this call inserted the film
    pub created: bool,
    pub film: Film,
}

/// Trims a user-supplied title and checks it is usable as a catalog key
pub fn normalize_title(raw: &str) -> AppResult<String> {
    let title = raw.trim();

    if title.is_empty() {
        return Err(AppError::InvalidInput("Title must not be empty".to_string()));
    }

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::InvalidInput(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }

    Ok(title.to_string())
}
