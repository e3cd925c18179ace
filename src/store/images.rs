use std::path::PathBuf;

use crate::{
    error::{AppError, AppResult},
    models::FilmId,
};

use super::ImageStore;

/// Subdirectory of the media root that poster images are written to
pub const IMAGE_DIR: &str = "film_images";

/// Stores poster images as files under a media root
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Reduces an uploaded file name to a safe single path component
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait::async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, film_id: FilmId, bytes: &[u8], filename: &str) -> AppResult<String> {
        if bytes.is_empty() {
            return Err(AppError::InvalidInput("Image must not be empty".to_string()));
        }

        let name = format!("{}_{}", film_id, sanitize_filename(filename));
        let dir = self.root.join(IMAGE_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), bytes).await?;

        let reference = format!("{}/{}", IMAGE_DIR, name);
        tracing::info!(film_id = %film_id, image = %reference, size = bytes.len(), "Stored poster image");

        Ok(reference)
    }
}
