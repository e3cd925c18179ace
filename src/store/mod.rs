//! Persistence seams for the catalog, list memberships and poster images.
//!
//! Stores hold no business rules: ownership checks, title validation and the
//! dense ordering of a user's entries all live in
//! [`ListOrderingEngine`](crate::services::ListOrderingEngine).

use std::collections::HashSet;

use crate::{
    error::AppResult,
    models::{Appended, EntryId, Film, FilmId, FindOrCreate, ListEntry, OrderBatch, UserId},
};

pub mod images;
pub mod memory;
pub mod postgres;

pub use images::FsImageStore;
pub use memory::{InMemoryCatalog, InMemoryMembership};
pub use postgres::{PgCatalog, PgMembership};

/// Canonical film records shared by every user
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Exact, case-sensitive title lookup
    async fn find_by_title(&self, title: &str) -> AppResult<Option<Film>>;

    /// Returns the film with this exact title, inserting it if absent
    async fn find_or_create_by_title(&self, title: &str) -> AppResult<FindOrCreate>;

    async fn get(&self, id: FilmId) -> AppResult<Option<Film>>;

    /// Films for the given ids; missing ids are skipped
    async fn get_many(&self, ids: &[FilmId]) -> AppResult<Vec<Film>>;

    /// Case-insensitive substring match on title, excluding any title in
    /// `exclude`, ordered case-insensitively by title
    async fn search(
        &self,
        text: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> AppResult<Vec<Film>>;

    /// Records the stored image reference on the film
    async fn attach_image(&self, id: FilmId, image: &str) -> AppResult<Film>;
}

/// The user/film membership relation with its per-user order field
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MembershipStore: Send + Sync {
    /// Puts the film at the end of the user's list (`max(order) + 1`).
    ///
    /// The duplicate check and the position are decided under the same
    /// per-user write lock as [`apply`](Self::apply). A film that is already
    /// listed comes back with `added: false`.
    async fn append(&self, user_id: UserId, film_id: FilmId) -> AppResult<Appended>;

    async fn find(&self, id: EntryId) -> AppResult<Option<ListEntry>>;

    /// All entries owned by the user, sorted by order then id, read as one snapshot
    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<ListEntry>>;

    async fn find_by_user_and_film(
        &self,
        user_id: UserId,
        film_id: FilmId,
    ) -> AppResult<Option<ListEntry>>;

    /// Applies the delete and order updates atomically.
    ///
    /// Fails with `AppError::StoreConflict`, changing nothing, when the
    /// user's entry ids differ from `batch.expected` or a referenced entry no
    /// longer belongs to `user_id`.
    async fn apply(&self, user_id: UserId, batch: &OrderBatch) -> AppResult<()>;
}

/// Binary storage for poster images
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores the bytes and returns a reference relative to the media root
    async fn save(&self, film_id: FilmId, bytes: &[u8], filename: &str) -> AppResult<String>;
}

/// Sorts by order with id as the tie-breaker, the canonical list order
pub(crate) fn sort_entries(entries: &mut [ListEntry]) {
    entries.sort_by_key(|e| (e.order, e.id));
}
