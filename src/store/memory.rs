use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{Appended, EntryId, Film, FilmId, FindOrCreate, ListEntry, OrderBatch, UserId},
};

use super::{sort_entries, CatalogStore, MembershipStore};

/// Process-local catalog
#[derive(Default)]
pub struct InMemoryCatalog {
    inner: RwLock<CatalogInner>,
}

#[derive(Default)]
struct CatalogInner {
    films: BTreeMap<FilmId, Film>,
    by_title: HashMap<String, FilmId>,
    next_id: i64,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn find_by_title(&self, title: &str) -> AppResult<Option<Film>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_title
            .get(title)
            .and_then(|id| inner.films.get(id))
            .cloned())
    }

    async fn find_or_create_by_title(&self, title: &str) -> AppResult<FindOrCreate> {
        let mut inner = self.inner.write().await;

        if let Some(film) = inner.by_title.get(title).and_then(|id| inner.films.get(id)) {
            return Ok(FindOrCreate {
                created: false,
                film: film.clone(),
            });
        }

        inner.next_id += 1;
        let film = Film {
            id: FilmId(inner.next_id),
            title: title.to_string(),
            image: None,
            created_at: Utc::now(),
        };
        inner.by_title.insert(film.title.clone(), film.id);
        inner.films.insert(film.id, film.clone());

        Ok(FindOrCreate {
            created: true,
            film,
        })
    }

    async fn get(&self, id: FilmId) -> AppResult<Option<Film>> {
        Ok(self.inner.read().await.films.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[FilmId]) -> AppResult<Vec<Film>> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.films.get(id)).cloned().collect())
    }

    async fn search(
        &self,
        text: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> AppResult<Vec<Film>> {
        let needle = text.to_lowercase();
        let inner = self.inner.read().await;

        let mut matches: Vec<Film> = inner
            .films
            .values()
            .filter(|film| film.title.to_lowercase().contains(&needle))
            .filter(|film| !exclude.contains(&film.title))
            .cloned()
            .collect();

        matches.sort_by_key(|film| (film.sort_key(), film.id));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn attach_image(&self, id: FilmId, image: &str) -> AppResult<Film> {
        let mut inner = self.inner.write().await;
        let film = inner
            .films
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Film {} does not exist", id)))?;
        film.image = Some(image.to_string());
        Ok(film.clone())
    }
}

/// Process-local membership relation
///
/// A whole [`OrderBatch`] is applied under one write lock, so readers never
/// observe a half-renumbered list.
#[derive(Default)]
pub struct InMemoryMembership {
    inner: RwLock<MembershipInner>,
}

#[derive(Default)]
struct MembershipInner {
    entries: HashMap<EntryId, ListEntry>,
    next_id: i64,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MembershipStore for InMemoryMembership {
    async fn append(&self, user_id: UserId, film_id: FilmId) -> AppResult<Appended> {
        let mut inner = self.inner.write().await;

        let owned = inner.entries.values().filter(|e| e.user_id == user_id);
        let mut last = 0;
        for entry in owned {
            if entry.film_id == film_id {
                return Ok(Appended {
                    entry: entry.clone(),
                    added: false,
                });
            }
            last = last.max(entry.order);
        }

        inner.next_id += 1;
        let entry = ListEntry {
            id: EntryId(inner.next_id),
            user_id,
            film_id,
            order: last + 1,
            added_at: Utc::now(),
        };
        inner.entries.insert(entry.id, entry.clone());

        Ok(Appended { entry, added: true })
    }

    async fn find(&self, id: EntryId) -> AppResult<Option<ListEntry>> {
        Ok(self.inner.read().await.entries.get(&id).cloned())
    }

    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<ListEntry>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<ListEntry> = inner
            .entries
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn find_by_user_and_film(
        &self,
        user_id: UserId,
        film_id: FilmId,
    ) -> AppResult<Option<ListEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .values()
            .find(|e| e.user_id == user_id && e.film_id == film_id)
            .cloned())
    }

    async fn apply(&self, user_id: UserId, batch: &OrderBatch) -> AppResult<()> {
        let mut inner = self.inner.write().await;

        let current = inner
            .entries
            .values()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.id);
        if !batch.matches(current) {
            return Err(AppError::StoreConflict(
                "List changed since it was read".to_string(),
            ));
        }

        let owned = |id: &EntryId| {
            inner
                .entries
                .get(id)
                .is_some_and(|e| e.user_id == user_id)
        };
        if let Some(stale) = batch
            .delete
            .iter()
            .chain(batch.updates.iter().map(|(id, _)| id))
            .copied()
            .find(|id| !owned(id))
        {
            return Err(AppError::StoreConflict(format!(
                "Entry {} is no longer in the list",
                stale
            )));
        }

        if let Some(id) = batch.delete {
            inner.entries.remove(&id);
        }
        for (id, order) in &batch.updates {
            if let Some(entry) = inner.entries.get_mut(id) {
                entry.order = *order;
            }
        }

        Ok(())
    }
}
