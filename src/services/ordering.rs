//! Per-user ordered watchlists.
//!
//! Every user's entries carry an `order` field that forms the dense run
//! `1..=n` after each completed operation, and each film appears at most once
//! per user. Mutations for one user are serialized through a per-user lock;
//! different users never contend. Each mutation is persisted as one
//! [`OrderBatch`], so a reader sees either the old list or the new one.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::{
    error::{AppError, AppResult},
    models::{
        normalize_title, Appended, EntryId, Film, FilmId, FindOrCreate, ListEntry, ListEvent,
        ListedFilm, OrderBatch, UserId,
    },
    services::notifications::ListEvents,
    store::{CatalogStore, ImageStore, MembershipStore},
};

/// Idle per-user locks are pruned once the map grows past this size
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Outcome of adding a film to a list
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub entry: ListedFilm,
    /// False when the film was already on the list and nothing changed
    pub added: bool,
    /// True when the film did not exist in the catalog before this call
    pub created_film: bool,
}

/// Lazily created async mutex per user
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Order updates that turn `entries` (already in their target sequence) into
/// the run `1..=n`, skipping entries that already hold the right position
fn dense_updates<'a>(entries: impl IntoIterator<Item = &'a ListEntry>) -> Vec<(EntryId, i32)> {
    entries
        .into_iter()
        .zip(1..)
        .filter(|(entry, position)| entry.order != *position)
        .map(|(entry, position)| (entry.id, position))
        .collect()
}

/// Maintains each user's dense, duplicate-free film ordering
pub struct ListOrderingEngine {
    catalog: Arc<dyn CatalogStore>,
    membership: Arc<dyn MembershipStore>,
    images: Arc<dyn ImageStore>,
    events: ListEvents,
    locks: UserLocks,
}

impl ListOrderingEngine {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        membership: Arc<dyn MembershipStore>,
        images: Arc<dyn ImageStore>,
        events: ListEvents,
    ) -> Self {
        Self {
            catalog,
            membership,
            images,
            events,
            locks: UserLocks::default(),
        }
    }

    pub fn events(&self) -> &ListEvents {
        &self.events
    }

    /// Adds the film with this title to the end of the user's list.
    ///
    /// The film is created in the catalog if needed. Adding a film that is
    /// already listed returns the existing entry unchanged.
    pub async fn add_film(&self, user_id: UserId, title: &str) -> AppResult<AddOutcome> {
        let title = normalize_title(title)?;
        let FindOrCreate { created, film } = self.catalog.find_or_create_by_title(&title).await?;

        let _guard = self.locks.lock(user_id).await;

        let Appended { entry, added } = match self
            .membership
            .find_by_user_and_film(user_id, film.id)
            .await?
        {
            Some(existing) => Appended {
                entry: existing,
                added: false,
            },
            None => self.membership.append(user_id, film.id).await?,
        };
        let listed = ListedFilm::new(&entry, &film);

        if !added {
            tracing::debug!(
                user_id = %user_id,
                entry_id = %entry.id,
                title = %film.title,
                "Film already listed"
            );
            return Ok(AddOutcome {
                entry: listed,
                added: false,
                created_film: created,
            });
        }

        tracing::info!(
            user_id = %user_id,
            entry_id = %entry.id,
            title = %film.title,
            order = entry.order,
            "Film added"
        );

        self.events.publish(ListEvent::FilmAdded {
            user_id,
            entry: listed.clone(),
            created,
        });

        Ok(AddOutcome {
            entry: listed,
            added: true,
            created_film: created,
        })
    }

    /// Removes an entry and closes the gap it leaves.
    ///
    /// Returns the remaining list in order.
    pub async fn remove_film(&self, user_id: UserId, entry_id: EntryId) -> AppResult<Vec<ListedFilm>> {
        let _guard = self.locks.lock(user_id).await;

        let removed = self
            .retry_on_conflict("remove", move || self.try_remove(user_id, entry_id))
            .await?;

        self.events.publish(ListEvent::FilmRemoved {
            user_id,
            entry_id,
            film_id: removed.film_id,
        });

        self.get_list(user_id).await
    }

    async fn try_remove(&self, user_id: UserId, entry_id: EntryId) -> AppResult<ListEntry> {
        let removed = self.owned_entry(user_id, entry_id).await?;

        let entries = self.membership.find_by_user(user_id).await?;
        let updates = dense_updates(entries.iter().filter(|e| e.id != entry_id));

        tracing::debug!(
            user_id = %user_id,
            entry_id = %entry_id,
            removed_order = removed.order,
            shifted = updates.len(),
            "Removing entry"
        );

        let batch = OrderBatch {
            delete: Some(entry_id),
            updates,
            ..OrderBatch::against(&entries)
        };
        self.membership.apply(user_id, &batch).await?;

        Ok(removed)
    }

    /// Reorders the list so `ordered` occupies positions `1..=len`.
    ///
    /// Entries missing from `ordered` keep their relative order after the
    /// given ones, so the result is always a dense run.
    pub async fn bulk_reorder(
        &self,
        user_id: UserId,
        ordered: &[EntryId],
    ) -> AppResult<Vec<ListedFilm>> {
        if ordered.is_empty() {
            return Err(AppError::InvalidInput(
                "Reorder requires at least one entry".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(ordered.len());
        if let Some(duplicate) = ordered.iter().find(|id| !seen.insert(**id)) {
            return Err(AppError::InvalidInput(format!(
                "Entry {} appears more than once",
                duplicate
            )));
        }

        let _guard = self.locks.lock(user_id).await;

        let changed = self
            .retry_on_conflict("reorder", move || self.try_reorder(user_id, ordered))
            .await?;

        tracing::info!(
            user_id = %user_id,
            requested = ordered.len(),
            changed,
            "List reordered"
        );

        self.events
            .publish(ListEvent::ListReordered { user_id, changed });

        self.get_list(user_id).await
    }

    async fn try_reorder(&self, user_id: UserId, ordered: &[EntryId]) -> AppResult<usize> {
        let entries = self.membership.find_by_user(user_id).await?;
        let by_id: HashMap<EntryId, &ListEntry> = entries.iter().map(|e| (e.id, e)).collect();

        let mut sequence = Vec::with_capacity(entries.len());
        for id in ordered {
            let entry = by_id.get(id).ok_or_else(|| {
                AppError::InvalidReference(format!("Entry {} is not in this list", id))
            })?;
            sequence.push(*entry);
        }

        let mentioned: HashSet<EntryId> = ordered.iter().copied().collect();
        let unmentioned = entries.iter().filter(|e| !mentioned.contains(&e.id));
        if entries.len() > ordered.len() {
            tracing::warn!(
                user_id = %user_id,
                requested = ordered.len(),
                total = entries.len(),
                "Partial reorder, appending unmentioned entries"
            );
        }
        sequence.extend(unmentioned);

        let updates = dense_updates(sequence);
        let changed = updates.len();

        if changed > 0 {
            let batch = OrderBatch {
                updates,
                ..OrderBatch::against(&entries)
            };
            self.membership.apply(user_id, &batch).await?;
        }

        Ok(changed)
    }

    /// The user's list sorted by order, joined with film details
    pub async fn get_list(&self, user_id: UserId) -> AppResult<Vec<ListedFilm>> {
        let entries = self.membership.find_by_user(user_id).await?;
        let film_ids: Vec<FilmId> = entries.iter().map(|e| e.film_id).collect();
        let films: HashMap<FilmId, Film> = self
            .catalog
            .get_many(&film_ids)
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        entries
            .iter()
            .map(|entry| {
                films
                    .get(&entry.film_id)
                    .map(|film| ListedFilm::new(entry, film))
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Entry {} references missing film {}",
                            entry.id, entry.film_id
                        ))
                    })
            })
            .collect()
    }

    /// Titles currently on the user's list
    pub async fn listed_titles(&self, user_id: UserId) -> AppResult<HashSet<String>> {
        Ok(self
            .get_list(user_id)
            .await?
            .into_iter()
            .map(|listed| listed.title)
            .collect())
    }

    /// One entry of the user's list with its film details
    pub async fn entry_detail(&self, user_id: UserId, entry_id: EntryId) -> AppResult<ListedFilm> {
        let entry = self.owned_entry(user_id, entry_id).await?;
        let film = self.film(entry.film_id).await?;
        Ok(ListedFilm::new(&entry, &film))
    }

    /// Stores a poster image for the film behind one of the user's entries
    pub async fn attach_image(
        &self,
        user_id: UserId,
        entry_id: EntryId,
        bytes: &[u8],
        filename: &str,
    ) -> AppResult<ListedFilm> {
        if filename.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Image filename must not be empty".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(AppError::InvalidInput("Image must not be empty".to_string()));
        }

        let entry = self.owned_entry(user_id, entry_id).await?;
        let reference = self.images.save(entry.film_id, bytes, filename).await?;
        let film = self.catalog.attach_image(entry.film_id, &reference).await?;

        self.events.publish(ListEvent::ImageAttached {
            user_id,
            film_id: film.id,
            image: reference,
        });

        Ok(ListedFilm::new(&entry, &film))
    }

    /// Loads an entry, failing if it is absent or owned by someone else
    async fn owned_entry(&self, user_id: UserId, entry_id: EntryId) -> AppResult<ListEntry> {
        let entry = self
            .membership
            .find(entry_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Entry {} does not exist", entry_id)))?;

        if entry.user_id != user_id {
            tracing::warn!(
                user_id = %user_id,
                entry_id = %entry_id,
                "Rejected access to another user's entry"
            );
            return Err(AppError::Forbidden(format!(
                "Entry {} belongs to another user",
                entry_id
            )));
        }

        Ok(entry)
    }

    async fn film(&self, film_id: FilmId) -> AppResult<Film> {
        self.catalog
            .get(film_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Film {} does not exist", film_id)))
    }

    /// Runs `op`, and once more against fresh state if the store reports a
    /// stale entry set. A second stale result surfaces as `Conflict`.
    async fn retry_on_conflict<T, F, Fut>(&self, operation: &'static str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match op().await {
            Err(AppError::StoreConflict(reason)) => {
                tracing::warn!(operation, reason = %reason, "Stale list state, retrying");
                match op().await {
                    Err(AppError::StoreConflict(reason)) => Err(AppError::Conflict(reason)),
                    other => other,
                }
            }
            other => other,
        }
    }
}
