use std::collections::HashSet;

use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{Appended, EntryId, Film, FilmId, FindOrCreate, ListEntry, OrderBatch, UserId},
};

use super::{CatalogStore, MembershipStore};

const FILM_COLUMNS: &str = "id, title, image, created_at";
const ENTRY_COLUMNS: &str = r#"id, user_id, film_id, "order", added_at"#;

/// Escapes LIKE wildcards so user text matches literally
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Catalog backed by the `films` table
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalog {
    async fn find_by_title(&self, title: &str) -> AppResult<Option<Film>> {
        let film = sqlx::query_as::<_, Film>(&format!(
            "SELECT {} FROM films WHERE title = $1",
            FILM_COLUMNS
        ))
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        Ok(film)
    }

    async fn find_or_create_by_title(&self, title: &str) -> AppResult<FindOrCreate> {
        // RETURNING yields no row when the title already exists
        let inserted = sqlx::query_as::<_, Film>(&format!(
            "INSERT INTO films (title) VALUES ($1) ON CONFLICT (title) DO NOTHING RETURNING {}",
            FILM_COLUMNS
        ))
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(film) = inserted {
            tracing::debug!(film_id = %film.id, title = %film.title, "Film created");
            return Ok(FindOrCreate {
                created: true,
                film,
            });
        }

        let film = self.find_by_title(title).await?.ok_or_else(|| {
            AppError::Internal(format!("Film '{}' vanished after insert conflict", title))
        })?;

        Ok(FindOrCreate {
            created: false,
            film,
        })
    }

    async fn get(&self, id: FilmId) -> AppResult<Option<Film>> {
        let film = sqlx::query_as::<_, Film>(&format!(
            "SELECT {} FROM films WHERE id = $1",
            FILM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(film)
    }

    async fn get_many(&self, ids: &[FilmId]) -> AppResult<Vec<Film>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let films = sqlx::query_as::<_, Film>(&format!(
            "SELECT {} FROM films WHERE id = ANY($1)",
            FILM_COLUMNS
        ))
        .bind(raw)
        .fetch_all(&self.pool)
        .await?;

        Ok(films)
    }

    async fn search(
        &self,
        text: &str,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> AppResult<Vec<Film>> {
        let excluded: Vec<String> = exclude.iter().cloned().collect();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let films = sqlx::query_as::<_, Film>(&format!(
            "SELECT {} FROM films \
             WHERE title ILIKE $1 AND NOT (title = ANY($2)) \
             ORDER BY LOWER(title), id \
             LIMIT $3",
            FILM_COLUMNS
        ))
        .bind(like_pattern(text))
        .bind(excluded)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(films)
    }

    async fn attach_image(&self, id: FilmId, image: &str) -> AppResult<Film> {
        sqlx::query_as::<_, Film>(&format!(
            "UPDATE films SET image = $2 WHERE id = $1 RETURNING {}",
            FILM_COLUMNS
        ))
        .bind(id)
        .bind(image)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Film {} does not exist", id)))
    }
}

/// Membership relation backed by the `list_entries` table
#[derive(Clone)]
pub struct PgMembership {
    pool: PgPool,
}

impl PgMembership {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Takes the user's write lock for the rest of the transaction and
    /// returns their entries
    ///
    /// The advisory lock also covers a user with no rows yet, which row locks
    /// alone cannot. Every process writing to this database serializes here.
    async fn lock_user(
        tx: &mut Transaction<'static, Postgres>,
        user_id: UserId,
    ) -> AppResult<Vec<ListEntry>> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        let entries = sqlx::query_as::<_, ListEntry>(&format!(
            r#"SELECT {} FROM list_entries WHERE user_id = $1 ORDER BY "order", id FOR UPDATE"#,
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(entries)
    }
}

#[async_trait::async_trait]
impl MembershipStore for PgMembership {
    async fn append(&self, user_id: UserId, film_id: FilmId) -> AppResult<Appended> {
        let mut tx = self.pool.begin().await?;
        let entries = Self::lock_user(&mut tx, user_id).await?;

        if let Some(existing) = entries.iter().find(|e| e.film_id == film_id) {
            tx.rollback().await?;
            return Ok(Appended {
                entry: existing.clone(),
                added: false,
            });
        }

        let order = entries.iter().map(|e| e.order).max().unwrap_or(0) + 1;
        let entry = sqlx::query_as::<_, ListEntry>(&format!(
            r#"INSERT INTO list_entries (user_id, film_id, "order") VALUES ($1, $2, $3) RETURNING {}"#,
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .bind(film_id)
        .bind(order)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Appended { entry, added: true })
    }

    async fn find(&self, id: EntryId) -> AppResult<Option<ListEntry>> {
        let entry = sqlx::query_as::<_, ListEntry>(&format!(
            "SELECT {} FROM list_entries WHERE id = $1",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<ListEntry>> {
        let entries = sqlx::query_as::<_, ListEntry>(&format!(
            r#"SELECT {} FROM list_entries WHERE user_id = $1 ORDER BY "order", id"#,
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn find_by_user_and_film(
        &self,
        user_id: UserId,
        film_id: FilmId,
    ) -> AppResult<Option<ListEntry>> {
        let entry = sqlx::query_as::<_, ListEntry>(&format!(
            "SELECT {} FROM list_entries WHERE user_id = $1 AND film_id = $2",
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .bind(film_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn apply(&self, user_id: UserId, batch: &OrderBatch) -> AppResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let entries = Self::lock_user(&mut tx, user_id).await?;

        if !batch.matches(entries.iter().map(|e| e.id)) {
            tx.rollback().await?;
            return Err(AppError::StoreConflict(
                "List changed since it was read".to_string(),
            ));
        }

        let owned: HashSet<EntryId> = entries.iter().map(|e| e.id).collect();
        if let Some(stale) = batch
            .delete
            .iter()
            .chain(batch.updates.iter().map(|(id, _)| id))
            .find(|id| !owned.contains(*id))
        {
            tx.rollback().await?;
            return Err(AppError::StoreConflict(format!(
                "Entry {} is no longer in the list",
                stale
            )));
        }

        if let Some(id) = batch.delete {
            sqlx::query("DELETE FROM list_entries WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if !batch.updates.is_empty() {
            let (ids, orders): (Vec<i64>, Vec<i32>) =
                batch.updates.iter().map(|(id, order)| (id.0, *order)).unzip();

            sqlx::query(
                r#"UPDATE list_entries AS e SET "order" = u.ord
                   FROM UNNEST($1::BIGINT[], $2::INTEGER[]) AS u(id, ord)
                   WHERE e.id = u.id AND e.user_id = $3"#,
            )
            .bind(ids)
            .bind(orders)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
