use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntryId, Film, FilmId, UserId};

/// A user's membership record for one film, carrying its 1-based position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct ListEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub film_id: FilmId,
    /// Position in the owner's list; dense 1..=n across the owner's entries
    pub order: i32,
    pub added_at: DateTime<Utc>,
}

/// A list entry joined with the film it references, as handed to renderers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListedFilm {
    pub entry_id: EntryId,
    pub order: i32,
    pub film_id: FilmId,
    pub title: String,
    pub image: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl ListedFilm {
    pub fn new(entry: &ListEntry, film: &Film) -> Self {
        Self {
            entry_id: entry.id,
            order: entry.order,
            film_id: film.id,
            title: film.title.clone(),
            image: film.image.clone(),
            added_at: entry.added_at,
        }
    }
}

/// Result of appending a film to a user's list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    pub entry: ListEntry,
    /// False when the film was already listed and `entry` is the existing row
    pub added: bool,
}

/// One atomic write against a user's entry set
///
/// `expected` is the id set the batch was computed from. The store applies
/// the optional delete and every order update together only while the user's
/// entries still match it, and otherwise changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBatch {
    pub expected: Vec<EntryId>,
    pub delete: Option<EntryId>,
    pub updates: Vec<(EntryId, i32)>,
}

impl OrderBatch {
    /// An empty batch against the given snapshot of a user's entries
    pub fn against(snapshot: &[ListEntry]) -> Self {
        let mut expected: Vec<EntryId> = snapshot.iter().map(|e| e.id).collect();
        expected.sort();
        Self {
            expected,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.delete.is_none() && self.updates.is_empty()
    }

    /// True when `current` holds exactly the ids this batch was computed from
    pub fn matches(&self, current: impl IntoIterator<Item = EntryId>) -> bool {
        let mut current: Vec<EntryId> = current.into_iter().collect();
        current.sort();
        current == self.expected
    }
}

/// Notification published after every successful list mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ListEvent {
    FilmAdded {
        user_id: UserId,
        entry: ListedFilm,
        /// True when the film was new to the catalog
        created: bool,
    },
    FilmRemoved {
        user_id: UserId,
        entry_id: EntryId,
        film_id: FilmId,
    },
    ListReordered {
        user_id: UserId,
        changed: usize,
    },
    ImageAttached {
        user_id: UserId,
        film_id: FilmId,
        image: String,
    },
}

impl ListEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            ListEvent::FilmAdded { user_id, .. }
            | ListEvent::FilmRemoved { user_id, .. }
            | ListEvent::ListReordered { user_id, .. }
            | ListEvent::ImageAttached { user_id, .. } => *user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ListEvent::FilmAdded { .. } => "film_added",
            ListEvent::FilmRemoved { .. } => "film_removed",
            ListEvent::ListReordered { .. } => "list_reordered",
            ListEvent::ImageAttached { .. } => "image_attached",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, order: i32) -> ListEntry {
        ListEntry {
            id: EntryId(id),
            user_id: UserId::new(),
            film_id: FilmId(id),
            order,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_batch() {
        assert!(OrderBatch::default().is_empty());

        let batch = OrderBatch {
            delete: Some(EntryId(1)),
            ..OrderBatch::default()
        };
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_batch_matches_only_its_snapshot() {
        let batch = OrderBatch::against(&[entry(3, 1), entry(1, 2)]);

        assert!(batch.matches([EntryId(1), EntryId(3)]));
        assert!(!batch.matches([EntryId(1)]));
        assert!(!batch.matches([EntryId(1), EntryId(3), EntryId(4)]));
    }

    #[test]
    fn test_list_event_serializes_with_tag() {
        let event = ListEvent::ListReordered {
            user_id: UserId::new(),
            changed: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "list_reordered");
        assert_eq!(json["changed"], 2);
        assert_eq!(event.kind(), "list_reordered");
    }
}
