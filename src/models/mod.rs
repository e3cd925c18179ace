use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

pub mod film;
pub mod list_entry;

pub use film::{normalize_title, Film, FindOrCreate, MAX_TITLE_LEN};
pub use list_entry::{Appended, ListEntry, ListEvent, ListedFilm, OrderBatch};

/// Opaque identity of an authenticated user, supplied by the upstream auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog identifier for a film
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct FilmId(pub i64);

impl Display for FilmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one list entry (a user's membership record for a film)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EntryId(pub i64);

impl Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&EntryId(42)).unwrap();
        assert_eq!(json, "42");

        let parsed: EntryId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, EntryId(7));
    }

    #[test]
    fn test_user_id_serializes_as_uuid_string() {
        let raw = Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
        let json = serde_json::to_string(&UserId(raw)).unwrap();
        assert_eq!(json, r#""123e4567-e89b-12d3-a456-426614174000""#);
    }

    #[test]
    fn test_ids_display_inner_value() {
        assert_eq!(format!("{}", FilmId(3)), "3");
        assert_eq!(format!("{}", EntryId(11)), "11");
    }
}
