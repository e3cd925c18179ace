pub mod catalog_search;
pub mod notifications;
pub mod ordering;

pub use catalog_search::CatalogSearch;
pub use notifications::ListEvents;
pub use ordering::{AddOutcome, ListOrderingEngine};
