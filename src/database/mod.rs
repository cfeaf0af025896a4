//! Storage contracts consumed by the review manager, and their SQLite implementation.
pub mod db;

use crate::error::Result;
use crate::models::{NoteSummary, ReviewState};
use chrono::{DateTime, Local};

/// Filter for listing an owner's review states.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewQuery {
    pub owner_id: String,
    /// Only states with `next_review_at <= due_by`.
    pub due_by: Option<DateTime<Local>>,
}

impl ReviewQuery {
    pub fn all(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            due_by: None,
        }
    }

    pub fn due_by(owner_id: &str, cutoff: DateTime<Local>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            due_by: Some(cutoff),
        }
    }
}

/// Persistence for review states, keyed by the note they track.
pub trait ReviewStore {
    fn get(&self, item_id: &str) -> Result<Option<ReviewState>>;

    /// Inserts a state with `version == 0`, otherwise updates the stored row only if its
    /// version still equals `state.version`. Returns the state as stored (version bumped).
    /// Losing a race fails with `ReviewError::Conflict`.
    fn upsert(&self, state: &ReviewState) -> Result<ReviewState>;

    /// Returns false when nothing was tracked for `item_id`.
    fn delete(&self, item_id: &str) -> Result<bool>;

    /// Ascending by `next_review_at`, insertion order for equal dates.
    fn query_by_owner(&self, query: &ReviewQuery) -> Result<Vec<ReviewState>>;
}

/// The note store, as seen by review tracking.
pub trait ContentStore {
    /// `None` when the note does not exist or belongs to someone else.
    fn find_item(&self, item_id: &str, owner_id: &str) -> Result<Option<NoteSummary>>;

    /// Deletes the note together with its review state.
    fn delete_cascade(&self, item_id: &str) -> Result<bool>;
}
