//! Review tracking state for a single note, plus the listing and statistics shapes built from it.
use super::NoteSummary;
use super::sm2::{INITIAL_EASINESS, Schedule, Sm2Input};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One row of review tracking. At most one exists per note.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub id: String,
    pub item_id: String,
    pub owner_id: String,
    pub easiness_factor: f64,
    pub interval_days: i64,
    pub repetition_count: i64,
    pub next_review_at: DateTime<Local>,
    pub last_quality: Option<u8>,
    pub last_reviewed_at: Option<DateTime<Local>>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    /// Optimistic concurrency counter; 0 means "not stored yet".
    pub version: i64,
}

impl ReviewState {
    /// Fresh tracking state: due tomorrow, no history.
    pub fn new(item_id: &str, owner_id: &str, now: DateTime<Local>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            owner_id: owner_id.to_string(),
            easiness_factor: INITIAL_EASINESS,
            interval_days: 1,
            repetition_count: 0,
            next_review_at: super::sm2::add_days(&now, 1),
            last_quality: None,
            last_reviewed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn sm2_input(&self) -> Sm2Input {
        Sm2Input {
            easiness: self.easiness_factor,
            interval_days: self.interval_days,
            repetitions: self.repetition_count,
        }
    }

    /// Copies a computed schedule onto this state and records the submission.
    pub fn apply(&mut self, schedule: Schedule<Local>, now: DateTime<Local>) {
        self.easiness_factor = schedule.easiness;
        self.interval_days = schedule.interval_days;
        self.repetition_count = schedule.repetitions;
        self.next_review_at = schedule.next_review;
        self.last_quality = Some(schedule.quality);
        self.last_reviewed_at = Some(now);
        self.updated_at = now;
    }

    pub fn is_due(&self, cutoff: DateTime<Local>) -> bool {
        self.next_review_at <= cutoff
    }
}

/// A review state joined with the note it tracks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    #[serde(flatten)]
    pub state: ReviewState,
    pub note: NoteSummary,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub total_tracked: usize,
    pub due_today: usize,
    /// Sum of current streak lengths; a lapse erases a note's contribution.
    pub total_reviews_done: i64,
}
