//! Review lifecycle management.
//! Opts notes in and out of review, applies SM-2 results to stored state and answers
//! due-set and statistics queries.

use super::sm2::{self, end_of_day};
use super::{Clock, ReviewEntry, ReviewState, ReviewStats};
use crate::database::{ContentStore, ReviewQuery, ReviewStore};
use crate::error::{Result, ReviewError};
use chrono::{DateTime, Local, SubsecRound};

/// Read-modify-write attempts before a conflict is surfaced.
const MAX_ATTEMPTS: usize = 2;

/// Orchestrates review state for one caller-supplied owner at a time.
/// All dependencies are passed in; the manager itself holds no state.
pub struct ReviewManager<'a> {
    reviews: &'a dyn ReviewStore,
    content: &'a dyn ContentStore,
    clock: &'a dyn Clock,
}

impl<'a> ReviewManager<'a> {
    pub fn new(
        reviews: &'a dyn ReviewStore,
        content: &'a dyn ContentStore,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            reviews,
            content,
            clock,
        }
    }

    /// Storage keeps millisecond precision, so the clock is read at that precision too.
    fn now(&self) -> DateTime<Local> {
        self.clock.now().trunc_subsecs(3)
    }

    /// Starts tracking a note. Returns the existing state unchanged if it is already tracked.
    pub fn enable_review(&self, owner_id: &str, item_id: &str) -> Result<ReviewState> {
        if self.content.find_item(item_id, owner_id)?.is_none() {
            return Err(ReviewError::NotFound(format!("note {item_id} not found")));
        }

        self.with_retry(item_id, || {
            if let Some(existing) = self.reviews.get(item_id)? {
                return Ok(existing);
            }
            let created = self
                .reviews
                .upsert(&ReviewState::new(item_id, owner_id, self.now()))?;
            tracing::info!(note_id = item_id, owner_id, "Review enabled");
            Ok(created)
        })
    }

    /// Stops tracking a note and discards its review history.
    pub fn disable_review(&self, owner_id: &str, item_id: &str) -> Result<()> {
        if self.owned_state(owner_id, item_id)?.is_none() || !self.reviews.delete(item_id)? {
            return Err(ReviewError::NotFound(format!(
                "review for note {item_id} not found"
            )));
        }
        tracing::info!(note_id = item_id, owner_id, "Review disabled");
        Ok(())
    }

    /// Records a quality score (0-5) and reschedules the note.
    pub fn submit_review(&self, owner_id: &str, item_id: &str, quality: i64) -> Result<ReviewState> {
        self.with_retry(item_id, || {
            let mut state = self.owned_state(owner_id, item_id)?.ok_or_else(|| {
                ReviewError::NotFound(format!("review not enabled for note {item_id}"))
            })?;

            let now = self.now();
            let schedule = sm2::compute(quality, &state.sm2_input(), &now)?;
            state.apply(schedule, now);

            let stored = self.reviews.upsert(&state)?;
            tracing::info!(
                note_id = item_id,
                quality,
                interval_days = stored.interval_days,
                repetitions = stored.repetition_count,
                easiness = stored.easiness_factor,
                "Review submitted"
            );
            Ok(stored)
        })
    }

    /// Notes due by the end of today, most overdue first.
    pub fn get_due_today(&self, owner_id: &str) -> Result<Vec<ReviewEntry>> {
        let cutoff = end_of_day(&self.now());
        let states = self
            .reviews
            .query_by_owner(&ReviewQuery::due_by(owner_id, cutoff))?;
        self.join_notes(owner_id, states)
    }

    /// `None` means the note is not in review, which is not an error.
    pub fn get_review_status(&self, owner_id: &str, item_id: &str) -> Result<Option<ReviewState>> {
        self.owned_state(owner_id, item_id)
    }

    pub fn get_stats(&self, owner_id: &str) -> Result<ReviewStats> {
        let cutoff = end_of_day(&self.now());
        let states = self.reviews.query_by_owner(&ReviewQuery::all(owner_id))?;

        Ok(ReviewStats {
            total_tracked: states.len(),
            due_today: states.iter().filter(|s| s.is_due(cutoff)).count(),
            total_reviews_done: states.iter().map(|s| s.repetition_count).sum(),
        })
    }

    /// Every tracked note of the owner, soonest review first.
    pub fn get_all_reviews(&self, owner_id: &str) -> Result<Vec<ReviewEntry>> {
        let states = self.reviews.query_by_owner(&ReviewQuery::all(owner_id))?;
        self.join_notes(owner_id, states)
    }

    fn owned_state(&self, owner_id: &str, item_id: &str) -> Result<Option<ReviewState>> {
        Ok(self
            .reviews
            .get(item_id)?
            .filter(|state| state.owner_id == owner_id))
    }

    fn join_notes(&self, owner_id: &str, states: Vec<ReviewState>) -> Result<Vec<ReviewEntry>> {
        let mut entries = Vec::with_capacity(states.len());
        for state in states {
            // A note deleted between the two reads is skipped, its review row goes with it
            match self.content.find_item(&state.item_id, owner_id)? {
                Some(note) => entries.push(ReviewEntry { state, note }),
                None => tracing::debug!(note_id = %state.item_id, "Skipping review of missing note"),
            }
        }
        Ok(entries)
    }

    /// Runs a read-modify-write, re-reading once if another writer got there first.
    fn with_retry<T>(&self, item_id: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(ReviewError::Conflict(reason)) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(note_id = item_id, %reason, "Concurrent review update, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::db::Database;
    use crate::models::sm2::add_days;
    use crate::models::{FixedClock, Note, NoteSummary};
    use chrono::{TimeDelta, TimeZone, Timelike};
    use serde_json::json;
    use std::cell::Cell;

    fn morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 4, 8, 9, 15, 30).unwrap()
    }

    fn note(db: &Database, owner: &str, title: &str) -> Note {
        db.create_note(owner, title, json!({"type": "doc"}), Some("test"), morning())
            .unwrap()
    }

    /// Forces the next `conflicts` upserts to fail as if another writer won the race.
    struct Contended<'a> {
        inner: &'a Database,
        conflicts: Cell<usize>,
        upserts: Cell<usize>,
    }

    impl<'a> Contended<'a> {
        fn new(inner: &'a Database, conflicts: usize) -> Self {
            Self {
                inner,
                conflicts: Cell::new(conflicts),
                upserts: Cell::new(0),
            }
        }
    }

    impl ReviewStore for Contended<'_> {
        fn get(&self, item_id: &str) -> Result<Option<ReviewState>> {
            self.inner.get(item_id)
        }

        fn upsert(&self, state: &ReviewState) -> Result<ReviewState> {
            self.upserts.set(self.upserts.get() + 1);
            if self.conflicts.get() > 0 {
                self.conflicts.set(self.conflicts.get() - 1);
                return Err(ReviewError::Conflict("simulated".to_string()));
            }
            self.inner.upsert(state)
        }

        fn delete(&self, item_id: &str) -> Result<bool> {
            self.inner.delete(item_id)
        }

        fn query_by_owner(&self, query: &ReviewQuery) -> Result<Vec<ReviewState>> {
            self.inner.query_by_owner(query)
        }
    }

    /// Lets another writer insert its own row just before our first insert goes through.
    struct RacingInsert<'a> {
        inner: &'a Database,
        rival: ReviewState,
        raced: Cell<bool>,
    }

    impl ReviewStore for RacingInsert<'_> {
        fn get(&self, item_id: &str) -> Result<Option<ReviewState>> {
            self.inner.get(item_id)
        }

        fn upsert(&self, state: &ReviewState) -> Result<ReviewState> {
            if state.version == 0 && !self.raced.replace(true) {
                self.inner.upsert(&self.rival)?;
            }
            self.inner.upsert(state)
        }

        fn delete(&self, item_id: &str) -> Result<bool> {
            self.inner.delete(item_id)
        }

        fn query_by_owner(&self, query: &ReviewQuery) -> Result<Vec<ReviewState>> {
            self.inner.query_by_owner(query)
        }
    }

    #[test]
    fn test_enable_creates_initial_state() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");

        let state = manager.enable_review("alice", &n.id).unwrap();

        assert_eq!(state.item_id, n.id);
        assert_eq!(state.easiness_factor, 2.5);
        assert_eq!(state.interval_days, 1);
        assert_eq!(state.repetition_count, 0);
        assert_eq!(state.next_review_at, add_days(&morning(), 1));
        assert_eq!(state.last_quality, None);
        assert_eq!(state.last_reviewed_at, None);
    }

    #[test]
    fn test_enable_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");

        let first = manager.enable_review("alice", &n.id).unwrap();
        assert_eq!(manager.enable_review("alice", &n.id).unwrap(), first);

        manager.submit_review("alice", &n.id, 4).unwrap();
        manager.submit_review("alice", &n.id, 4).unwrap();
        clock.advance_days(3);

        let again = manager.enable_review("alice", &n.id).unwrap();
        assert_eq!(again.repetition_count, 2);
        assert_eq!(again.interval_days, 6);
        assert_eq!(Some(again), manager.get_review_status("alice", &n.id).unwrap());
    }

    #[test]
    fn test_enable_returns_winner_after_lost_insert_race() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let n = note(&db, "alice", "a");

        let mut rival = ReviewState::new(&n.id, "alice", morning());
        rival.repetition_count = 7;
        rival.interval_days = 30;
        let store = RacingInsert {
            inner: &db,
            rival,
            raced: Cell::new(false),
        };
        let manager = ReviewManager::new(&store, &db, &clock);

        let state = manager.enable_review("alice", &n.id).unwrap();

        assert!(store.raced.get());
        assert_eq!(state.repetition_count, 7);
        assert_eq!(state.interval_days, 30);
        assert_eq!(db.get(&n.id).unwrap(), Some(state));
    }

    #[test]
    fn test_enable_requires_owned_note() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");

        assert!(matches!(
            manager.enable_review("bob", &n.id),
            Err(ReviewError::NotFound(_))
        ));
        assert!(matches!(
            manager.enable_review("alice", "missing"),
            Err(ReviewError::NotFound(_))
        ));
        assert!(db.get(&n.id).unwrap().is_none());
    }

    #[test]
    fn test_disable_review() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");

        assert!(matches!(
            manager.disable_review("alice", &n.id),
            Err(ReviewError::NotFound(_))
        ));

        manager.enable_review("alice", &n.id).unwrap();
        assert!(matches!(
            manager.disable_review("bob", &n.id),
            Err(ReviewError::NotFound(_))
        ));

        manager.disable_review("alice", &n.id).unwrap();
        assert_eq!(manager.get_review_status("alice", &n.id).unwrap(), None);
        // Note itself survives
        assert!(db.get_note(&n.id, "alice").unwrap().is_some());
    }

    #[test]
    fn test_submit_requires_enabled_review() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");

        assert!(matches!(
            manager.submit_review("alice", &n.id, 4),
            Err(ReviewError::NotFound(_))
        ));
    }

    #[test]
    fn test_submit_follows_sm2_sequence() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");
        manager.enable_review("alice", &n.id).unwrap();

        let first = manager.submit_review("alice", &n.id, 3).unwrap();
        assert!((first.easiness_factor - 2.36).abs() < 1e-9);
        assert_eq!((first.interval_days, first.repetition_count), (1, 1));

        let second = manager.submit_review("alice", &n.id, 4).unwrap();
        assert!((second.easiness_factor - 2.36).abs() < 1e-9);
        assert_eq!((second.interval_days, second.repetition_count), (6, 2));

        let third = manager.submit_review("alice", &n.id, 5).unwrap();
        assert!((third.easiness_factor - 2.46).abs() < 1e-9);
        assert_eq!((third.interval_days, third.repetition_count), (15, 3));
        assert_eq!(third.next_review_at, add_days(&morning(), 15));
        assert_eq!(third.last_quality, Some(5));
        assert_eq!(third.last_reviewed_at, Some(morning()));

        let lapse = manager.submit_review("alice", &n.id, 1).unwrap();
        assert_eq!((lapse.interval_days, lapse.repetition_count), (1, 0));
        assert!(lapse.easiness_factor < third.easiness_factor);
    }

    #[test]
    fn test_submit_then_status_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        // Sub-millisecond noise must not leak into the stored state
        let clock = FixedClock::new(morning() + TimeDelta::nanoseconds(123_456_789));
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");
        manager.enable_review("alice", &n.id).unwrap();

        let submitted = manager.submit_review("alice", &n.id, 5).unwrap();
        let status = manager.get_review_status("alice", &n.id).unwrap().unwrap();

        assert_eq!(status, submitted);
        assert_eq!(
            status.easiness_factor.to_bits(),
            submitted.easiness_factor.to_bits()
        );
        assert_eq!(status.last_reviewed_at.unwrap().nanosecond(), 123_000_000);
    }

    #[test]
    fn test_invalid_quality_leaves_state_untouched() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");
        manager.enable_review("alice", &n.id).unwrap();
        let before = manager.submit_review("alice", &n.id, 4).unwrap();

        for quality in [-1, 6] {
            assert!(matches!(
                manager.submit_review("alice", &n.id, quality),
                Err(ReviewError::InvalidArgument(_))
            ));
        }
        assert_eq!(manager.get_review_status("alice", &n.id).unwrap(), Some(before));
    }

    #[test]
    fn test_status_of_untracked_or_foreign_note_is_none() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");

        assert_eq!(manager.get_review_status("alice", &n.id).unwrap(), None);
        manager.enable_review("alice", &n.id).unwrap();
        assert_eq!(manager.get_review_status("bob", &n.id).unwrap(), None);
        assert!(manager.get_review_status("alice", &n.id).unwrap().is_some());
    }

    #[test]
    fn test_due_today_includes_yesterday_and_today_only() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);

        let mut ids = Vec::new();
        for (title, offset) in [("tomorrow", 1), ("today", 0), ("yesterday", -1)] {
            let n = note(&db, "alice", title);
            let mut state = manager.enable_review("alice", &n.id).unwrap();
            state.next_review_at = add_days(&morning(), offset);
            db.upsert(&state).unwrap();
            ids.push(n.id);
        }

        // Late in the evening, "today" is still due and "tomorrow" is not
        clock.set(Local.with_ymd_and_hms(2024, 4, 8, 23, 59, 59).unwrap());
        let due = manager.get_due_today("alice").unwrap();
        let titles: Vec<_> = due.iter().map(|e| e.note.title.as_str()).collect();
        assert_eq!(titles, vec!["yesterday", "today"]);
        assert_eq!(due[0].state.item_id, ids[2]);
        assert_eq!(due[0].note.source.as_deref(), Some("test"));
    }

    #[test]
    fn test_due_today_is_per_owner() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");
        manager.enable_review("alice", &n.id).unwrap();

        clock.advance_days(1);
        assert_eq!(manager.get_due_today("alice").unwrap().len(), 1);
        assert!(manager.get_due_today("bob").unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);

        assert_eq!(manager.get_stats("alice").unwrap(), ReviewStats::default());

        let a = note(&db, "alice", "a");
        let b = note(&db, "alice", "b");
        let c = note(&db, "alice", "c");
        for n in [&a, &b, &c] {
            manager.enable_review("alice", &n.id).unwrap();
        }
        manager.submit_review("alice", &a.id, 5).unwrap();
        manager.submit_review("alice", &a.id, 5).unwrap();
        manager.submit_review("alice", &b.id, 4).unwrap();
        manager.submit_review("alice", &c.id, 4).unwrap();
        // Lapse erases c's streak
        manager.submit_review("alice", &c.id, 0).unwrap();

        // a is due in 6 days; b and c tomorrow
        clock.advance_days(1);
        let stats = manager.get_stats("alice").unwrap();
        assert_eq!(stats.total_tracked, 3);
        assert_eq!(stats.due_today, 2);
        assert_eq!(stats.total_reviews_done, 3);
        assert_eq!(stats.due_today, manager.get_due_today("alice").unwrap().len());
    }

    #[test]
    fn test_all_reviews_ordered_and_joined() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let slow = note(&db, "alice", "slow");
        let fast = note(&db, "alice", "fast");
        manager.enable_review("alice", &slow.id).unwrap();
        manager.enable_review("alice", &fast.id).unwrap();
        manager.submit_review("alice", &slow.id, 5).unwrap();
        manager.submit_review("alice", &slow.id, 5).unwrap();

        let all = manager.get_all_reviews("alice").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].note, NoteSummary::from(&fast));
        assert_eq!(all[1].note.title, "slow");
        assert!(all[0].state.next_review_at <= all[1].state.next_review_at);
    }

    #[test]
    fn test_deleting_note_removes_review() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");
        manager.enable_review("alice", &n.id).unwrap();

        db.delete_cascade(&n.id).unwrap();
        assert_eq!(manager.get_review_status("alice", &n.id).unwrap(), None);
        assert!(manager.get_all_reviews("alice").unwrap().is_empty());
    }

    #[test]
    fn test_submit_retries_once_on_conflict() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let n = note(&db, "alice", "a");
        ReviewManager::new(&db, &db, &clock)
            .enable_review("alice", &n.id)
            .unwrap();

        let store = Contended::new(&db, 1);
        let manager = ReviewManager::new(&store, &db, &clock);
        let state = manager.submit_review("alice", &n.id, 4).unwrap();

        assert_eq!(store.upserts.get(), 2);
        assert_eq!(state.repetition_count, 1);
    }

    #[test]
    fn test_submit_surfaces_second_conflict() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let n = note(&db, "alice", "a");
        let enabled = ReviewManager::new(&db, &db, &clock)
            .enable_review("alice", &n.id)
            .unwrap();

        let store = Contended::new(&db, 2);
        let manager = ReviewManager::new(&store, &db, &clock);

        assert!(matches!(
            manager.submit_review("alice", &n.id, 4),
            Err(ReviewError::Conflict(_))
        ));
        assert_eq!(store.upserts.get(), 2);
        assert_eq!(db.get(&n.id).unwrap(), Some(enabled));
    }

    #[test]
    fn test_concurrent_writer_is_not_clobbered() {
        let db = Database::open_in_memory().unwrap();
        let clock = FixedClock::new(morning());
        let manager = ReviewManager::new(&db, &db, &clock);
        let n = note(&db, "alice", "a");
        let stale = manager.enable_review("alice", &n.id).unwrap();

        // Another request lands between our read and our write
        manager.submit_review("alice", &n.id, 5).unwrap();
        assert!(matches!(db.upsert(&stale), Err(ReviewError::Conflict(_))));

        // The manager's own path re-reads and builds on the winner's streak
        let state = manager.submit_review("alice", &n.id, 5).unwrap();
        assert_eq!(state.repetition_count, 2);
    }
}
