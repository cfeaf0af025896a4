//! SM-2 (SuperMemo 2) spaced repetition algorithm implementation.
//!
//! The SM-2 algorithm calculates optimal review intervals based on recall quality:
//! - Each note has an easiness factor (EF) that adjusts based on performance
//! - EF is updated on every review, passed or lapsed, and never falls below 1.3
//! - Quality grades 0-2: lapse, interval back to 1 day and the streak restarts
//! - Quality grades 3-5: interval grows 1 day → 6 days → previous interval × EF
//!
//! Due dates are day-granular: every computed date is normalized to local midnight.

use crate::error::{Result, ReviewError};
use chrono::{
    DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone,
};

pub const MIN_EASINESS: f64 = 1.3;
pub const INITIAL_EASINESS: f64 = 2.5;
pub const MAX_QUALITY: i64 = 5;
/// Lowest quality that counts as a successful recall.
pub const PASSING_QUALITY: u8 = 3;

/// Scheduling state carried from the previous review.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sm2Input {
    pub easiness: f64,
    pub interval_days: i64,
    pub repetitions: i64,
}

impl Default for Sm2Input {
    /// A note that has never been reviewed.
    fn default() -> Self {
        Self {
            easiness: INITIAL_EASINESS,
            interval_days: 0,
            repetitions: 0,
        }
    }
}

/// Output of one SM-2 step.
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule<Tz: TimeZone> {
    pub easiness: f64,
    pub interval_days: i64,
    pub repetitions: i64,
    pub next_review: DateTime<Tz>,
    /// The validated quality that produced this schedule.
    pub quality: u8,
}

/// Rejects quality scores outside 0-5.
pub fn validate_quality(quality: i64) -> Result<u8> {
    if !(0..=MAX_QUALITY).contains(&quality) {
        return Err(ReviewError::InvalidArgument(format!(
            "quality must be between 0 and {MAX_QUALITY}, got {quality}"
        )));
    }
    Ok(quality as u8)
}

/// Calculates the next schedule according to the SM-2 algorithm.
/// quality: 0-5 (0 = complete blackout, 5 = perfect response)
pub fn compute<Tz: TimeZone>(
    quality: i64,
    prev: &Sm2Input,
    now: &DateTime<Tz>,
) -> Result<Schedule<Tz>> {
    let quality = validate_quality(quality)?;

    // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
    let q = quality as f64;
    let easiness =
        (prev.easiness + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02))).max(MIN_EASINESS);

    if quality < PASSING_QUALITY {
        return Ok(Schedule {
            easiness,
            interval_days: 1,
            repetitions: 0,
            next_review: add_days(now, 1),
            quality,
        });
    }

    let repetitions = prev.repetitions + 1;
    let interval_days = match repetitions {
        1 => 1,
        2 => 6,
        // f64::round is half-away-from-zero; `as` saturates on absurdly long streaks
        _ => ((prev.interval_days as f64 * easiness).round() as i64).max(1),
    };

    Ok(Schedule {
        easiness,
        interval_days,
        repetitions,
        next_review: add_days(now, interval_days),
        quality,
    })
}

/// Adds `days` calendar days and truncates to local midnight.
pub fn add_days<Tz: TimeZone>(date: &DateTime<Tz>, days: i64) -> DateTime<Tz> {
    let today = date.date_naive();
    let magnitude = Days::new(days.unsigned_abs());
    let day = if days >= 0 {
        today.checked_add_days(magnitude).unwrap_or(NaiveDate::MAX)
    } else {
        today.checked_sub_days(magnitude).unwrap_or(NaiveDate::MIN)
    };
    start_of_day(&date.timezone(), day)
}

/// Last representable millisecond of the local day containing `now` (23:59:59.999).
///
/// A note is due when its `next_review_at` is at or before this instant, so anything
/// scheduled for today is due whatever the time of day.
pub fn end_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    add_days(now, 1) - TimeDelta::milliseconds(1)
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Tz> {
    resolve_local(tz, day.and_time(chrono::NaiveTime::MIN))
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Midnight falls in a gap: read it with the offset in force a day earlier, which
        // lands on the first instant after the transition
        LocalResult::None => {
            let before = tz.offset_from_utc_datetime(&(naive - TimeDelta::days(1))).fix();
            let utc = naive - TimeDelta::seconds(i64::from(before.local_minus_utc()));
            tz.from_utc_datetime(&utc)
        }
    }
}
