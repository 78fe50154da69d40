//! Day-granularity availability over a window of interval records.
//!
//! Pure reduction: the gateway fetches the subject and its approved
//! intervals; this module clips, merges, and counts. Two intervals covering
//! the same day count that day once.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AvailabilityWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl AvailabilityWindow {
    /// `None` when `from > to`; callers reject that as invalid input.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// Inclusive day count.
    pub fn total_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

/// One booked interval as fetched from the backend, before clipping.
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalRecord {
    pub id: i64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub kind: Option<String>,
}

/// An interval after clipping to the window, reported back to the caller.
/// `affected_dates` lists each clipped day so callers need not re-derive
/// the overlap from the raw bounds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConflictingInterval {
    pub interval_id: i64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub kind: Option<String>,
    pub days_in_window: i64,
    pub affected_dates: Vec<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AvailabilityReport {
    pub subject_id: i64,
    pub subject_name: String,
    pub window: AvailabilityWindow,
    pub total_days: i64,
    pub unavailable_days: i64,
    pub available_days: i64,
    pub is_available: bool,
    pub conflicting_intervals: Vec<ConflictingInterval>,
}

pub fn assess(
    subject_id: i64,
    subject_name: impl Into<String>,
    window: AvailabilityWindow,
    intervals: &[IntervalRecord],
) -> AvailabilityReport {
    let mut clipped: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    let mut conflicting = Vec::new();

    for interval in intervals {
        let start = interval.date_from.max(window.from);
        let end = interval.date_to.min(window.to);
        if start > end {
            continue;
        }
        clipped.push((start, end));
        let affected_dates: Vec<NaiveDate> =
            start.iter_days().take_while(|date| *date <= end).collect();
        conflicting.push(ConflictingInterval {
            interval_id: interval.id,
            date_from: interval.date_from,
            date_to: interval.date_to,
            kind: interval.kind.clone(),
            days_in_window: affected_dates.len() as i64,
            affected_dates,
        });
    }

    let unavailable_days = merged_day_count(&mut clipped);
    let total_days = window.total_days();
    let available_days = total_days - unavailable_days;

    AvailabilityReport {
        subject_id,
        subject_name: subject_name.into(),
        window,
        total_days,
        unavailable_days,
        available_days,
        is_available: unavailable_days == 0,
        conflicting_intervals: conflicting,
    }
}

/// Union size of a set of inclusive day ranges: sort, merge
/// overlapping/adjacent ranges, sum lengths.
fn merged_day_count(ranges: &mut [(NaiveDate, NaiveDate)]) -> i64 {
    ranges.sort();
    let mut total = 0;
    let mut current: Option<(NaiveDate, NaiveDate)> = None;

    for &(start, end) in ranges.iter() {
        match current {
            Some((cur_start, cur_end)) if start <= cur_end.succ_opt().unwrap_or(cur_end) => {
                current = Some((cur_start, cur_end.max(end)));
            }
            Some((cur_start, cur_end)) => {
                total += (cur_end - cur_start).num_days() + 1;
                current = Some((start, end));
            }
            None => current = Some((start, end)),
        }
    }
    if let Some((cur_start, cur_end)) = current {
        total += (cur_end - cur_start).num_days() + 1;
    }
    total
}
