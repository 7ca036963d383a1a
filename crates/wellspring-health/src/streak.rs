use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use wellspring_types::Frequency;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
}

/// Compute streaks from approved completion dates.
///
/// A period is a calendar day for daily habits and an ISO week for weekly
/// ones. The current streak is the run of consecutive periods ending at the
/// latest approved period, and only counts while that period is this one or
/// the one before it. Dates may arrive unsorted and with duplicates.
pub fn compute_streak(dates: &[NaiveDate], frequency: Frequency, today: NaiveDate) -> Streak {
    let mut periods: Vec<i64> = dates.iter().map(|d| period_index(*d, frequency)).collect();
    periods.sort_unstable();
    periods.dedup();

    let Some(&last) = periods.last() else {
        return Streak::default();
    };

    let mut longest = 1u32;
    let mut run = 1u32;
    for pair in periods.windows(2) {
        if pair[1] == pair[0] + 1 {
            run += 1;
        } else {
            run = 1;
        }
        longest = longest.max(run);
    }

    let current = if last >= period_index(today, frequency) - 1 {
        run
    } else {
        0
    };

    Streak { current, longest }
}

fn period_index(date: NaiveDate, frequency: Frequency) -> i64 {
    match frequency {
        Frequency::Daily => date.num_days_from_ce() as i64,
        Frequency::Weekly => {
            // Mondays are exactly seven days apart, so integer division
            // yields consecutive indices.
            let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
            monday.num_days_from_ce() as i64 / 7
        }
    }
}
