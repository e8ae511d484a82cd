//! Reduces a parsed feed to the arrival list shown for one stop.

use std::fmt::Display;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::parser::{FeedDocument, StopVisit};

pub const DEFAULT_MAX_ARRIVALS: usize = 10;

/// A single display-ready arrival prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    pub line_ref: String,
    /// Whole minutes between now and the prediction. Always the absolute
    /// value, so a prediction three minutes in the past reads as 3.
    pub minutes_away: u64,
    /// `HH:MM`, 24-hour, in the time zone of `now`.
    pub formatted_time: String,
    pub original_time: String,
}

/// Filters, converts, sorts and truncates the visits of `feed`.
///
/// Visits are skipped when `filter_line` is set and their `LineRef` differs
/// (exact, case-sensitive), when they carry no `ExpectedArrivalTime`, or when
/// the timestamp cannot be interpreted. The result is sorted by
/// `minutes_away` (stable) and holds at most `max_arrivals` records.
pub fn normalize<Tz>(
    feed: &FeedDocument,
    filter_line: Option<&str>,
    now: &DateTime<Tz>,
    max_arrivals: usize,
) -> Vec<ArrivalRecord>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut arrivals = Vec::new();

    for visit in &feed.visits {
        if let Some(filter) = filter_line {
            if visit.line_ref.as_deref() != Some(filter) {
                continue;
            }
        }

        let Some(expected) = visit.expected_arrival_time.as_deref().filter(|t| !t.is_empty())
        else {
            continue;
        };

        match to_record(visit, expected, now) {
            Ok(record) => arrivals.push(record),
            Err(e) => warn!(expected, error = %e, "Skipping stop visit"),
        }
    }

    arrivals.sort_by_key(|a| a.minutes_away);
    arrivals.truncate(max_arrivals);
    arrivals
}

fn to_record<Tz>(visit: &StopVisit, expected: &str, now: &DateTime<Tz>) -> Result<ArrivalRecord>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let expected_at = parse_timestamp(expected, &now.timezone())?;
    let minutes_away = minutes_between(&expected_at, &now.with_timezone(&Utc));

    let arrival_at = i64::try_from(minutes_away)
        .ok()
        .and_then(Duration::try_minutes)
        .and_then(|d| now.clone().checked_add_signed(d))
        .ok_or_else(|| anyhow!("arrival time out of range"))?;

    Ok(ArrivalRecord {
        line_ref: visit.line_ref.clone().unwrap_or_default(),
        minutes_away,
        formatted_time: arrival_at.format("%H:%M").to_string(),
        original_time: expected.to_string(),
    })
}

/// `|floor((expected - now) / 1 min)|`
fn minutes_between(expected: &DateTime<Utc>, now: &DateTime<Utc>) -> u64 {
    let diff_ms = (*expected - *now).num_milliseconds();
    diff_ms.div_euclid(60_000).unsigned_abs()
}

/// Parses an ISO-8601 timestamp. Timestamps without an offset are taken to
/// be local to `tz`.
fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| anyhow!("invalid timestamp '{raw}': {e}"))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("timestamp '{raw}' does not exist in the display time zone"))
}
