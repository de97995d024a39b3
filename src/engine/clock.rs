//! Calendar-day normalization.
//!
//! Every date comparison in the engine happens on `NaiveDate` values in the
//! business timezone. Instants are converted here and nowhere else.

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::model::WallTime;

use super::Rejection;

/// Accepts `YYYY-MM-DD`, or an RFC 3339 instant which is mapped to the
/// business-timezone calendar day it falls on.
pub fn parse_request_date(raw: &str, tz: Tz) -> Result<NaiveDate, Rejection> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|instant| instant.with_timezone(&tz).date_naive())
        .map_err(|_| Rejection::InvalidDateFormat(raw.to_string()))
}

/// Today's calendar day in the business timezone.
pub fn local_today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

pub fn earliest_bookable(now: DateTime<Utc>, tz: Tz, min_days_prior: u32) -> NaiveDate {
    let today = local_today(now, tz);
    today
        .checked_add_days(Days::new(min_days_prior as u64))
        .unwrap_or(NaiveDate::MAX)
}

/// Stored blackout instants mark a day, conventionally at midnight UTC.
/// The day is read off in UTC so the marker never slides onto a neighbouring
/// local date.
pub fn blackout_day(marker: DateTime<Utc>) -> NaiveDate {
    marker.date_naive()
}

/// Parse an offered slot boundary: `h:00 AM/PM`.
pub fn parse_slot_time(raw: &str) -> Result<WallTime, Rejection> {
    WallTime::parse(raw)
        .filter(|t| t.is_on_the_hour())
        .ok_or_else(|| Rejection::InvalidTimeFormat(raw.to_string()))
}
