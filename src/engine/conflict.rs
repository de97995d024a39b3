use ulid::Ulid;

use crate::limits::MAX_DURATION_HOURS;
use crate::model::*;

use super::Rejection;

/// `proposed` conflicts with `existing` when its start falls inside `existing`,
/// its end falls inside `existing`, or it swallows `existing` whole.
///
/// Intervals are `[start, end)`: a slot ending at 3:00 PM leaves 3:00 PM free.
fn conflicts(proposed: &SlotSpan, existing: &SlotSpan) -> bool {
    let starts_inside = existing.start <= proposed.start && proposed.start < existing.end;
    let ends_inside = existing.start < proposed.end && proposed.end <= existing.end;
    starts_inside || ends_inside || proposed.contains_span(existing)
}

pub fn has_conflict(proposed: &SlotSpan, existing: &[SlotSpan]) -> bool {
    existing.iter().any(|e| conflicts(proposed, e))
}

/// First active reservation whose slot collides with `proposed`.
pub(crate) fn first_conflict<'a>(
    proposed: &SlotSpan,
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> Option<Ulid> {
    reservations
        .into_iter()
        .filter(|r| r.is_active())
        .find_map(|r| r.slot().filter(|s| conflicts(proposed, s)).map(|_| r.id))
}

/// Add whole hours to `start`. Results at or past midnight are rejected;
/// overnight events are not supported.
pub fn derive_end_time(start: WallTime, duration_hours: u32) -> Result<WallTime, Rejection> {
    if duration_hours == 0 || duration_hours > MAX_DURATION_HOURS {
        return Err(Rejection::InvalidTimeRange);
    }
    let end = start.minutes() as u32 + duration_hours * 60;
    u16::try_from(end)
        .ok()
        .and_then(WallTime::from_minutes)
        .ok_or(Rejection::InvalidTimeRange)
}
