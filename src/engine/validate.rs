use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::capacity::{remaining_capacity, tables_required};
use super::clock::{earliest_bookable, parse_request_date, parse_slot_time};
use super::conflict::{derive_end_time, first_conflict};
use super::{Engine, EngineError, Rejection};

/// Active reservations the occupancy predicate is evaluated against.
///
/// Built from repository queries during validation and from the locked month
/// ledger during commit, so both sides run the same checks.
#[derive(Debug, Default, Clone)]
pub(crate) struct Snapshot {
    /// Active reservations of the candidate's kind on the candidate's date.
    pub same_day: Vec<Reservation>,
    /// Active reservations of the candidate's kind in the candidate's month.
    pub month_count: usize,
    /// An active reservation of the candidate's kind on exactly this date.
    pub exact_date: Option<Ulid>,
}

/// Monthly quota, exact-date exclusivity, table capacity, time conflicts.
pub(crate) fn check_occupancy(
    config: &CapacityConfig,
    candidate: &ValidatedReservation,
    snapshot: &Snapshot,
) -> Result<(), Rejection> {
    let is_event = candidate.kind == ReservationKind::Event;

    if is_event
        && let Some(quota) = config.monthly_quota
        && snapshot.month_count >= quota as usize
    {
        return Err(Rejection::MonthlyQuotaExceeded { quota });
    }

    if is_event
        && config.exclusive_date
        && let Some(existing) = snapshot.exact_date
    {
        return Err(Rejection::DateAlreadyReserved { existing });
    }

    let remaining = remaining_capacity(config, &snapshot.same_day);
    if candidate.tables_required as i64 > remaining {
        return Err(Rejection::InsufficientCapacity {
            requested: candidate.tables_required,
            remaining: remaining.max(0),
        });
    }

    if is_event
        && let Some(slot) = candidate.slot
        && let Some(existing) = first_conflict(&slot, &snapshot.same_day)
    {
        return Err(Rejection::TimeSlotConflict { existing });
    }

    Ok(())
}

/// Resolve the request's time window. Events must carry one; groups may,
/// but any time they do supply is checked like an event's.
fn resolve_slot(request: &ReservationRequest) -> Result<(Option<SlotSpan>, bool), Rejection> {
    let start = request.start_time.as_deref().map(parse_slot_time).transpose()?;
    let end = request.end_time.as_deref().map(parse_slot_time).transpose()?;

    let (start, end, derived) = match (start, end, request.duration_hours) {
        (Some(start), Some(end), _) => (start, end, false),
        (Some(start), None, Some(hours)) => (start, derive_end_time(start, hours)?, true),
        (None, None, None) if request.kind == ReservationKind::Group => return Ok((None, false)),
        // a half-given window, or an event without one
        _ => return Err(Rejection::InvalidTimeFormat(String::new())),
    };
    if end <= start {
        return Err(Rejection::InvalidTimeRange);
    }
    Ok((Some(SlotSpan::new(start, end)), derived))
}

impl Engine {
    /// Decide whether `request` may be booked, as of `now`.
    ///
    /// Read-only: calling it twice against unchanged state gives the same answer.
    pub async fn validate(
        &self,
        request: ReservationRequest,
        now: DateTime<Utc>,
    ) -> Result<ValidatedReservation, EngineError> {
        let kind = request.kind;
        let result = self.validate_request(request, now).await;
        let outcome = match &result {
            Ok(_) => "accepted",
            Err(EngineError::Rejected(r)) => r.kind(),
            Err(_) => "error",
        };
        metrics::counter!(
            crate::observability::VALIDATIONS_TOTAL,
            "kind" => kind.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        if let Err(EngineError::Rejected(r)) = &result {
            debug!(%kind, reason = r.kind(), "reservation rejected: {r}");
        }
        result
    }

    async fn validate_request(
        &self,
        request: ReservationRequest,
        now: DateTime<Utc>,
    ) -> Result<ValidatedReservation, EngineError> {
        if let Some(ref l) = request.label
            && l.len() > MAX_LABEL_LEN
        {
            return Err(EngineError::LimitExceeded("label too long"));
        }
        let config = self.config_for(request.kind)?;

        // 1. format
        let date = parse_request_date(&request.date, self.timezone)?;
        let (slot, end_time_derived) = resolve_slot(&request)?;

        // 2. advance notice
        let earliest = earliest_bookable(now, self.timezone, config.min_days_prior);
        if date < earliest {
            return Err(Rejection::DateTooSoon { earliest }.into());
        }

        // 3. blackout
        if let Some(blackout) = self.blackouts.contains(date) {
            return Err(Rejection::DateBlackout {
                date,
                reason: blackout.reason,
            }
            .into());
        }

        // 4. party size, the configured maximum capped by the hard limit
        let party_size = request.party_size;
        let max = config.max_guests.map_or(MAX_PARTY_SIZE, |m| m.min(MAX_PARTY_SIZE));
        if party_size < config.min_guests || party_size > max {
            let bounded = config.max_guests.is_some() || party_size > MAX_PARTY_SIZE;
            return Err(Rejection::PartySizeOutOfRange {
                party_size,
                min: config.min_guests,
                max: bounded.then_some(max),
            }
            .into());
        }
        let tables_required = tables_required(party_size, config.table_size)?;

        let candidate = ValidatedReservation {
            kind: request.kind,
            date,
            slot,
            end_time_derived,
            party_size,
            tables_required,
            validated_at: now,
            request,
        };

        // 5..8. quota, exact date, capacity, time conflict
        let snapshot = self.snapshot_for(&candidate, &config).await?;
        check_occupancy(&config, &candidate, &snapshot)?;

        Ok(candidate)
    }

    async fn snapshot_for(
        &self,
        candidate: &ValidatedReservation,
        config: &CapacityConfig,
    ) -> Result<Snapshot, EngineError> {
        let kind = candidate.kind;
        let date = candidate.date;
        let is_event = kind == ReservationKind::Event;

        let month_count = if is_event && config.monthly_quota.is_some() {
            self.repository
                .find_active_by_month(date.year(), date.month(), kind)
                .await?
                .len()
        } else {
            0
        };

        let exact_date = if is_event && config.exclusive_date {
            self.repository
                .find_active_by_exact_date(date, kind)
                .await?
                .map(|r| r.id)
        } else {
            None
        };

        let same_day = self
            .repository
            .find_active_by_date(date)
            .await?
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect();

        Ok(Snapshot {
            same_day,
            month_count,
            exact_date,
        })
    }

    /// Capacity left for `kind` on `date`.
    pub async fn remaining_capacity(
        &self,
        kind: ReservationKind,
        date: NaiveDate,
    ) -> Result<CapacityInfo, EngineError> {
        let config = self.config_for(kind)?;
        let same_day: Vec<Reservation> = self
            .repository
            .find_active_by_date(date)
            .await?
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect();
        let remaining = remaining_capacity(&config, &same_day);
        Ok(CapacityInfo {
            kind,
            date,
            max_tables: config.max_tables_per_day,
            tables_consumed: (config.max_tables_per_day as i64 - remaining) as u32,
            remaining,
        })
    }
}
