use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{ReservationKind, ReservationStatus};

/// Business-rule rejection. Returned as data, mapped to a user message by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    InvalidDateFormat(String),
    InvalidTimeFormat(String),
    /// Inverted or overnight interval.
    InvalidTimeRange,
    DateTooSoon {
        earliest: NaiveDate,
    },
    DateBlackout {
        date: NaiveDate,
        reason: String,
    },
    PartySizeOutOfRange {
        party_size: u32,
        min: u32,
        max: Option<u32>,
    },
    InvalidPartySize,
    MonthlyQuotaExceeded {
        quota: u32,
    },
    DateAlreadyReserved {
        existing: Ulid,
    },
    InsufficientCapacity {
        requested: u32,
        remaining: i64,
    },
    TimeSlotConflict {
        existing: Ulid,
    },
}

impl Rejection {
    /// Stable kind name, used as metric label and wire error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::InvalidDateFormat(_) => "InvalidDateFormat",
            Rejection::InvalidTimeFormat(_) => "InvalidTimeFormat",
            Rejection::InvalidTimeRange => "InvalidTimeRange",
            Rejection::DateTooSoon { .. } => "DateTooSoon",
            Rejection::DateBlackout { .. } => "DateBlackout",
            Rejection::PartySizeOutOfRange { .. } => "PartySizeOutOfRange",
            Rejection::InvalidPartySize => "InvalidPartySize",
            Rejection::MonthlyQuotaExceeded { .. } => "MonthlyQuotaExceeded",
            Rejection::DateAlreadyReserved { .. } => "DateAlreadyReserved",
            Rejection::InsufficientCapacity { .. } => "InsufficientCapacity",
            Rejection::TimeSlotConflict { .. } => "TimeSlotConflict",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::InvalidDateFormat(s) => write!(f, "invalid date: {s:?}"),
            Rejection::InvalidTimeFormat(s) => {
                write!(f, "invalid time: {s:?} (expected h:00 AM/PM)")
            }
            Rejection::InvalidTimeRange => {
                write!(f, "end time must be after start time on the same day")
            }
            Rejection::DateTooSoon { earliest } => {
                write!(f, "date too soon: earliest bookable date is {earliest}")
            }
            Rejection::DateBlackout { date, reason } => {
                write!(f, "{date} is unavailable: {reason}")
            }
            Rejection::PartySizeOutOfRange { party_size, min, max } => match max {
                Some(max) => write!(f, "party size {party_size} outside {min}..={max}"),
                None => write!(f, "party size {party_size} below minimum {min}"),
            },
            Rejection::InvalidPartySize => write!(f, "party size must be positive"),
            Rejection::MonthlyQuotaExceeded { quota } => {
                write!(f, "monthly quota of {quota} reservations reached")
            }
            Rejection::DateAlreadyReserved { existing } => {
                write!(f, "date already reserved by {existing}")
            }
            Rejection::InsufficientCapacity { requested, remaining } => {
                write!(f, "insufficient capacity: {requested} tables requested, {remaining} remaining")
            }
            Rejection::TimeSlotConflict { existing } => {
                write!(f, "time slot conflicts with reservation {existing}")
            }
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Rejected(Rejection),
    ConfigurationMissing(ReservationKind),
    NotFound(Ulid),
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    LimitExceeded(&'static str),
    JournalError(String),
}

impl EngineError {
    /// Misconfiguration or storage failure rather than a bad request.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigurationMissing(_) | EngineError::JournalError(_)
        )
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            EngineError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Rejection> for EngineError {
    fn from(r: Rejection) -> Self {
        EngineError::Rejected(r)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Rejected(r) => write!(f, "rejected: {r}"),
            EngineError::ConfigurationMissing(kind) => {
                write!(f, "no capacity configuration for {kind} reservations")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move reservation from {from} to {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
