use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock time of day as minutes since local midnight.
///
/// Always in `0..MINUTES_PER_DAY`. Parsed from and rendered as `h:mm AM/PM`;
/// all interval arithmetic happens on the minute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallTime(u16);

impl WallTime {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    /// Slots are offered on the hour only.
    pub fn is_on_the_hour(self) -> bool {
        self.0 % 60 == 0
    }

    /// Parse `h:mm AM` / `h:mm PM`. The hour may carry a leading zero,
    /// minutes must be two digits.
    pub fn parse(s: &str) -> Option<Self> {
        let (clock, meridiem) = s.trim().split_once(' ')?;
        let pm = match meridiem.trim() {
            m if m.eq_ignore_ascii_case("AM") => false,
            m if m.eq_ignore_ascii_case("PM") => true,
            _ => return None,
        };
        let (h, m) = clock.split_once(':')?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return None;
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hour: u16 = h.parse().ok()?;
        let minute: u16 = m.parse().ok()?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour24 = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        Self::from_hm(hour24, minute)
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hour24 = self.0 / 60;
        let minute = self.0 % 60;
        let meridiem = if hour24 < 12 { "AM" } else { "PM" };
        let hour12 = match hour24 % 12 {
            0 => 12,
            h => h,
        };
        write!(f, "{hour12}:{minute:02} {meridiem}")
    }
}

impl From<WallTime> for String {
    fn from(t: WallTime) -> Self {
        t.to_string()
    }
}

impl TryFrom<String> for WallTime {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        WallTime::parse(&s).ok_or_else(|| format!("invalid wall time: {s:?}"))
    }
}

/// Half-open interval `[start, end)` within one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpan {
    pub start: WallTime,
    pub end: WallTime,
}

impl SlotSpan {
    pub fn new(start: WallTime, end: WallTime) -> Self {
        debug_assert!(start < end, "SlotSpan start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    /// Touching intervals (one ends where the other starts) do not overlap.
    pub fn overlaps(&self, other: &SlotSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_span(&self, other: &SlotSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationKind {
    /// Whole-event booking with a time window.
    Event,
    /// Party seated across one or more tables.
    Group,
}

impl fmt::Display for ReservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationKind::Event => f.write_str("event"),
            ReservationKind::Group => f.write_str("group"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    /// Only non-cancelled reservations hold capacity.
    pub fn is_active(self) -> bool {
        self != ReservationStatus::Cancelled
    }

    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Pending, Completed)
                | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub kind: ReservationKind,
    pub date: NaiveDate,
    pub start_time: Option<WallTime>,
    pub end_time: Option<WallTime>,
    pub party_size: u32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub label: Option<String>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn slot(&self) -> Option<SlotSpan> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start < end => Some(SlotSpan::new(start, end)),
            _ => None,
        }
    }
}

/// Capacity parameters for one reservation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityConfig {
    pub min_days_prior: u32,
    pub min_guests: u32,
    #[serde(default)]
    pub max_guests: Option<u32>,
    pub table_size: u32,
    pub max_tables_per_day: u32,
    /// Reservation count cap per calendar month (Event only).
    #[serde(default)]
    pub monthly_quota: Option<u32>,
    /// At most one active reservation of this kind per date (Event only).
    #[serde(default)]
    pub exclusive_date: bool,
}

impl CapacityConfig {
    pub fn default_event() -> Self {
        Self {
            min_days_prior: 14,
            min_guests: 1,
            max_guests: None,
            table_size: 6,
            max_tables_per_day: 10,
            monthly_quota: Some(2),
            exclusive_date: true,
        }
    }

    pub fn default_group() -> Self {
        Self {
            min_days_prior: 1,
            min_guests: 7,
            max_guests: Some(60),
            table_size: 6,
            max_tables_per_day: 10,
            monthly_quota: None,
            exclusive_date: false,
        }
    }

    pub fn check(&self) -> Result<(), String> {
        if self.table_size == 0 {
            return Err("table_size must be greater than zero".into());
        }
        if let Some(max) = self.max_guests
            && max < self.min_guests
        {
            return Err(format!("max_guests {max} below min_guests {}", self.min_guests));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutDate {
    pub date: NaiveDate,
    pub reason: String,
}

/// An incoming booking request, as received from the caller.
///
/// Dates and times stay textual until validation so format errors surface as
/// rejections rather than transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub kind: ReservationKind,
    pub date: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration_hours: Option<u32>,
    pub party_size: u32,
    #[serde(default)]
    pub label: Option<String>,
}

/// A request that passed validation, ready for commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedReservation {
    pub request: ReservationRequest,
    pub kind: ReservationKind,
    pub date: NaiveDate,
    pub slot: Option<SlotSpan>,
    /// End time was computed from `duration_hours`.
    pub end_time_derived: bool,
    pub party_size: u32,
    pub tables_required: u32,
    pub validated_at: DateTime<Utc>,
}

impl ValidatedReservation {
    pub fn into_reservation(self, id: Ulid, created_at: DateTime<Utc>) -> Reservation {
        Reservation {
            id,
            kind: self.kind,
            date: self.date,
            start_time: self.slot.map(|s| s.start),
            end_time: self.slot.map(|s| s.end),
            party_size: self.party_size,
            status: ReservationStatus::Pending,
            created_at,
            label: self.request.label,
        }
    }
}

/// Calendar month, the unit of commit serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

/// Journal record format. Flat, one variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    ReservationCreated(Reservation),
    StatusChanged {
        id: Ulid,
        date: NaiveDate,
        status: ReservationStatus,
    },
    ReservationDeleted {
        id: Ulid,
        date: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityInfo {
    pub kind: ReservationKind,
    pub date: NaiveDate,
    pub max_tables: u32,
    pub tables_consumed: u32,
    pub remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> WallTime {
        WallTime::parse(s).unwrap()
    }

    #[test]
    fn wall_time_parse_and_display() {
        assert_eq!(t("12:00 AM").minutes(), 0);
        assert_eq!(t("9:00 AM").minutes(), 9 * 60);
        assert_eq!(t("09:00 AM").minutes(), 9 * 60);
        assert_eq!(t("12:00 PM").minutes(), 12 * 60);
        assert_eq!(t("1:30 PM").minutes(), 13 * 60 + 30);
        assert_eq!(t("11:00 pm").minutes(), 23 * 60);
        assert_eq!(t("3:00 PM").to_string(), "3:00 PM");
        assert_eq!(t("12:00 AM").to_string(), "12:00 AM");
    }

    #[test]
    fn wall_time_rejects_garbage() {
        for bad in ["", "9 AM", "9:0 AM", "13:00 PM", "0:00 AM", "9:60 AM", "9:00", "9:00 XM", "a:00 AM"] {
            assert!(WallTime::parse(bad).is_none(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn wall_time_orders_numerically_not_lexically() {
        // "10:00 AM" < "9:00 AM" as strings
        assert!(t("9:00 AM") < t("10:00 AM"));
        assert!(t("11:00 AM") < t("1:00 PM"));
    }

    #[test]
    fn slot_overlap_and_touching() {
        let a = SlotSpan::new(t("1:00 PM"), t("3:00 PM"));
        let b = SlotSpan::new(t("2:00 PM"), t("4:00 PM"));
        let c = SlotSpan::new(t("3:00 PM"), t("5:00 PM"));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.duration_minutes(), 120);
        assert!(SlotSpan::new(t("12:00 PM"), t("6:00 PM")).contains_span(&a));
    }

    #[test]
    fn status_transitions() {
        use ReservationStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Cancelled.is_active());
        assert!(Completed.is_active());
    }

    #[test]
    fn capacity_config_check() {
        assert!(CapacityConfig::default_event().check().is_ok());
        let mut bad = CapacityConfig::default_group();
        bad.table_size = 0;
        assert!(bad.check().is_err());
        let mut inverted = CapacityConfig::default_group();
        inverted.max_guests = Some(3);
        assert!(inverted.check().is_err());
    }

    #[test]
    fn journal_record_serialization_roundtrip() {
        let record = JournalRecord::ReservationCreated(Reservation {
            id: Ulid::new(),
            kind: ReservationKind::Event,
            date: NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(),
            start_time: Some(t("1:00 PM")),
            end_time: Some(t("3:00 PM")),
            party_size: 20,
            status: ReservationStatus::Pending,
            created_at: Utc::now(),
            label: Some("Rivera wedding".into()),
        });
        let bytes = bincode::serialize(&record).unwrap();
        let decoded: JournalRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(record, decoded);
    }
}
