//! Capacity configuration and blackout calendar, loaded once at startup.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::engine::blackout_day;
use crate::model::*;
use crate::repository::{BlackoutCalendar, ConfigurationStore};

#[derive(Debug)]
pub enum PolicyError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    InvalidConfig {
        kind: ReservationKind,
        reason: String,
    },
    InvalidBlackout(String),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::Io(e) => write!(f, "cannot read capacity file: {e}"),
            PolicyError::Parse(e) => write!(f, "malformed capacity file: {e}"),
            PolicyError::InvalidConfig { kind, reason } => {
                write!(f, "invalid {kind} configuration: {reason}")
            }
            PolicyError::InvalidBlackout(raw) => write!(f, "invalid blackout date: {raw:?}"),
        }
    }
}

impl std::error::Error for PolicyError {}

/// Per-kind capacity parameters.
#[derive(Debug, Clone, Default)]
pub struct CapacityTable {
    configs: HashMap<ReservationKind, CapacityConfig>,
}

impl CapacityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.configs.insert(ReservationKind::Event, CapacityConfig::default_event());
        table.configs.insert(ReservationKind::Group, CapacityConfig::default_group());
        table
    }

    pub fn set(&mut self, kind: ReservationKind, config: CapacityConfig) -> Result<(), PolicyError> {
        config
            .check()
            .map_err(|reason| PolicyError::InvalidConfig { kind, reason })?;
        self.configs.insert(kind, config);
        Ok(())
    }
}

impl ConfigurationStore for CapacityTable {
    fn get(&self, kind: ReservationKind) -> Option<CapacityConfig> {
        self.configs.get(&kind).cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlackoutList {
    dates: HashMap<NaiveDate, BlackoutDate>,
}

impl BlackoutList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, reason: impl Into<String>) {
        self.dates.insert(
            date,
            BlackoutDate {
                date,
                reason: reason.into(),
            },
        );
    }

    /// Insert a blackout stored as an instant (midnight UTC marker).
    pub fn insert_marker(&mut self, marker: DateTime<Utc>, reason: impl Into<String>) {
        self.insert(blackout_day(marker), reason);
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl BlackoutCalendar for BlackoutList {
    fn contains(&self, date: NaiveDate) -> Option<BlackoutDate> {
        self.dates.get(&date).cloned()
    }
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    event: Option<CapacityConfig>,
    #[serde(default)]
    group: Option<CapacityConfig>,
    #[serde(default)]
    blackouts: Vec<BlackoutEntry>,
}

#[derive(Debug, Deserialize)]
struct BlackoutEntry {
    date: String,
    #[serde(default)]
    reason: String,
}

fn parse_blackout(raw: &str) -> Result<NaiveDate, PolicyError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|instant| blackout_day(instant.with_timezone(&Utc)))
        .map_err(|_| PolicyError::InvalidBlackout(raw.to_string()))
}

/// Parse a capacity document. Kinds left out keep their built-in defaults.
///
/// ```json
/// {
///   "event": { "min_days_prior": 14, "min_guests": 1, "table_size": 6,
///              "max_tables_per_day": 10, "monthly_quota": 2, "exclusive_date": true },
///   "blackouts": [ { "date": "2025-12-25", "reason": "Closed" } ]
/// }
/// ```
pub fn parse_policy(json: &str) -> Result<(CapacityTable, BlackoutList), PolicyError> {
    let file: PolicyFile = serde_json::from_str(json).map_err(PolicyError::Parse)?;

    let mut table = CapacityTable::with_defaults();
    if let Some(event) = file.event {
        table.set(ReservationKind::Event, event)?;
    }
    if let Some(group) = file.group {
        table.set(ReservationKind::Group, group)?;
    }

    let mut blackouts = BlackoutList::new();
    for entry in file.blackouts {
        blackouts.insert(parse_blackout(&entry.date)?, entry.reason);
    }
    Ok((table, blackouts))
}

pub fn load_policy(path: &Path) -> Result<(CapacityTable, BlackoutList), PolicyError> {
    let json = std::fs::read_to_string(path).map_err(PolicyError::Io)?;
    parse_policy(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_cover_both_kinds() {
        let table = CapacityTable::with_defaults();
        assert_eq!(table.get(ReservationKind::Event).unwrap().table_size, 6);
        assert_eq!(table.get(ReservationKind::Group).unwrap().min_guests, 7);
        assert!(CapacityTable::new().get(ReservationKind::Event).is_none());
    }

    #[test]
    fn parse_overrides_and_blackouts() {
        let json = r#"{
            "group": { "min_days_prior": 2, "min_guests": 8, "max_guests": 40,
                       "table_size": 8, "max_tables_per_day": 6 },
            "blackouts": [
                { "date": "2025-12-25", "reason": "Christmas" },
                { "date": "2026-01-01T00:00:00Z", "reason": "New year" }
            ]
        }"#;
        let (table, blackouts) = parse_policy(json).unwrap();
        let group = table.get(ReservationKind::Group).unwrap();
        assert_eq!(group.table_size, 8);
        assert_eq!(group.max_guests, Some(40));
        assert!(!group.exclusive_date);
        // untouched kind keeps its default
        assert_eq!(table.get(ReservationKind::Event), Some(CapacityConfig::default_event()));

        assert_eq!(blackouts.len(), 2);
        let xmas = NaiveDate::from_ymd_opt(2025, 12, 25).unwrap();
        assert_eq!(blackouts.contains(xmas).unwrap().reason, "Christmas");
        let new_year = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(blackouts.contains(new_year).is_some());
        assert!(blackouts.contains(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()).is_none());
    }

    #[test]
    fn zero_table_size_refused() {
        let json = r#"{ "event": { "min_days_prior": 0, "min_guests": 1,
                                   "table_size": 0, "max_tables_per_day": 1 } }"#;
        assert!(matches!(
            parse_policy(json),
            Err(PolicyError::InvalidConfig { kind: ReservationKind::Event, .. })
        ));
    }

    #[test]
    fn bad_blackout_refused() {
        let json = r#"{ "blackouts": [ { "date": "25/12/2025", "reason": "x" } ] }"#;
        assert!(matches!(parse_policy(json), Err(PolicyError::InvalidBlackout(_))));
    }

    #[test]
    fn midnight_utc_marker_matches_calendar_day() {
        let mut list = BlackoutList::new();
        list.insert_marker(Utc.with_ymd_and_hms(2025, 11, 2, 0, 0, 0).unwrap(), "Día de Muertos");
        assert!(list.contains(NaiveDate::from_ymd_opt(2025, 11, 2).unwrap()).is_some());
        assert!(list.contains(NaiveDate::from_ymd_opt(2025, 11, 1).unwrap()).is_none());
    }
}
