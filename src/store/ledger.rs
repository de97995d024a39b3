use std::collections::BTreeMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::engine::Snapshot;
use crate::model::*;

/// Every reservation of one calendar month, bucketed by day.
///
/// Cancelled reservations stay until deleted but are skipped by every
/// `active_*` view.
#[derive(Debug, Default)]
pub struct MonthLedger {
    days: BTreeMap<NaiveDate, Vec<Reservation>>,
    len: usize,
}

impl MonthLedger {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, reservation: Reservation) {
        self.days.entry(reservation.date).or_default().push(reservation);
        self.len += 1;
    }

    pub fn get(&self, date: NaiveDate, id: Ulid) -> Option<&Reservation> {
        self.days.get(&date)?.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, date: NaiveDate, id: Ulid) -> Option<&mut Reservation> {
        self.days.get_mut(&date)?.iter_mut().find(|r| r.id == id)
    }

    pub fn remove(&mut self, date: NaiveDate, id: Ulid) -> Option<Reservation> {
        let day = self.days.get_mut(&date)?;
        let pos = day.iter().position(|r| r.id == id)?;
        let removed = day.remove(pos);
        if day.is_empty() {
            self.days.remove(&date);
        }
        self.len -= 1;
        Some(removed)
    }

    pub fn active_on(&self, date: NaiveDate) -> impl Iterator<Item = &Reservation> {
        self.days
            .get(&date)
            .into_iter()
            .flatten()
            .filter(|r| r.is_active())
    }

    pub fn active_of_kind(&self, kind: ReservationKind) -> impl Iterator<Item = &Reservation> {
        self.days
            .values()
            .flatten()
            .filter(move |r| r.kind == kind && r.is_active())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.days.values().flatten()
    }

    /// Occupancy inputs for `candidate`, read under whatever lock the caller holds.
    pub(crate) fn snapshot(&self, candidate: &ValidatedReservation) -> Snapshot {
        let kind = candidate.kind;
        let same_day: Vec<Reservation> = self
            .active_on(candidate.date)
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        Snapshot {
            exact_date: same_day.first().map(|r| r.id),
            month_count: self.active_of_kind(kind).count(),
            same_day,
        }
    }

    /// Apply one journal record. Records for unknown ids are ignored.
    pub fn apply(&mut self, record: &JournalRecord) {
        match record {
            JournalRecord::ReservationCreated(reservation) => self.insert(reservation.clone()),
            JournalRecord::StatusChanged { id, date, status } => {
                if let Some(r) = self.get_mut(*date, *id) {
                    r.status = *status;
                }
            }
            JournalRecord::ReservationDeleted { id, date } => {
                self.remove(*date, *id);
            }
        }
    }
}
