use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;

/// Per-kind capacity parameters. Read-only from the engine's side.
pub trait ConfigurationStore: Send + Sync {
    fn get(&self, kind: ReservationKind) -> Option<CapacityConfig>;
}

/// Days closed to bookings. Membership is by calendar day.
pub trait BlackoutCalendar: Send + Sync {
    fn contains(&self, date: NaiveDate) -> Option<BlackoutDate>;
}

/// Persisted reservations.
///
/// All `find_*` queries return active (non-cancelled) reservations only.
/// `insert_if_capacity_holds` is the only write path used by the commit
/// transaction: it re-checks the capacity predicate and persists as one
/// atomic unit, failing with `EngineError::Rejected` when the predicate no
/// longer holds.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn find_active_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, EngineError>;

    async fn find_active_by_month(
        &self,
        year: i32,
        month: u32,
        kind: ReservationKind,
    ) -> Result<Vec<Reservation>, EngineError>;

    async fn find_active_by_exact_date(
        &self,
        date: NaiveDate,
        kind: ReservationKind,
    ) -> Result<Option<Reservation>, EngineError>;

    async fn insert_if_capacity_holds(
        &self,
        validated: &ValidatedReservation,
        config: &CapacityConfig,
    ) -> Result<Reservation, EngineError>;

    async fn get(&self, id: Ulid) -> Result<Reservation, EngineError>;

    /// Admin workflow status transition.
    async fn set_status(&self, id: Ulid, status: ReservationStatus) -> Result<Reservation, EngineError>;

    /// Explicit deletion. Releases the capacity the reservation held.
    async fn delete(&self, id: Ulid) -> Result<Reservation, EngineError>;
}
