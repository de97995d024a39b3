mod capacity;
mod clock;
mod commit;
mod conflict;
mod error;
mod validate;

pub use capacity::{remaining_capacity, tables_consumed, tables_required};
pub use clock::{blackout_day, earliest_bookable, local_today, parse_request_date};
pub use conflict::{derive_end_time, has_conflict};
pub use error::{EngineError, Rejection};
pub(crate) use validate::{check_occupancy, Snapshot};

use std::sync::Arc;

use chrono_tz::Tz;
use ulid::Ulid;

use crate::model::*;
use crate::repository::{BlackoutCalendar, ConfigurationStore, ReservationRepository};

/// Reservation capacity and conflict engine.
///
/// Exposes `validate` and `commit` (plus `book`, which does both). All I/O goes
/// through the injected collaborators; the decision logic itself is pure.
pub struct Engine {
    configuration: Arc<dyn ConfigurationStore>,
    blackouts: Arc<dyn BlackoutCalendar>,
    repository: Arc<dyn ReservationRepository>,
    /// Business timezone: calendar days are counted here.
    timezone: Tz,
}

impl Engine {
    pub fn new(
        configuration: Arc<dyn ConfigurationStore>,
        blackouts: Arc<dyn BlackoutCalendar>,
        repository: Arc<dyn ReservationRepository>,
        timezone: Tz,
    ) -> Self {
        Self {
            configuration,
            blackouts,
            repository,
            timezone,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn config_for(&self, kind: ReservationKind) -> Result<CapacityConfig, EngineError> {
        self.configuration
            .get(kind)
            .ok_or(EngineError::ConfigurationMissing(kind))
    }

    pub async fn get(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.repository.get(id).await
    }

    /// Admin status transition. Cancelling frees the reservation's tables.
    pub async fn set_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let updated = self.repository.set_status(id, status).await?;
        tracing::info!(%id, %status, "reservation status changed");
        Ok(updated)
    }

    pub async fn delete(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let removed = self.repository.delete(id).await?;
        tracing::info!(%id, date = %removed.date, "reservation deleted");
        Ok(removed)
    }
}
