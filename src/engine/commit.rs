use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::limits::MAX_COMMIT_ATTEMPTS;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Persist a validated reservation.
    ///
    /// The repository re-checks the capacity predicate under the month lock.
    /// When another commit got there first, the request is validated again
    /// against fresh state (same reference time) and retried, up to
    /// `MAX_COMMIT_ATTEMPTS`; the last rejection is returned after that.
    pub async fn commit(&self, validated: ValidatedReservation) -> Result<Reservation, EngineError> {
        let mut candidate = validated;
        let mut attempt = 1;
        loop {
            let config = self.config_for(candidate.kind)?;
            match self
                .repository
                .insert_if_capacity_holds(&candidate, &config)
                .await
            {
                Ok(reservation) => {
                    metrics::counter!(
                        crate::observability::COMMITS_TOTAL,
                        "kind" => reservation.kind.to_string()
                    )
                    .increment(1);
                    info!(
                        id = %reservation.id,
                        kind = %reservation.kind,
                        date = %reservation.date,
                        party_size = reservation.party_size,
                        "reservation committed"
                    );
                    return Ok(reservation);
                }
                Err(EngineError::Rejected(reason)) => {
                    metrics::counter!(crate::observability::COMMIT_RACES_TOTAL).increment(1);
                    if attempt >= MAX_COMMIT_ATTEMPTS {
                        warn!(date = %candidate.date, attempt, "giving up commit: {reason}");
                        return Err(EngineError::Rejected(reason));
                    }
                    debug!(date = %candidate.date, attempt, "commit lost race ({reason}), revalidating");
                    candidate = self
                        .validate(candidate.request.clone(), candidate.validated_at)
                        .await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate and commit in one call.
    pub async fn book(
        &self,
        request: ReservationRequest,
        now: DateTime<Utc>,
    ) -> Result<Reservation, EngineError> {
        let validated = self.validate(request, now).await?;
        self.commit(validated).await
    }
}
