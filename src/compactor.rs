use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::store::ReservationStore;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task: compact the journal once `threshold` appends pile up.
pub async fn run_compactor(store: Arc<ReservationStore>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_due(store: &ReservationStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!(appends, live = store.reservation_count(), "journal compacted");
            true
        }
        Err(e) => {
            warn!("journal compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::path::PathBuf;

    use crate::model::*;
    use crate::repository::ReservationRepository;

    fn test_journal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("covers_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let store = ReservationStore::open(test_journal_path("threshold.journal")).unwrap();
        let config = CapacityConfig::default_group();
        let date = NaiveDate::from_ymd_opt(2025, 8, 8).unwrap();
        let request = ReservationRequest {
            kind: ReservationKind::Group,
            date: date.to_string(),
            start_time: None,
            end_time: None,
            duration_hours: None,
            party_size: 8,
            label: None,
        };
        let validated = ValidatedReservation {
            request,
            kind: ReservationKind::Group,
            date,
            slot: None,
            end_time_derived: false,
            party_size: 8,
            tables_required: 2,
            validated_at: Utc::now(),
        };

        let r = store.insert_if_capacity_holds(&validated, &config).await.unwrap();
        store.set_status(r.id, ReservationStatus::Confirmed).await.unwrap();

        assert!(!compact_if_due(&store, 3).await);
        assert_eq!(store.appends_since_compact().await, 2);

        assert!(compact_if_due(&store, 2).await);
        assert_eq!(store.appends_since_compact().await, 0);
        assert_eq!(store.get(r.id).await.unwrap().status, ReservationStatus::Confirmed);
    }
}
