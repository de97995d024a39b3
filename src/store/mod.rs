mod ledger;

pub use ledger::MonthLedger;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;
use ulid::Ulid;

use crate::engine::{check_occupancy, EngineError};
use crate::journal::Journal;
use crate::limits::MAX_RESERVATIONS_PER_MONTH;
use crate::model::*;
use crate::repository::ReservationRepository;

pub type SharedLedger = Arc<RwLock<MonthLedger>>;

// ── Group-commit journal channel ─────────────────────────

enum JournalCommand {
    Append {
        record: JournalRecord,
        ack: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<JournalRecord>,
        ack: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        ack: oneshot::Sender<u64>,
    },
}

type PendingAppend = (JournalRecord, oneshot::Sender<io::Result<()>>);

/// Owns the journal. Appends that queue up while a flush is in progress are
/// written together and share one fsync.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    let mut batch: Vec<PendingAppend> = Vec::new();
    while let Some(first) = rx.recv().await {
        let mut next = Some(first);
        while let Some(cmd) = next {
            match cmd {
                JournalCommand::Append { record, ack } => batch.push((record, ack)),
                control => {
                    // keep ordering: appends queued before a control command land first
                    flush_batch(&mut journal, &mut batch);
                    handle_control(&mut journal, control);
                }
            }
            next = rx.try_recv().ok();
        }
        flush_batch(&mut journal, &mut batch);
    }
}

fn flush_batch(journal: &mut Journal, batch: &mut Vec<PendingAppend>) {
    if batch.is_empty() {
        return;
    }
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    // all or nothing: a failed batch is cut back off the file and every caller in it sees the error
    let result = journal.append_batch(batch.iter().map(|(record, _)| record));

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, ack) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = ack.send(reply);
    }
}

fn handle_control(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { records, ack } => {
            let _ = ack.send(journal.compact(&records));
        }
        JournalCommand::AppendsSinceCompact { ack } => {
            let _ = ack.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Journal-backed reservation store.
///
/// Reservations live in one `MonthLedger` per calendar month. The ledger's
/// write lock is the commit serialization point: every predicate the commit
/// re-checks (quota, exact date, tables, time slots) is scoped to one month.
pub struct ReservationStore {
    ledgers: DashMap<MonthKey, SharedLedger>,
    /// Reservation id → date, to find the owning ledger.
    index: DashMap<Ulid, NaiveDate>,
    journal_tx: mpsc::Sender<JournalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively so no
    /// append can slip between the snapshot and the file swap.
    compaction_gate: RwLock<()>,
}

impl ReservationStore {
    /// Replay the journal at `path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let records = Journal::replay(&path)?;
        let journal = Journal::open(&path)?;

        let mut months: HashMap<MonthKey, MonthLedger> = HashMap::new();
        let index = DashMap::new();
        for record in &records {
            let date = match record {
                JournalRecord::ReservationCreated(r) => {
                    index.insert(r.id, r.date);
                    r.date
                }
                JournalRecord::StatusChanged { date, .. } => *date,
                JournalRecord::ReservationDeleted { id, date } => {
                    index.remove(id);
                    *date
                }
            };
            months.entry(MonthKey::of(date)).or_default().apply(record);
        }
        debug!(records = records.len(), reservations = index.len(), "journal replayed");

        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        Ok(Self {
            ledgers: months
                .into_iter()
                .map(|(key, ledger)| (key, Arc::new(RwLock::new(ledger))))
                .collect(),
            index,
            journal_tx,
            compaction_gate: RwLock::new(()),
        })
    }

    pub fn reservation_count(&self) -> usize {
        self.index.len()
    }

    fn ledger(&self, key: MonthKey) -> SharedLedger {
        self.ledgers.entry(key).or_default().value().clone()
    }

    fn existing_ledger(&self, date: NaiveDate) -> Option<SharedLedger> {
        self.ledgers.get(&MonthKey::of(date)).map(|e| e.value().clone())
    }

    fn locate(&self, id: Ulid) -> Result<(NaiveDate, SharedLedger), EngineError> {
        let date = self
            .index
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let ledger = self.existing_ledger(date).ok_or(EngineError::NotFound(id))?;
        Ok((date, ledger))
    }

    async fn journal_append(&self, record: &JournalRecord) -> Result<(), EngineError> {
        let (ack, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                record: record.clone(),
                ack,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    /// Rewrite the journal as one creation record per stored reservation.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let _exclusive = self.compaction_gate.write().await;

        let mut ledgers: Vec<(MonthKey, SharedLedger)> = self
            .ledgers
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        ledgers.sort_by_key(|(key, _)| *key);

        let mut records = Vec::new();
        for (_, ledger) in ledgers {
            let guard = ledger.read().await;
            records.extend(
                guard
                    .iter()
                    .cloned()
                    .map(JournalRecord::ReservationCreated),
            );
        }

        let (ack, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { records, ack })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (ack, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { ack })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ReservationRepository for ReservationStore {
    async fn find_active_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, EngineError> {
        let Some(ledger) = self.existing_ledger(date) else {
            return Ok(Vec::new());
        };
        let guard = ledger.read().await;
        Ok(guard.active_on(date).cloned().collect())
    }

    async fn find_active_by_month(
        &self,
        year: i32,
        month: u32,
        kind: ReservationKind,
    ) -> Result<Vec<Reservation>, EngineError> {
        let Some(ledger) = self.ledgers.get(&MonthKey { year, month }).map(|e| e.value().clone())
        else {
            return Ok(Vec::new());
        };
        let guard = ledger.read().await;
        Ok(guard.active_of_kind(kind).cloned().collect())
    }

    async fn find_active_by_exact_date(
        &self,
        date: NaiveDate,
        kind: ReservationKind,
    ) -> Result<Option<Reservation>, EngineError> {
        let Some(ledger) = self.existing_ledger(date) else {
            return Ok(None);
        };
        let guard = ledger.read().await;
        Ok(guard.active_on(date).find(|r| r.kind == kind).cloned())
    }

    async fn insert_if_capacity_holds(
        &self,
        validated: &ValidatedReservation,
        config: &CapacityConfig,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let ledger = self.ledger(MonthKey::of(validated.date));
        let mut guard = ledger.write().await;
        if guard.len() >= MAX_RESERVATIONS_PER_MONTH {
            return Err(EngineError::LimitExceeded("too many reservations in month"));
        }

        check_occupancy(config, validated, &guard.snapshot(validated))?;

        let reservation = validated.clone().into_reservation(Ulid::new(), Utc::now());
        let record = JournalRecord::ReservationCreated(reservation.clone());
        self.journal_append(&record).await?;
        guard.apply(&record);
        self.index.insert(reservation.id, reservation.date);
        Ok(reservation)
    }

    async fn get(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let (date, ledger) = self.locate(id)?;
        let guard = ledger.read().await;
        guard.get(date, id).cloned().ok_or(EngineError::NotFound(id))
    }

    async fn set_status(&self, id: Ulid, status: ReservationStatus) -> Result<Reservation, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (date, ledger) = self.locate(id)?;
        let mut guard = ledger.write().await;
        let current = guard.get(date, id).ok_or(EngineError::NotFound(id))?.status;
        if !current.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let record = JournalRecord::StatusChanged { id, date, status };
        self.journal_append(&record).await?;
        guard.apply(&record);
        guard.get(date, id).cloned().ok_or(EngineError::NotFound(id))
    }

    async fn delete(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (date, ledger) = self.locate(id)?;
        let mut guard = ledger.write().await;
        if guard.get(date, id).is_none() {
            return Err(EngineError::NotFound(id));
        }

        let record = JournalRecord::ReservationDeleted { id, date };
        self.journal_append(&record).await?;
        let removed = guard.remove(date, id).ok_or(EngineError::NotFound(id))?;
        self.index.remove(&id);
        Ok(removed)
    }
}
