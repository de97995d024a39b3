use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Days, Utc};
use chrono_tz::Tz;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use covers::engine::Engine;
use covers::model::{CapacityConfig, ReservationKind};
use covers::policy::{BlackoutList, CapacityTable};
use covers::store::ReservationStore;
use covers::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(group: CapacityConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("covers_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = ReservationStore::open(dir.join("reservations.journal")).unwrap();

    let mut table = CapacityTable::with_defaults();
    table.set(ReservationKind::Group, group).unwrap();
    let mut blackouts = BlackoutList::new();
    blackouts.insert(far_date(40), "Private event");

    let engine = Arc::new(Engine::new(
        Arc::new(table),
        Arc::new(blackouts),
        Arc::new(store),
        Tz::UTC,
    ));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    addr
}

/// A date `days` ahead of today, so advance-notice rules pass.
fn far_date(days: u64) -> chrono::NaiveDate {
    Utc::now().date_naive().checked_add_days(Days::new(days)).unwrap()
}

fn small_group_config() -> CapacityConfig {
    CapacityConfig {
        min_days_prior: 1,
        min_guests: 1,
        max_guests: Some(60),
        table_size: 6,
        max_tables_per_day: 2,
        monthly_quota: None,
        exclusive_date: false,
    }
}

struct Client {
    framed: Framed<TcpStream, LinesCodec>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(socket, LinesCodec::new()),
        }
    }

    async fn call(&mut self, request: Value) -> Value {
        self.framed.send(request.to_string()).await.unwrap();
        let line = self.framed.next().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }
}

fn book_group(date: chrono::NaiveDate, party_size: u32) -> Value {
    json!({
        "op": "book",
        "request": { "kind": "group", "date": date.to_string(), "party_size": party_size }
    })
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_lifecycle_over_the_wire() {
    let addr = start_test_server(small_group_config()).await;
    let mut client = Client::connect(addr).await;
    let date = far_date(30);

    let resp = client.call(book_group(date, 12)).await;
    assert_eq!(resp["ok"], true, "{resp}");
    let id = resp["reservation"]["id"].as_str().unwrap().to_string();

    // day is full: 2 of 2 tables
    let resp = client.call(book_group(date, 1)).await;
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["kind"], "InsufficientCapacity");

    let resp = client
        .call(json!({ "op": "set_status", "id": id, "status": "cancelled" }))
        .await;
    assert_eq!(resp["reservation"]["status"], "cancelled");

    let resp = client
        .call(json!({ "op": "capacity", "kind": "group", "date": date.to_string() }))
        .await;
    assert_eq!(resp["capacity"]["remaining"], 2);

    let resp = client.call(book_group(date, 1)).await;
    assert_eq!(resp["ok"], true);

    let resp = client.call(json!({ "op": "delete", "id": id })).await;
    assert_eq!(resp["ok"], true);
    let resp = client.call(json!({ "op": "get", "id": id })).await;
    assert_eq!(resp["error"]["kind"], "NotFound");
}

#[tokio::test]
async fn validate_reports_rejections() {
    let addr = start_test_server(small_group_config()).await;
    let mut client = Client::connect(addr).await;

    let resp = client
        .call(json!({
            "op": "validate",
            "request": { "kind": "group", "date": far_date(40).to_string(), "party_size": 8 }
        }))
        .await;
    assert_eq!(resp["error"]["kind"], "DateBlackout");
    assert!(resp["error"]["message"].as_str().unwrap().contains("Private event"));

    let resp = client
        .call(json!({
            "op": "validate",
            "request": {
                "kind": "event", "date": far_date(60).to_string(),
                "start_time": "7:00 PM", "end_time": "10:00 PM", "party_size": 40
            }
        }))
        .await;
    assert_eq!(resp["ok"], true, "{resp}");
    assert_eq!(resp["validated"]["tables_required"], 7);
    assert_eq!(resp["validated"]["slot"]["start"], "7:00 PM");

    let resp = client.call(json!({ "op": "nonsense" })).await;
    assert_eq!(resp["error"]["kind"], "BadRequest");
}

#[tokio::test]
async fn concurrent_clients_do_not_overbook() {
    let addr = start_test_server(small_group_config()).await;
    let date = far_date(20);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            tokio::spawn(async move {
                let mut client = Client::connect(addr).await;
                client.call(book_group(date, 6)).await
            })
        })
        .collect();

    let mut ok = 0;
    for h in handles {
        let resp = h.await.unwrap();
        if resp["ok"] == true {
            ok += 1;
        } else {
            assert_eq!(resp["error"]["kind"], "InsufficientCapacity");
        }
    }
    assert_eq!(ok, 2);
}
