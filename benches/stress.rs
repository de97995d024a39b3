use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
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

const CLIENTS: usize = 64;
const REQUESTS_PER_CLIENT: usize = 50;
const DAYS: u64 = 14;
const TABLES_PER_DAY: u32 = 40;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: n=0");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn start_server() -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");

    let dir = std::env::temp_dir().join(format!("covers_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create data dir");
    let store = ReservationStore::open(dir.join("reservations.journal")).expect("open store");

    let mut table = CapacityTable::with_defaults();
    table
        .set(
            ReservationKind::Group,
            CapacityConfig {
                min_days_prior: 1,
                min_guests: 1,
                max_guests: Some(60),
                table_size: 6,
                max_tables_per_day: TABLES_PER_DAY,
                monthly_quota: None,
                exclusive_date: false,
            },
        )
        .expect("valid config");

    let engine = Arc::new(Engine::new(
        Arc::new(table),
        Arc::new(BlackoutList::new()),
        Arc::new(store),
        Tz::UTC,
    ));

    let server_engine = engine.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let engine = server_engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });
    (addr, engine)
}

fn target_date(offset: u64) -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_add_days(Days::new(2 + offset))
        .expect("date in range")
}

#[derive(Default)]
struct ClientStats {
    booked: usize,
    rejected: usize,
    latencies: Vec<Duration>,
}

async fn run_client(addr: SocketAddr, seed: usize) -> ClientStats {
    let socket = TcpStream::connect(addr).await.expect("connect failed");
    let mut framed = Framed::new(socket, LinesCodec::new());
    let mut stats = ClientStats::default();

    for i in 0..REQUESTS_PER_CLIENT {
        let n = seed * REQUESTS_PER_CLIENT + i;
        let date = target_date((n as u64) % DAYS);
        let party_size = 1 + (n % 18) as u32;
        let request = json!({
            "op": "book",
            "request": { "kind": "group", "date": date.to_string(), "party_size": party_size }
        });

        let started = Instant::now();
        framed.send(request.to_string()).await.expect("send failed");
        let line = framed.next().await.expect("connection closed").expect("read failed");
        stats.latencies.push(started.elapsed());

        let resp: Value = serde_json::from_str(&line).expect("bad response");
        if resp["ok"] == true {
            stats.booked += 1;
        } else {
            assert_eq!(resp["error"]["kind"], "InsufficientCapacity", "{resp}");
            stats.rejected += 1;
        }
    }
    stats
}

#[tokio::main]
async fn main() {
    let (addr, engine) = start_server().await;
    println!("covers stress: {CLIENTS} clients × {REQUESTS_PER_CLIENT} bookings over {DAYS} days");

    let started = Instant::now();
    let handles: Vec<_> = (0..CLIENTS)
        .map(|seed| tokio::spawn(run_client(addr, seed)))
        .collect();

    let mut booked = 0;
    let mut rejected = 0;
    let mut latencies = Vec::new();
    for h in handles {
        let stats = h.await.expect("client panicked");
        booked += stats.booked;
        rejected += stats.rejected;
        latencies.extend(stats.latencies);
    }
    let elapsed = started.elapsed();

    println!(
        "  {} requests in {:.2}s ({:.0} req/s), booked={booked}, rejected={rejected}",
        latencies.len(),
        elapsed.as_secs_f64(),
        latencies.len() as f64 / elapsed.as_secs_f64(),
    );
    print_latency("book", &mut latencies);

    // no day may end up over capacity
    for offset in 0..DAYS {
        let date = target_date(offset);
        let info = engine
            .remaining_capacity(ReservationKind::Group, date)
            .await
            .expect("capacity query");
        assert!(
            info.remaining >= 0,
            "{date} overbooked: {} of {} tables",
            info.tables_consumed,
            info.max_tables
        );
    }
    println!("  no overbooking across {DAYS} days");
}
