use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use ulid::Ulid;

use reservd::engine::{Engine, EngineError};
use reservd::model::{NewReservation, NewTable, ReservationPatch, ReservationStatus};
use reservd::notify::{NotifyHub, Topic};

const HOUR: i64 = 3_600_000; // 1 hour in ms
const TABLES: u32 = 50;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
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

fn booking(table_number: u32, at: i64) -> NewReservation {
    NewReservation {
        table_number: Some(json!(table_number)),
        client_name: Some("Bench Guest".into()),
        client_phone: Some("555-0000".into()),
        guest_count: Some(json!(2)),
        reservation_time: Some(json!(at)),
        notes: None,
    }
}

fn base_time() -> i64 {
    chrono::Utc::now().timestamp_millis() + 24 * HOUR
}

async fn open_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("reservd_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let engine = Engine::new(dir.join(name), Arc::new(NotifyHub::new())).expect("open store");
    for n in 1..=TABLES {
        let table = NewTable {
            table_number: Some(json!(n)),
            capacity: Some(json!(4)),
            ..Default::default()
        };
        engine.create_table(table).await.expect("create table");
    }
    Arc::new(engine)
}

async fn phase1_sequential(engine: &Engine) {
    let n = 500;
    let base = base_time();
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        // 3h apart on one table: never conflicts
        let at = base + (i as i64) * 3 * HOUR;
        let t = Instant::now();
        engine.create_reservation(booking(1, at)).await.expect("booking");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(engine: Arc<Engine>) {
    let n_tasks = 40;
    let n_per_task = 50;
    let base = base_time();

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let engine = engine.clone();
        // Tasks share tables in pairs so the per-table lock sees contention.
        let table_number = 2 + (task as u32 / 2) % (TABLES - 1);
        let offset = (task % 2) as i64 * HOUR / 2;
        handles.push(tokio::spawn(async move {
            let mut ok = 0u32;
            let mut conflicts = 0u32;
            let mut latencies = Vec::with_capacity(n_per_task);
            for j in 0..n_per_task {
                let at = base + 1_000 * HOUR + (j as i64) * 3 * HOUR + offset;
                let t = Instant::now();
                match engine.create_reservation(booking(table_number, at)).await {
                    Ok(_) => ok += 1,
                    Err(EngineError::SchedulingConflict { .. }) => conflicts += 1,
                    Err(e) => eprintln!("unexpected error: {e}"),
                }
                latencies.push(t.elapsed());
            }
            (ok, conflicts, latencies)
        }));
    }

    let mut ok = 0;
    let mut conflicts = 0;
    let mut latencies = Vec::new();
    for h in handles {
        let (o, c, l) = h.await.expect("task panicked");
        ok += o;
        conflicts += c;
        latencies.extend(l);
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    println!("  accepted={ok}, conflicts={conflicts}");
    print_latency("write latency under contention", &mut latencies);
}

async fn phase3_reads_under_load(engine: Arc<Engine>) {
    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let base = base_time() + 5_000 * HOUR;
            for i in 0..1_000i64 {
                let table_number = (i as u32 % TABLES) + 1;
                let at = base + (i / TABLES as i64) * 3 * HOUR;
                let _ = engine.create_reservation(booking(table_number, at)).await;
            }
        })
    };

    let mut latencies = Vec::new();
    while !writer.is_finished() {
        let t = Instant::now();
        let available = engine.available_tables(2, None);
        latencies.push(t.elapsed());
        std::hint::black_box(available);
        tokio::task::yield_now().await;
    }
    writer.await.expect("writer panicked");
    print_latency("available_tables latency", &mut latencies);
}

async fn phase4_lifecycle_with_listeners(engine: Arc<Engine>) {
    let mut tables_rx = engine.notify.subscribe(Topic::Tables);
    let mut reservations_rx = engine.notify.subscribe(Topic::Reservations);
    let drain = tokio::spawn(async move {
        let mut frames = 0u64;
        loop {
            tokio::select! {
                r = tables_rx.recv() => match r {
                    Ok(_) => frames += 1,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(_) => break,
                },
                r = reservations_rx.recv() => match r {
                    Ok(_) => frames += 1,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(_) => break,
                },
                _ = tokio::time::sleep(Duration::from_millis(500)) => break,
            }
        }
        frames
    });

    let base = base_time() + 20_000 * HOUR;
    let n = 200;
    let mut latencies = Vec::with_capacity(n * 3);
    for i in 0..n {
        let table_number = (i as u32 % TABLES) + 1;
        let at = base + (i as i64 / TABLES as i64) * 3 * HOUR;
        let t = Instant::now();
        let Ok(r) = engine.create_reservation(booking(table_number, at)).await else {
            continue;
        };
        latencies.push(t.elapsed());

        for to in [ReservationStatus::CheckedIn, ReservationStatus::CheckedOut] {
            let patch = ReservationPatch {
                status: Some(to),
                ..Default::default()
            };
            let t = Instant::now();
            engine.update_reservation(r.id, patch).await.expect("transition");
            latencies.push(t.elapsed());
        }
    }

    let frames = drain.await.expect("drain panicked");
    println!("  {frames} snapshot frames received");
    print_latency("mutation latency with listeners", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== reservd stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    let engine = open_engine("phase1.wal").await;
    phase1_sequential(&engine).await;

    println!("\n[phase 2] concurrent bookings with table contention");
    let engine = open_engine("phase2.wal").await;
    phase2_concurrent(engine).await;

    println!("\n[phase 3] read latency under write load");
    let engine = open_engine("phase3.wal").await;
    phase3_reads_under_load(engine).await;

    println!("\n[phase 4] full lifecycle with snapshot listeners");
    let engine = open_engine("phase4.wal").await;
    phase4_lifecycle_with_listeners(engine).await;

    println!("\n=== benchmark complete ===");
}
