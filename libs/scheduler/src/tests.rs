//! Pump loop tests. Timing is measured in paused tokio time.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use replay_api::{PublishSink, RawRecord, RecordSource, RecordTransformer, StageError};

use super::*;

// ═══════════════════════════════════════════════════════════════
//  Fixtures
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Pull(u64),
    PublishStart(u64),
    PublishEnd(u64),
}

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    fn push(&self, e: Event) {
        self.0.lock().unwrap().push(e);
    }

    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

struct VecSource {
    items: VecDeque<Result<RawRecord, StageError>>,
    log: Log,
}

impl VecSource {
    fn new(items: Vec<Result<RawRecord, StageError>>, log: &Log) -> Self {
        Self { items: items.into(), log: log.clone() }
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<RawRecord>, StageError>> + Send + '_>> {
        let next = self.items.pop_front();
        let log = self.log.clone();
        Box::pin(async move {
            match next {
                Some(Ok(record)) => {
                    log.push(Event::Pull(record.position));
                    Ok(Some(record))
                }
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        })
    }
}

struct Passthrough;

impl RecordTransformer for Passthrough {
    fn transform(&self, record: &RawRecord, publish_ts_ms: i64) -> serde_json::Value {
        json!({ "position": record.position, "fields": record.fields, "published_at": publish_ts_ms })
    }

    fn key(&self, record: &RawRecord) -> Option<String> {
        record.field_str("id").map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Published {
    position: u64,
    key: Option<String>,
    at: Duration,
}

struct RecordingSink {
    log: Log,
    origin: Instant,
    latency: Duration,
    fail_on: Vec<u64>,
    published: Vec<Published>,
}

impl RecordingSink {
    fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            origin: Instant::now(),
            latency: Duration::ZERO,
            fail_on: Vec::new(),
            published: Vec::new(),
        }
    }

    fn at_ms(&self) -> Vec<u128> {
        self.published.iter().map(|p| p.at.as_millis()).collect()
    }

    fn positions(&self) -> Vec<u64> {
        self.published.iter().map(|p| p.position).collect()
    }
}

impl PublishSink for RecordingSink {
    fn publish<'a>(
        &'a mut self,
        payload: &'a serde_json::Value,
        key: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>> {
        Box::pin(async move {
            let position = payload["position"].as_u64().unwrap_or(0);
            self.log.push(Event::PublishStart(position));
            self.published.push(Published {
                position,
                key: key.map(str::to_string),
                at: self.origin.elapsed(),
            });
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.log.push(Event::PublishEnd(position));
            if self.fail_on.contains(&position) {
                return Err(StageError::io("broker unavailable"));
            }
            Ok(())
        })
    }

    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

fn rec(position: u64, time: &str) -> Result<RawRecord, StageError> {
    let mut fields = serde_json::Map::new();
    fields.insert("time".into(), json!(time));
    fields.insert("id".into(), json!(format!("ac{position}")));
    Ok(RawRecord::new(position, fields))
}

/// Старт "сейчас" в заданное время суток (дата отличается от записей).
fn started(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 15, h, m, s).unwrap()
}

fn scheduler(speed: f64, max_delay_ms: Option<u64>, start: DateTime<Utc>) -> Scheduler {
    let cfg = ReplayConfig::new(speed, max_delay_ms.map(Duration::from_millis), start).unwrap();
    Scheduler::new(cfg)
}

fn sample() -> Vec<Result<RawRecord, StageError>> {
    vec![
        rec(1, "2025-11-01 00:00:04"),
        rec(2, "2025-11-01 00:00:04"),
        rec(3, "2025-11-01 00:00:09"),
    ]
}

// ═══════════════════════════════════════════════════════════════
//  Timing
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn replays_recorded_gaps() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, Some(10_000), started(0, 0, 0));

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, ReplayOutcome::Completed(_)));
    assert_eq!(sink.positions(), vec![1, 2, 3]);
    assert_eq!(sink.at_ms(), vec![0, 0, 5000]);
    assert_eq!(outcome.stats().published, 3);
    assert_eq!(s.state(), PumpState::Done);
}

#[tokio::test(start_paused = true)]
async fn speed_factor_divides_gaps() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(2.0, Some(10_000), started(0, 0, 0));

    s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(sink.at_ms(), vec![0, 0, 2500]);
}

#[tokio::test(start_paused = true)]
async fn max_delay_caps_long_gaps() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, Some(1000), started(0, 0, 0));

    s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(sink.at_ms(), vec![0, 0, 1000]);
}

#[tokio::test(start_paused = true)]
async fn without_cap_waits_full_gap() {
    let log = Log::default();
    let records = vec![rec(1, "2025-11-01 00:00:00"), rec(2, "2025-11-01 00:10:00")];
    let mut source = VecSource::new(records, &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, None, started(0, 0, 0));

    s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(sink.at_ms(), vec![0, 600_000]);
}

#[tokio::test(start_paused = true)]
async fn out_of_order_records_do_not_wait() {
    let log = Log::default();
    let records = vec![
        rec(1, "2025-11-01 00:00:10"),
        rec(2, "2025-11-01 00:00:05"),
        rec(3, "2025-11-01 00:00:07"),
    ];
    let mut source = VecSource::new(records, &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, None, started(0, 0, 0));

    s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    // 2 идёт сразу (дельта < 0), 3 ждёт 2с от своего непосредственного предшественника.
    assert_eq!(sink.at_ms(), vec![0, 0, 2000]);
}

// ═══════════════════════════════════════════════════════════════
//  Alignment and skipping
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn skips_records_before_current_time_of_day() {
    let log = Log::default();
    let records = vec![
        rec(1, "2025-11-01 09:59:58"),
        rec(2, "2025-11-01 09:59:59.999"),
        rec(3, "2025-11-01 10:00:00"),
        rec(4, "2025-11-01 10:00:03"),
    ];
    let mut source = VecSource::new(records, &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, Some(10_000), started(10, 0, 0));

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(sink.positions(), vec![3, 4]);
    assert_eq!(sink.at_ms(), vec![0, 3000]);
    assert_eq!(outcome.stats().skipped_before_start, 2);
    assert!(s.clock().is_started());
}

#[tokio::test(start_paused = true)]
async fn day_entirely_in_the_past_publishes_nothing() {
    let log = Log::default();
    let records = vec![rec(1, "2025-11-01 01:00:00"), rec(2, "2025-11-01 02:00:00")];
    let mut source = VecSource::new(records, &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, None, started(23, 0, 0));

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(
        outcome,
        ReplayOutcome::Completed(ReplayStats { read: 2, skipped_before_start: 2, ..Default::default() })
    );
    assert!(sink.published.is_empty());
    assert!(!s.clock().is_started());
}

#[tokio::test(start_paused = true)]
async fn bad_timestamps_are_ignored() {
    let log = Log::default();
    let records = vec![
        rec(1, "not-a-date"),
        rec(2, "2025-11-01 00:00:04"),
        rec(3, "not-a-date"),
        rec(4, "2025-11-01 00:00:09"),
    ];
    let mut source = VecSource::new(records, &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, Some(10_000), started(0, 0, 0));

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(sink.positions(), vec![2, 4]);
    assert_eq!(sink.at_ms(), vec![0, 5000]);
    assert_eq!(outcome.stats().skipped_unparseable, 2);
    assert_eq!(outcome.stats().read, 4);
}

#[tokio::test(start_paused = true)]
async fn custom_timestamp_field() {
    let log = Log::default();
    let mut fields = serde_json::Map::new();
    fields.insert("seen_at".into(), json!("2025-11-01 00:00:01"));
    let records = vec![Ok(RawRecord::new(1, fields))];
    let mut source = VecSource::new(records, &log);
    let mut sink = RecordingSink::new(&log);
    let cfg = ReplayConfig::new(1.0, None, started(0, 0, 0)).unwrap().with_ts_field("seen_at");
    let mut s = Scheduler::new(cfg);

    s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(sink.positions(), vec![1]);
}

// ═══════════════════════════════════════════════════════════════
//  Ordering, backpressure, failures
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn never_pulls_while_publish_in_flight() {
    let log = Log::default();
    let records = (1..=5).map(|i| rec(i, &format!("2025-11-01 00:00:0{i}"))).collect();
    let mut source = VecSource::new(records, &log);
    let mut sink = RecordingSink::new(&log);
    sink.latency = Duration::from_millis(300);
    let mut s = scheduler(1.0, None, started(0, 0, 0));

    s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    let mut expected = Vec::new();
    for i in 1..=5 {
        expected.extend([Event::Pull(i), Event::PublishStart(i), Event::PublishEnd(i)]);
    }
    assert_eq!(log.events(), expected);
    assert_eq!(sink.positions(), vec![1, 2, 3, 4, 5]);
    // Задержка идёт от записанного времени, поверх неё — латентность publish.
    assert_eq!(sink.at_ms(), vec![0, 1300, 2600, 3900, 5200]);
}

#[tokio::test(start_paused = true)]
async fn publish_failure_does_not_stop_the_loop() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    sink.fail_on = vec![2];
    let mut s = scheduler(1.0, None, started(0, 0, 0));

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(sink.positions(), vec![1, 2, 3]);
    assert_eq!(outcome.stats().published, 2);
    assert_eq!(outcome.stats().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn keys_come_from_transformer() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, None, started(0, 0, 0));

    s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap();

    let keys: Vec<_> = sink.published.iter().map(|p| p.key.clone()).collect();
    assert_eq!(keys, vec![Some("ac1".into()), Some("ac2".into()), Some("ac3".into())]);
}

#[tokio::test(start_paused = true)]
async fn source_error_is_fatal() {
    let log = Log::default();
    let records = vec![
        rec(1, "2025-11-01 00:00:01"),
        Err(StageError::io("disk on fire")),
        rec(3, "2025-11-01 00:00:02"),
    ];
    let mut source = VecSource::new(records, &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, None, started(0, 0, 0));

    let err = s.run(&mut source, &Passthrough, &mut sink, &CancellationToken::new()).await.unwrap_err();

    match err {
        SchedulerError::Source { position, source } => {
            assert_eq!(position, 2);
            assert_eq!(source.message(), "disk on fire");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(sink.positions(), vec![1]);
    assert_eq!(s.state(), PumpState::Failed);
}

// ═══════════════════════════════════════════════════════════════
//  Cancellation
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_wait() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, None, started(0, 0, 0));
    let token = CancellationToken::new();
    let origin = Instant::now();

    let t = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        t.cancel();
    });

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &token).await.unwrap();

    assert!(matches!(outcome, ReplayOutcome::Cancelled(_)));
    assert_eq!(sink.positions(), vec![1, 2]);
    assert!(origin.elapsed() < Duration::from_secs(5));
    assert_eq!(s.state(), PumpState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancel_before_start_pulls_nothing() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    let mut s = scheduler(1.0, None, started(0, 0, 0));
    let token = CancellationToken::new();
    token.cancel();

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &token).await.unwrap();

    assert_eq!(outcome, ReplayOutcome::Cancelled(ReplayStats::default()));
    assert!(log.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn settle_policy_lets_in_flight_publish_finish() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    sink.latency = Duration::from_secs(2);
    let mut s = scheduler(1.0, None, started(0, 0, 0));
    let token = CancellationToken::new();

    let t = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        t.cancel();
    });

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &token).await.unwrap();

    assert_eq!(outcome.stats().published, 1);
    assert_eq!(log.events(), vec![Event::Pull(1), Event::PublishStart(1), Event::PublishEnd(1)]);
}

#[tokio::test(start_paused = true)]
async fn abandon_policy_drops_in_flight_publish() {
    let log = Log::default();
    let mut source = VecSource::new(sample(), &log);
    let mut sink = RecordingSink::new(&log);
    sink.latency = Duration::from_secs(2);
    let cfg = ReplayConfig::new(1.0, None, started(0, 0, 0))
        .unwrap()
        .with_cancel_policy(CancelPolicy::Abandon);
    let mut s = Scheduler::new(cfg);
    let token = CancellationToken::new();

    let t = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        t.cancel();
    });

    let outcome = s.run(&mut source, &Passthrough, &mut sink, &token).await.unwrap();

    assert!(matches!(outcome, ReplayOutcome::Cancelled(_)));
    assert_eq!(outcome.stats().published, 0);
    assert_eq!(log.events(), vec![Event::Pull(1), Event::PublishStart(1)]);
}
