use std::time::Duration;

use tokio_util::sync::CancellationToken;

use replay_api::{PublishSink, RawRecord, RecordSource, RecordTransformer, now_ms};

use crate::clock::{Decision, ReplayClock, SkipReason};
use crate::config::{CancelPolicy, ReplayConfig};
use crate::error::SchedulerError;
use crate::timestamp::parse_timestamp;

// ═══════════════════════════════════════════════════════════════
//  Stats / outcome
// ═══════════════════════════════════════════════════════════════

/// Счётчики одного прогона.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Всего прочитано из источника.
    pub read: u64,
    /// Publish завершился успехом.
    pub published: u64,
    /// Publish завершился ошибкой (sink уже исчерпал свои повторы).
    pub failed: u64,
    /// Пропущено до anchor (time-of-day раньше старта).
    pub skipped_before_start: u64,
    /// Пропущено из-за нераспарсенного timestamp.
    pub skipped_unparseable: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Источник исчерпан, все publish завершены.
    Completed(ReplayStats),
    /// Остановлено по cancellation token.
    Cancelled(ReplayStats),
}

impl ReplayOutcome {
    pub fn stats(&self) -> &ReplayStats {
        match self {
            ReplayOutcome::Completed(s) | ReplayOutcome::Cancelled(s) => s,
        }
    }
}

/// Состояние pump loop'а.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Pulling,
    Waiting,
    Publishing,
    Done,
    Cancelled,
    Failed,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler: source → clock → wait → transform → sink
// ═══════════════════════════════════════════════════════════════

/// Timed replay scheduler.
///
/// Один логический поток управления: запись читается, для неё считается
/// задержка, выдерживается пауза, запись трансформируется и публикуется.
/// Следующая запись читается только после того, как publish завершился.
/// В полёте всегда не больше одной записи.
pub struct Scheduler {
    config: ReplayConfig,
    clock: ReplayClock,
    stats: ReplayStats,
    state: PumpState,
}

impl Scheduler {
    pub fn new(config: ReplayConfig) -> Self {
        let clock = ReplayClock::new(&config);
        Self {
            config,
            clock,
            stats: ReplayStats::default(),
            state: PumpState::Idle,
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn clock(&self) -> &ReplayClock {
        &self.clock
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Прогнать источник до конца (или до отмены).
    ///
    /// `Ok(Completed)` — источник исчерпан; `Ok(Cancelled)` — сработал `token`;
    /// `Err(Source)` — ошибка чтения источника, восстановления нет.
    /// Ошибки отдельных publish не останавливают цикл.
    pub async fn run(
        &mut self,
        source: &mut dyn RecordSource,
        transformer: &dyn RecordTransformer,
        sink: &mut dyn PublishSink,
        token: &CancellationToken,
    ) -> Result<ReplayOutcome, SchedulerError> {
        tracing::info!(
            source = %source.describe(),
            started_at = %self.config.started_at(),
            start_time_of_day = %self.clock.start_time_of_day(),
            speed = self.config.speed(),
            max_delay_ms = ?self.config.max_delay().map(|d| d.as_millis()),
            "replay starting"
        );

        loop {
            // ── PULLING ──
            self.state = PumpState::Pulling;
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(self.cancelled()),
                next = source.next_record() => next,
            };
            let record = match next {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    self.state = PumpState::Failed;
                    let position = self.stats.read + 1;
                    tracing::error!(position, error = ?e, "source error");
                    return Err(SchedulerError::Source { position, source: e });
                }
            };
            self.stats.read += 1;

            let Some(delay) = self.schedule(&record) else {
                continue;
            };

            // ── WAITING ──
            if !delay.is_zero() {
                self.state = PumpState::Waiting;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(self.cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            // ── PUBLISHING ──
            self.state = PumpState::Publishing;
            let payload = transformer.transform(&record, now_ms());
            let key = transformer.key(&record);
            let publish = sink.publish(&payload, key.as_deref());
            let outcome = match self.config.cancel_policy() {
                CancelPolicy::Settle => publish.await,
                CancelPolicy::Abandon => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::info!(position = record.position, "in-flight publish abandoned");
                        return Ok(self.cancelled());
                    }
                    outcome = publish => outcome,
                },
            };
            match outcome {
                Ok(()) => self.stats.published += 1,
                Err(e) => {
                    self.stats.failed += 1;
                    tracing::warn!(position = record.position, key = ?key, error = ?e, "publish failed");
                }
            }

            if token.is_cancelled() {
                return Ok(self.cancelled());
            }
        }

        self.state = PumpState::Done;
        self.report_skipped();
        tracing::info!(
            read = self.stats.read,
            published = self.stats.published,
            failed = self.stats.failed,
            skipped_before_start = self.stats.skipped_before_start,
            anchored = self.clock.is_started(),
            "replay finished (EOF)"
        );
        Ok(ReplayOutcome::Completed(self.stats))
    }

    /// Применить clock к записи. None = запись пропускается.
    fn schedule(&mut self, record: &RawRecord) -> Option<Duration> {
        let ts = record.field(self.config.ts_field()).and_then(parse_timestamp);
        match self.clock.observe(ts) {
            Decision::Skip(SkipReason::Unparseable) => {
                self.stats.skipped_unparseable += 1;
                tracing::debug!(position = record.position, field = %self.config.ts_field(), "unparseable timestamp, skipping");
                None
            }
            Decision::Skip(SkipReason::BeforeStart) => {
                self.stats.skipped_before_start += 1;
                None
            }
            Decision::Anchor => {
                tracing::info!(
                    position = record.position,
                    record_ts = ?self.clock.previous_record_time(),
                    skipped = self.stats.skipped_before_start,
                    "anchor record found, replay started"
                );
                Some(Duration::ZERO)
            }
            Decision::Delay(delay) => {
                tracing::debug!(position = record.position, delay_ms = delay.as_millis() as u64, "scheduled");
                Some(delay)
            }
        }
    }

    fn cancelled(&mut self) -> ReplayOutcome {
        self.state = PumpState::Cancelled;
        self.report_skipped();
        tracing::info!(
            read = self.stats.read,
            published = self.stats.published,
            failed = self.stats.failed,
            "replay cancelled"
        );
        ReplayOutcome::Cancelled(self.stats)
    }

    fn report_skipped(&self) {
        if self.stats.skipped_unparseable > 0 {
            tracing::warn!(
                count = self.stats.skipped_unparseable,
                field = %self.config.ts_field(),
                "records dropped: unparseable timestamp"
            );
        }
    }
}
