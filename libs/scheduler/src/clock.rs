use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

use crate::config::ReplayConfig;

// ═══════════════════════════════════════════════════════════════
//  Time of day
// ═══════════════════════════════════════════════════════════════

/// Время суток (часы/минуты/секунды/доли) без даты, в UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn of(ts: &DateTime<Utc>) -> Self {
        Self(ts.time())
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%H:%M:%S%.3f"))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Decision
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Timestamp не распарсился — запись выбрасывается, состояние не меняется.
    Unparseable,
    /// Replay ещё не догнал текущее время суток.
    BeforeStart,
}

/// Решение clock'а по одной записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    /// Первая запись с time-of-day >= старта. Публикуется без ожидания.
    Anchor,
    /// Обычная запись: ждать столько перед публикацией.
    Delay(Duration),
}

// ═══════════════════════════════════════════════════════════════
//  ReplayClock
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
enum ClockState {
    Aligning,
    Started { previous: DateTime<Utc> },
}

/// Состояние таймингов replay: выравнивание старта + расчёт задержек.
///
/// Мутируется только pump loop'ом. Из `Aligning` в `Started` переходит
/// ровно один раз и обратно не возвращается.
#[derive(Debug, Clone)]
pub struct ReplayClock {
    start: TimeOfDay,
    speed: f64,
    max_delay: Option<Duration>,
    state: ClockState,
}

impl ReplayClock {
    pub fn new(config: &ReplayConfig) -> Self {
        Self {
            start: TimeOfDay::of(&config.started_at()),
            speed: config.speed(),
            max_delay: config.max_delay(),
            state: ClockState::Aligning,
        }
    }

    pub fn start_time_of_day(&self) -> TimeOfDay {
        self.start
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, ClockState::Started { .. })
    }

    /// Timestamp последней опубликованной (или публикуемой) записи.
    pub fn previous_record_time(&self) -> Option<DateTime<Utc>> {
        match self.state {
            ClockState::Aligning => None,
            ClockState::Started { previous } => Some(previous),
        }
    }

    /// Учесть очередную запись и решить, что с ней делать.
    ///
    /// `previous` обновляется ДО ожидания: задержка всегда считается
    /// относительно непосредственного предшественника в источнике.
    pub fn observe(&mut self, ts: Option<DateTime<Utc>>) -> Decision {
        let Some(ts) = ts else {
            return Decision::Skip(SkipReason::Unparseable);
        };

        match self.state {
            ClockState::Aligning => {
                if TimeOfDay::of(&ts) < self.start {
                    return Decision::Skip(SkipReason::BeforeStart);
                }
                self.state = ClockState::Started { previous: ts };
                Decision::Anchor
            }
            ClockState::Started { previous } => {
                self.state = ClockState::Started { previous: ts };
                Decision::Delay(scaled_delay(ts - previous, self.speed, self.max_delay))
            }
        }
    }
}

/// `min(max(0, delta) / speed, max_delay)`.
///
/// Отрицательные дельты (out-of-order, дубликаты) дают нулевое ожидание.
pub fn scaled_delay(delta: TimeDelta, speed: f64, max_delay: Option<Duration>) -> Duration {
    let delta = delta.to_std().unwrap_or(Duration::ZERO);
    let scaled = Duration::try_from_secs_f64(delta.as_secs_f64() / speed).unwrap_or(Duration::MAX);
    match max_delay {
        Some(cap) => scaled.min(cap),
        None => scaled,
    }
}
