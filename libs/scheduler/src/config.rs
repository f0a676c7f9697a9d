use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SchedulerError;

/// Поле timestamp по умолчанию.
pub const DEFAULT_TS_FIELD: &str = "time";

/// Что делать с in-flight publish при отмене.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Дождаться завершения текущего publish, затем остановиться.
    #[default]
    Settle,
    /// Бросить текущий publish и остановиться сразу.
    Abandon,
}

/// Неизменяемая конфигурация одного прогона replay.
///
/// Фиксируется при создании scheduler'а: скорость, cap на задержку,
/// момент старта (из него берётся time-of-day для выравнивания).
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    speed: f64,
    max_delay: Option<Duration>,
    started_at: DateTime<Utc>,
    ts_field: String,
    cancel_policy: CancelPolicy,
}

impl ReplayConfig {
    /// `speed`: 1.0 = реальное время, >1 быстрее, <1 медленнее.
    /// `max_delay`: верхняя граница одного ожидания (None = без ограничения).
    pub fn new(
        speed: f64,
        max_delay: Option<Duration>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SchedulerError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "speed must be a positive finite number, got {speed}"
            )));
        }
        Ok(Self {
            speed,
            max_delay,
            started_at,
            ts_field: DEFAULT_TS_FIELD.to_string(),
            cancel_policy: CancelPolicy::default(),
        })
    }

    pub fn with_ts_field(mut self, field: impl Into<String>) -> Self {
        self.ts_field = field.into();
        self
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ts_field(&self) -> &str {
        &self.ts_field
    }

    pub fn cancel_policy(&self) -> CancelPolicy {
        self.cancel_policy
    }
}
