use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use codec_avro::RegistryAuth;

use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Sink Config
// ═══════════════════════════════════════════════════════════════

/// Конфигурация sink'а: transport + framing + codec, по имени встроенной
/// реализации и её собственному конфигу.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_name")]
    pub name: String,
    /// Логический topic. Из него выводится subject registry: `<topic>-value`.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// `tcp-client` | `stdout`.
    #[serde(default = "default_transport")]
    pub transport: String,
    pub transport_config: Option<toml::Value>,
    /// `length-prefixed` | `lines`.
    #[serde(default = "default_framing")]
    pub framing: String,
    pub framing_config: Option<toml::Value>,
    /// `avro` | `json`.
    #[serde(default = "default_codec")]
    pub codec: String,
    pub codec_config: Option<toml::Value>,

    /// Писать ключ партиции отдельным фреймом перед значением.
    #[serde(default = "default_include_key")]
    pub include_key: bool,

    // --- Retry ---
    /// Сколько раз повторять publish после транзиентной (Io) ошибки.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: default_sink_name(),
            topic: default_topic(),
            transport: default_transport(),
            transport_config: None,
            framing: default_framing(),
            framing_config: None,
            codec: default_codec(),
            codec_config: None,
            include_key: default_include_key(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
        }
    }
}

impl SinkConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            base: Duration::from_millis(self.retry_backoff_ms),
            max: Duration::from_millis(self.max_retry_backoff_ms.max(self.retry_backoff_ms)),
        }
    }

    /// Subject по умолчанию для value-схемы topic'а.
    pub fn value_subject(&self) -> String {
        format!("{}-value", self.topic)
    }
}

fn default_sink_name() -> String {
    "replay".into()
}
fn default_topic() -> String {
    "adsb-operations".into()
}
fn default_transport() -> String {
    "tcp-client".into()
}
fn default_framing() -> String {
    "length-prefixed".into()
}
fn default_codec() -> String {
    "avro".into()
}
fn default_include_key() -> bool {
    true
}
fn default_retries() -> u32 {
    10
}
fn default_retry_backoff_ms() -> u64 {
    300
}
fn default_max_retry_backoff_ms() -> u64 {
    30_000
}

// ═══════════════════════════════════════════════════════════════
//  Schema Registry
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Явный subject (по умолчанию `<topic>-value`).
    pub subject: Option<String>,
}

impl RegistryConfig {
    pub fn auth(&self) -> Option<RegistryAuth> {
        self.username.as_ref().map(|username| RegistryAuth {
            username: username.clone(),
            password: self.password.clone(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Retry policy
// ═══════════════════════════════════════════════════════════════

/// Экспоненциальный backoff: `base * 2^(attempt-1)`, не больше `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        SinkConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Пауза перед повтором номер `attempt` (с 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

/// Типизированный конфиг стадии; отсутствующий = `Default`.
pub(crate) fn parse_stage_config<T: DeserializeOwned + Default>(
    stage: &str,
    val: &Option<toml::Value>,
) -> Result<T, PipelineError> {
    match val {
        Some(v) => parse_required(stage, v),
        None => Ok(T::default()),
    }
}

pub(crate) fn parse_required<T: DeserializeOwned>(stage: &str, val: &toml::Value) -> Result<T, PipelineError> {
    val.clone()
        .try_into()
        .map_err(|e| PipelineError::Config(format!("{stage}_config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_table() {
        let cfg: SinkConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.transport, "tcp-client");
        assert_eq!(cfg.framing, "length-prefixed");
        assert_eq!(cfg.codec, "avro");
        assert_eq!(cfg.retries, 10);
        assert_eq!(cfg.value_subject(), "adsb-operations-value");
        assert!(cfg.include_key);
    }

    #[test]
    fn nested_stage_configs_stay_raw() {
        let cfg: SinkConfig = toml::from_str(
            r#"
            transport = "tcp-client"
            transport_config = { host = "127.0.0.1", port = 9092 }
            codec = "json"
            "#,
        )
        .unwrap();
        let port = cfg.transport_config.as_ref().and_then(|v| v.get("port")).and_then(|v| v.as_integer());
        assert_eq!(port, Some(9092));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy { retries: 10, base: Duration::from_millis(300), max: Duration::from_secs(1) };
        assert_eq!(p.backoff(1), Duration::from_millis(300));
        assert_eq!(p.backoff(2), Duration::from_millis(600));
        assert_eq!(p.backoff(3), Duration::from_secs(1));
        assert_eq!(p.backoff(64), Duration::from_secs(1));
    }

    #[test]
    fn registry_auth_requires_username() {
        let mut reg = RegistryConfig { url: "http://sr:8081".into(), ..Default::default() };
        assert!(reg.auth().is_none());
        reg.username = Some("u".into());
        assert_eq!(reg.auth().map(|a| a.username), Some("u".to_string()));
    }
}
