use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;

use codec_csv::CsvSourceConfig;
use pipeline::{RegistryConfig, SinkConfig};
use scheduler::{CancelPolicy, ReplayConfig};

use super::error::ReplayerError;

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub replay: ReplaySection,
    pub source: CsvSourceConfig,
    pub sink: SinkConfig,
    pub schema_registry: Option<RegistryConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplaySection {
    pub file: Option<String>,
    pub speed: Option<f64>,
    /// 0 = без ограничения.
    pub max_delay_ms: Option<u64>,
    pub ts_field: Option<String>,
    pub key_field: Option<String>,
    pub cancel_policy: Option<CancelPolicy>,
    pub shutdown_timeout_ms: Option<u64>,
}

pub fn load_config(path: &str) -> Result<Config, ReplayerError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ReplayerError::Config(format!("cannot read config {path}: {e}")))?;
    toml::from_str(&content).map_err(|e| ReplayerError::Config(format!("bad config {path}: {e}")))
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct ReplayArgs {
    /// Путь к config.toml
    #[arg(long, default_value = "config.toml", env = "OPS_REPLAY_CONFIG")]
    pub config: String,

    /// CSV-файл с операциями
    #[arg(long, env = "REPLAY_FILE")]
    pub file: Option<String>,

    /// Множитель скорости (2 = вдвое быстрее, 0.5 = медленнее)
    #[arg(long, env = "REPLAY_SPEED")]
    pub speed: Option<f64>,

    /// Потолок паузы между записями в мс (0 = без потолка)
    #[arg(long, env = "REPLAY_MAX_DELAY_MS")]
    pub max_delay_ms: Option<u64>,

    /// Не ограничивать паузы между записями
    #[arg(long, conflicts_with = "max_delay_ms")]
    pub no_max_delay: bool,

    /// Topic (subject в registry = <topic>-value)
    #[arg(long, env = "REPLAY_TOPIC")]
    pub topic: Option<String>,

    /// При остановке не дожидаться публикации в полёте
    #[arg(long)]
    pub abandon_in_flight: bool,

    /// JSON-строки в stdout вместо настроенного sink'а
    #[arg(long)]
    pub dry_run: bool,

    /// URL Schema Registry
    #[arg(long, env = "SCHEMA_REGISTRY_URL")]
    pub schema_registry_url: Option<String>,

    #[arg(long, env = "SCHEMA_REGISTRY_USERNAME")]
    pub schema_registry_username: Option<String>,

    #[arg(long, env = "SCHEMA_REGISTRY_PASSWORD", hide_env_values = true)]
    pub schema_registry_password: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  Effective (merged config)
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: config.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub file: PathBuf,
    pub speed: f64,
    pub max_delay: Option<Duration>,
    pub ts_field: Option<String>,
    pub cancel_policy: CancelPolicy,
    pub key_field: String,
    pub shutdown_timeout: Duration,
    pub source: CsvSourceConfig,
    pub sink: SinkConfig,
    pub registry: Option<RegistryConfig>,
}

impl Effective {
    pub fn new(args: &ReplayArgs) -> Result<Self, ReplayerError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };
        let eff = Self::merge(args, cfg);
        eff.replay_config(Utc::now())?;
        Ok(eff)
    }

    /// Конфигурация прогона. `started_at` фиксируется вызывающим
    /// непосредственно перед запуском scheduler'а, уже после подготовки
    /// sink'а и источника.
    pub fn replay_config(&self, started_at: DateTime<Utc>) -> Result<ReplayConfig, ReplayerError> {
        let mut replay =
            ReplayConfig::new(self.speed, self.max_delay, started_at)?.with_cancel_policy(self.cancel_policy);
        if let Some(ts_field) = &self.ts_field {
            replay = replay.with_ts_field(ts_field.clone());
        }
        Ok(replay)
    }

    fn merge(args: &ReplayArgs, cfg: Config) -> Self {
        let r = cfg.replay;

        let max_delay = if args.no_max_delay {
            None
        } else {
            match args.max_delay_ms.or(r.max_delay_ms).unwrap_or(10_000) {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            }
        };

        let cancel_policy = if args.abandon_in_flight {
            CancelPolicy::Abandon
        } else {
            r.cancel_policy.unwrap_or_default()
        };

        let mut sink = cfg.sink;
        if let Some(topic) = &args.topic {
            sink.topic = topic.clone();
        }
        if args.dry_run {
            sink.transport = "stdout".into();
            sink.framing = "lines".into();
            sink.codec = "json".into();
            sink.codec_config = None;
            sink.include_key = false;
        }

        let mut registry = cfg.schema_registry.unwrap_or_default();
        if let Some(url) = &args.schema_registry_url {
            registry.url = url.clone();
        }
        if let Some(username) = &args.schema_registry_username {
            registry.username = Some(username.clone());
        }
        if let Some(password) = &args.schema_registry_password {
            registry.password = Some(password.clone());
        }
        let registry = (!registry.url.is_empty() && sink.codec == "avro").then_some(registry);

        Self {
            file: PathBuf::from(args.file.clone().or(r.file).unwrap_or_else(|| "operations.csv".into())),
            speed: args.speed.or(r.speed).unwrap_or(1.0),
            max_delay,
            ts_field: r.ts_field,
            cancel_policy,
            key_field: r.key_field.unwrap_or_else(|| "icao".into()),
            shutdown_timeout: Duration::from_millis(r.shutdown_timeout_ms.unwrap_or(5000)),
            source: cfg.source,
            sink,
            registry,
        }
    }
}
