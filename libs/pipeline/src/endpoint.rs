use std::future::Future;
use std::pin::Pin;

use replay_api::{Codec, Framing, PublishSink, StageError, Transport};

use crate::config::{RegistryConfig, RetryPolicy, SinkConfig};
use crate::{PipelineError, plugins};

// ═══════════════════════════════════════════════════════════════
//  Endpoint
// ═══════════════════════════════════════════════════════════════

/// Publish endpoint: codec → framing → transport.
///
/// Один payload = один value-фрейм (с `include_key` перед ним идёт
/// key-фрейм, пустой если ключа нет). Транзиентные ошибки транспорта
/// повторяются с backoff и переподключением; ошибки формата — нет.
pub struct Endpoint {
    name: String,
    transport: Box<dyn Transport>,
    framing: Box<dyn Framing>,
    codec: Box<dyn Codec>,
    include_key: bool,
    retry: RetryPolicy,
    connected: bool,
    buf: Vec<u8>,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        transport: Box<dyn Transport>,
        framing: Box<dyn Framing>,
        codec: Box<dyn Codec>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            framing,
            codec,
            include_key: false,
            retry: RetryPolicy::default(),
            connected: false,
            buf: Vec::with_capacity(8192),
        }
    }

    pub fn with_include_key(mut self, include_key: bool) -> Self {
        self.include_key = include_key;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Собрать endpoint из конфига. `default_schema` — Avro-схема
    /// приложения, если codec_config не указывает свою.
    pub async fn load(
        cfg: &SinkConfig,
        registry: Option<&RegistryConfig>,
        default_schema: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let transport = plugins::transport(cfg)?;
        let framing = plugins::framing(cfg)?;
        let codec = plugins::codec(cfg, registry, default_schema).await?;

        tracing::info!(
            sink = %cfg.name,
            transport = %cfg.transport,
            framing = %cfg.framing,
            codec = %cfg.codec,
            format = %codec.data_format(),
            include_key = cfg.include_key,
            retries = cfg.retries,
            "loaded endpoint"
        );

        Ok(Self::new(&cfg.name, transport, framing, codec)
            .with_include_key(cfg.include_key)
            .with_retry(cfg.retry_policy()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Установить соединение заранее (иначе при первом publish).
    pub async fn connect(&mut self) -> Result<(), StageError> {
        ensure_connected(&self.name, &mut *self.transport, &mut self.connected).await
    }

    /// Encode: payload → wire bytes, дописанные в `out`.
    pub fn encode_to_wire(
        &self,
        payload: &serde_json::Value,
        key: Option<&str>,
        out: &mut Vec<u8>,
    ) -> Result<(), StageError> {
        let data = self.codec.encode(payload)?;
        if self.include_key {
            self.framing.encode(key.unwrap_or("").as_bytes(), out)?;
        }
        self.framing.encode(&data, out)
    }

    async fn publish_with_retry(&mut self, payload: &serde_json::Value, key: Option<&str>) -> Result<(), StageError> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let encoded = self.encode_to_wire(payload, key, &mut buf);
        let result = match encoded {
            Ok(()) => self.deliver(&buf).await,
            Err(e) => Err(e),
        };
        self.buf = buf;
        result
    }

    async fn deliver(&mut self, frame: &[u8]) -> Result<(), StageError> {
        let mut attempt = 0;
        loop {
            let sent = match ensure_connected(&self.name, &mut *self.transport, &mut self.connected).await {
                Ok(()) => self.transport.write_all(frame).await,
                Err(e) => Err(e),
            };
            let err = match sent {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if !err.is_retryable() || attempt >= self.retry.retries {
                return Err(err);
            }

            attempt += 1;
            let backoff = self.retry.backoff(attempt);
            tracing::warn!(
                sink = %self.name,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = ?err,
                "publish failed, reconnecting"
            );
            if self.connected {
                if let Err(e) = self.transport.close().await {
                    tracing::debug!(sink = %self.name, error = ?e, "close before reconnect failed");
                }
                self.connected = false;
            }
            tokio::time::sleep(backoff).await;
        }
    }
}

async fn ensure_connected(name: &str, transport: &mut dyn Transport, connected: &mut bool) -> Result<(), StageError> {
    if *connected {
        return Ok(());
    }
    transport.connect().await?;
    *connected = true;
    tracing::info!(sink = %name, peer = %transport.peer_info(), "connected");
    Ok(())
}

impl PublishSink for Endpoint {
    fn publish<'a>(
        &'a mut self,
        payload: &'a serde_json::Value,
        key: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>> {
        Box::pin(self.publish_with_retry(payload, key))
    }

    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            if self.connected {
                self.transport.flush().await?;
                tracing::info!(sink = %self.name, "flushed");
            }
            Ok(())
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            self.transport.close().await?;
            if std::mem::take(&mut self.connected) {
                tracing::info!(sink = %self.name, "closed");
            }
            Ok(())
        })
    }
}
