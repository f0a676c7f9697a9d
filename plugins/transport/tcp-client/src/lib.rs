use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use replay_api::{StageError, Transport};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TcpClientConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_nodelay() -> bool {
    true
}

/// Одно исходящее TCP-соединение.
///
/// `close` сбрасывает соединение; следующий `connect` открывает новое.
/// Запись без соединения — `Io` ошибка (повтор решает вызывающий).
pub struct TcpClientTransport {
    addr: String,
    connect_timeout: Duration,
    nodelay: bool,
    stream: Option<TcpStream>,
}

impl TcpClientTransport {
    pub fn new(cfg: &TcpClientConfig) -> Self {
        Self {
            addr: format!("{}:{}", cfg.host, cfg.port),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            nodelay: cfg.nodelay,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn open(&mut self) -> Result<(), StageError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| StageError::io(format!("TCP connect to {}: timed out", self.addr)))?
            .map_err(|e| StageError::io(format!("TCP connect to {}: {e}", self.addr)))?;
        stream.set_nodelay(self.nodelay)?;
        tracing::info!(addr = %self.addr, "tcp-client connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), StageError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| StageError::io(format!("not connected to {}", self.addr)))?;
        if let Err(e) = stream.write_all(data).await {
            // половина фрейма могла уйти — соединение больше непригодно
            self.stream = None;
            return Err(StageError::io(format!("TCP write to {}: {e}", self.addr)));
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), StageError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
            tracing::info!(addr = %self.addr, "tcp-client disconnected");
        }
        Ok(())
    }
}

impl Transport for TcpClientTransport {
    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(self.open())
    }

    fn write_all<'a>(&'a mut self, data: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>> {
        Box::pin(self.send(data))
    }

    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(stream) = self.stream.as_mut() {
                stream.flush().await?;
            }
            Ok(())
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(self.shutdown())
    }

    fn peer_info(&self) -> String {
        self.addr.clone()
    }
}
