use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use replay_api::{StageError, Transport};

/// Пишет framed байты в stdout (или любой AsyncWrite): dry-run и пайпы.
pub struct StdoutTransport<W = tokio::io::Stdout> {
    out: W,
}

impl StdoutTransport {
    pub fn new() -> Self {
        Self { out: tokio::io::stdout() }
    }
}

impl Default for StdoutTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: AsyncWrite + Unpin + Send> StdoutTransport<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: AsyncWrite + Unpin + Send> Transport for StdoutTransport<W> {
    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn write_all<'a>(&'a mut self, data: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>> {
        Box::pin(async move {
            self.out.write_all(data).await?;
            Ok(())
        })
    }

    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            self.out.flush().await?;
            Ok(())
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            self.out.flush().await?;
            tracing::debug!("stdout transport closed");
            Ok(())
        })
    }

    fn peer_info(&self) -> String {
        "stdout".into()
    }
}
