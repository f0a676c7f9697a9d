use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use codec_csv::CsvRecordSource;
use pipeline::Endpoint;
use replay_api::{PublishSink, RecordSource, RecordTransformer};
use scheduler::{ReplayOutcome, Scheduler, SchedulerError};

use super::config::Effective;
use super::domain::{ADSB_OPERATION_SCHEMA, AdsbOperationTransformer};
use super::error::ReplayerError;

// ═══════════════════════════════════════════════════════════════
//  Shutdown
// ═══════════════════════════════════════════════════════════════

/// Двухступенчатая остановка.
///
/// Первый сигнал отменяет `token`: новые записи не читаются, publish в
/// полёте доживает по `CancelPolicy`. Второй сигнал отменяет `force`:
/// publish в полёте бросается независимо от политики.
#[derive(Clone, Default)]
pub struct Shutdown {
    pub token: CancellationToken,
    pub force: CancellationToken,
}

impl Shutdown {
    fn on_signal(&self, signal: &'static str) {
        if self.token.is_cancelled() {
            tracing::warn!(signal, "second signal, abandoning in-flight publish");
            self.force.cancel();
        } else {
            tracing::info!(signal, "shutting down (repeat to abandon in-flight publish)");
            self.token.cancel();
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Main dispatch
// ═══════════════════════════════════════════════════════════════

pub async fn run(eff: &Effective) -> Result<(), ReplayerError> {
    let shutdown = Shutdown::default();
    let watcher = spawn_signal_watcher(shutdown.clone())?;

    let result = replay(eff, &shutdown, Utc::now).await;
    watcher.abort();

    let outcome = result?;
    let stats = outcome.stats();
    tracing::info!(
        cancelled = matches!(outcome, ReplayOutcome::Cancelled(_)),
        read = stats.read,
        published = stats.published,
        failed = stats.failed,
        skipped_before_start = stats.skipped_before_start,
        skipped_unparseable = stats.skipped_unparseable,
        "replay finished"
    );
    Ok(())
}

/// Один прогон: sink → source → scheduler, затем flush/close sink'а
/// (в том числе после отмены или ошибки источника).
///
/// `started_at` вызывается после регистрации схемы, подключения sink'а и
/// открытия источника: выравнивание идёт от реального начала replay.
pub async fn replay(
    eff: &Effective,
    shutdown: &Shutdown,
    started_at: impl FnOnce() -> DateTime<Utc>,
) -> Result<ReplayOutcome, ReplayerError> {
    let mut sink = Endpoint::load(&eff.sink, eff.registry.as_ref(), Some(ADSB_OPERATION_SCHEMA)).await?;
    sink.connect().await.map_err(ReplayerError::stage("connect"))?;

    let mut source = match CsvRecordSource::open(&eff.file, &eff.source).await {
        Ok(s) => s,
        Err(e) => {
            shutdown_sink(eff, &mut sink).await;
            return Err(ReplayerError::stage("source")(e));
        }
    };

    let transformer = AdsbOperationTransformer::new(eff.key_field.clone());
    let mut scheduler = Scheduler::new(eff.replay_config(started_at())?);
    let result = drive(&mut scheduler, &mut source, &transformer, &mut sink, shutdown).await;

    shutdown_sink(eff, &mut sink).await;
    Ok(result?)
}

/// Scheduler до конца, отмены или принудительной остановки.
async fn drive(
    scheduler: &mut Scheduler,
    source: &mut dyn RecordSource,
    transformer: &dyn RecordTransformer,
    sink: &mut dyn PublishSink,
    shutdown: &Shutdown,
) -> Result<ReplayOutcome, SchedulerError> {
    let finished = tokio::select! {
        biased;
        _ = shutdown.force.cancelled() => None,
        result = scheduler.run(source, transformer, sink, &shutdown.token) => Some(result),
    };
    match finished {
        Some(result) => result,
        None => {
            tracing::warn!(state = ?scheduler.state(), "replay abandoned");
            Ok(ReplayOutcome::Cancelled(*scheduler.stats()))
        }
    }
}

async fn shutdown_sink(eff: &Effective, sink: &mut Endpoint) {
    match tokio::time::timeout(eff.shutdown_timeout, sink.flush()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(sink = %sink.name(), error = %e, "flush failed"),
        Err(_) => tracing::warn!(
            sink = %sink.name(),
            timeout_ms = eff.shutdown_timeout.as_millis() as u64,
            "flush timed out"
        ),
    }
    if let Err(e) = sink.close().await {
        tracing::warn!(sink = %sink.name(), error = %e, "close failed");
    }
}

// ═══════════════════════════════════════════════════════════════
//  Signals
// ═══════════════════════════════════════════════════════════════

/// SIGINT/SIGTERM → `Shutdown::on_signal`. Слушает до второго сигнала.
fn spawn_signal_watcher(shutdown: Shutdown) -> Result<JoinHandle<()>, ReplayerError> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        while !shutdown.force.is_cancelled() {
            #[cfg(unix)]
            let terminate = sigterm.recv();
            #[cfg(not(unix))]
            let terminate = std::future::pending::<Option<()>>();

            let signal = tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                Some(()) = terminate => "SIGTERM",
            };
            shutdown.on_signal(signal);
        }
    }))
}
