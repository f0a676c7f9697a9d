use replay_api::StageError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid replay config: {0}")]
    InvalidConfig(String),

    #[error("source read error at record {position}: {source}")]
    Source { position: u64, source: StageError },
}
