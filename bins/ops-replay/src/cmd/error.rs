use replay_api::StageError;
use scheduler::SchedulerError;

#[derive(Debug, thiserror::Error)]
pub enum ReplayerError {
    #[error("{0}")]
    Config(String),

    #[error("{stage}: {source}")]
    Stage { stage: &'static str, source: StageError },

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("{0}")]
    Scheduler(#[from] SchedulerError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl ReplayerError {
    pub fn stage(stage: &'static str) -> impl FnOnce(StageError) -> Self {
        move |source| ReplayerError::Stage { stage, source }
    }
}
