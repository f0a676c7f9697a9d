use replay_api::StageError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("sink config: {0}")]
    Config(String),

    #[error("{stage}: {source}")]
    Stage { stage: String, source: StageError },
}

impl PipelineError {
    pub(crate) fn stage(stage: impl Into<String>) -> impl FnOnce(StageError) -> Self {
        let stage = stage.into();
        move |source| PipelineError::Stage { stage, source }
    }
}
