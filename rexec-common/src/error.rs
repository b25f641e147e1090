use std::error::Error;

#[derive(thiserror::Error, Debug)]
pub enum RexecError {
    #[error("a process has already been started on this channel")]
    DuplicateExec,
    #[error("no running process on this channel")]
    NoProcess,
    #[error("unsupported signal: {0}")]
    UnsupportedSignal(String),
    #[error("failed to spawn process: {0}")]
    ProcessSpawn(#[source] std::io::Error),
    #[error("Inconsistent state error")]
    InconsistentState,
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),

    #[error("Session end")]
    SessionEnd,
}

impl RexecError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }

    /// Whether the error only rejects a single request and leaves the session usable.
    pub fn is_request_rejection(&self) -> bool {
        matches!(
            self,
            Self::DuplicateExec
                | Self::NoProcess
                | Self::UnsupportedSignal(_)
                | Self::ProcessSpawn(_)
        )
    }
}
