use thiserror::Error;

/// Error kinds produced by the task engine and its collaborators.
///
/// Per-container failures (`Docker`, `AgentTimeout`, `AgentRejected`) are
/// recovered locally by the engine and never reach a task-level handler;
/// everything else surfaces as `Task::finish(FAILED)`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("resource contention: {0}")]
    ResourceContention(String),

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("agent attach timed out")]
    AgentTimeout,

    #[error("agent rejected attach: {0}")]
    AgentRejected(String),

    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("store error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
