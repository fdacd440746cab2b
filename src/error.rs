use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StepwiseError>;

#[derive(Debug, Error)]
pub enum StepwiseError {
    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("agent reached the step limit of {0} without producing an output step")]
    StepLimit(usize),

    #[error("agent run timed out after {0:?}")]
    Timeout(Duration),

    #[error("agent run was cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
