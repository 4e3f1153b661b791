use ringline_types::SessionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("call context error: {0}")]
    Context(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("speech timed out after {0} seconds")]
    SpeechTimeout(u64),
}
