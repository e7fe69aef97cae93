use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    /// The per-capability deadline elapsed.
    #[error("capability {capability} timed out")]
    Timeout { capability: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("no route configured for capability {0}")]
    NoRoute(String),

    /// The operator skipped or aborted the current AI step.
    #[error("request cancelled")]
    Cancelled,
}

impl RouterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RouterError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
