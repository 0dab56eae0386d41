use thiserror::Error;

/// Error taxonomy surfaced by the core. Mirrors the error kinds enumerated
/// for the pipeline: transient store failures and cancellation propagate,
/// malformed input and threshold-not-met are represented structurally
/// rather than as errors wherever a caller needs to distinguish them.
#[derive(Error, Debug)]
pub enum WikiSurgeError {
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("downstream api error: {0}")]
    Downstream(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WikiSurgeError>;
