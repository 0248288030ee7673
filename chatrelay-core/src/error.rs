use thiserror::Error;

/// Core error type for chatrelay.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The upstream response carried no body; the proxy entry point fails
    /// before any byte is relayed.
    #[error("upstream response body is missing")]
    MissingBody,

    #[error("validation failed: {0}")]
    Validation(String),

    /// The message store could not commit the assembled message.
    #[error("persistence failed: {message}")]
    Persistence { message: String },

    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<u64> },

    #[error("upstream unavailable")]
    UpstreamUnavailable,

    #[error("upstream error: {code} {message}")]
    UpstreamStatus { code: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, RelayError>;
