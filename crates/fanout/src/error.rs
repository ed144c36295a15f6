use thiserror::Error;

pub type FanoutResult<T> = std::result::Result<T, FanoutError>;

/// Failures produced while resolving or talking to model upstreams.
///
/// Inside a fan-out request these never cross the engine boundary as Rust
/// errors; each one is translated into an `error` event for the model it
/// belongs to. Only registry loading surfaces them directly.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Every discovery fetch and the static fallback failed.
    #[error("Model registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The requested identifier is not in the registry.
    #[error("Model '{0}' is not known to the registry")]
    ModelNotFound(String),

    /// The registry knows the model but no endpoint is configured for it.
    #[error("No endpoint configured for model '{0}'")]
    EndpointNotConfigured(String),

    /// A gateway model was requested without a credential outside singleton mode.
    #[error("Gateway authentication required: {0}")]
    AuthRequired(String),

    /// Upstream chat request answered with a non-success status.
    #[error("Upstream returned {status}: {message}")]
    UpstreamHttp { status: u16, message: String },

    /// Connection failed, the body closed unexpectedly, or the decoder gave up.
    #[error("Upstream transport error: {0}")]
    UpstreamTransport(String),

    /// The request could not be built at all.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FanoutError {
    /// HTTP status code carried by this error, when one exists.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::UpstreamHttp { status, .. } => Some(*status),
            _ => None,
        }
    }
}
