//! Error types for the relay.

/// Configuration-related errors. Fatal at startup, never seen afterwards.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the messaging backend transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The long-poll request hit its client-side deadline. An expected
    /// outcome of long-polling — the loop re-polls immediately.
    #[error("receive request timed out")]
    Timeout,

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

/// Errors posting to the downstream inbox. Logged and dropped, never
/// propagated past the forwarder.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("inbox returned status {status}")]
    Status { status: u16 },

    #[error("HTTP error: {0}")]
    Http(String),
}
