//! Crate-level error types for backend calls, mutations, and event handlers.

/// Error returned by a [`BackendApi`](crate::BackendApi) call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backend has been shut down and accepts no more calls.
    #[error("backend is no longer available")]
    Disconnected,
}

impl ApiError {
    /// Whether the failure is worth retrying later.
    ///
    /// Network failures and 5xx responses are transient. A dashboard keeps
    /// its last-known-good records when a refresh fails this way and a
    /// later trigger may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Disconnected => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Error returned when a mutating action fails.
///
/// A failed mutation never publishes a domain event, so dependent
/// dashboards do not refresh.
#[derive(Debug, thiserror::Error)]
#[error("{action} failed: {source}")]
pub struct MutationError {
    /// The action that failed (e.g. `"like"`).
    pub action: &'static str,
    /// The underlying backend failure.
    #[source]
    pub source: ApiError,
}

impl MutationError {
    pub(crate) fn new(action: &'static str, source: ApiError) -> Self {
        Self { action, source }
    }
}

/// Error raised by an event subscriber.
///
/// Caught and logged at the bus boundary; delivery continues with the next
/// subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Handler error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error returned by dashboard lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DashboardError {
    /// The dashboard was disposed and accepts no further changes.
    #[error("dashboard `{0}` has been disposed")]
    Disposed(&'static str),

    /// The event bus behind the hub was disposed, so nothing new can mount.
    #[error("event bus has been disposed")]
    BusDisposed,

    /// Dashboards spawn their refreshes on the ambient Tokio runtime.
    #[error("no tokio runtime is available to run refreshes")]
    NoRuntime,
}
