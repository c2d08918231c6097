use bytes::Bytes;
use thiserror::Error;

/// An error surfaced from a [`fetch`](crate::RequestCoordinator::fetch) call.
///
/// This is the only type callers are expected to pattern-match on. Each
/// terminal outcome is shared verbatim with every waiter of the same request
/// key, which is why the type is `Clone` and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The operation was cancelled cooperatively.
    ///
    /// Never retried, and propagated as-is without wrapping.
    #[error("cancelled")]
    Cancelled,

    /// The transport failed before any response was obtainable, e.g. due to
    /// connection loss, DNS resolution, or an attempt timeout.
    ///
    /// The attached string describes the underlying failure.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// A response was obtained, but with a non-2xx status code.
    ///
    /// Retryable only for a subset of codes (typically 5xx) per policy.
    #[error("http status {code}")]
    Status {
        code: u16,
        body: Bytes,
    },

    /// The response bytes could not be interpreted downstream.
    ///
    /// Kept distinguishable so callers can avoid retrying a
    /// permanently-malformed response.
    #[error("decoding failed: {0}")]
    Decoding(String),

    /// An unexpected failure inside the coordinator itself.
    #[error("{message}: {details}")]
    Custom {
        message: String,
        details: String,
    },
}

impl FetchError {
    pub fn custom(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
            details: details.into(),
        }
    }

    /// The status code, if this is an HTTP failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// A short tag for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Unavailable(_) => "unavailable",
            Self::Status { .. } => "status",
            Self::Decoding(_) => "decoding",
            Self::Custom { .. } => "custom",
        }
    }
}
