use std::fmt;
use std::time::Duration;

use crate::TypedResponse;

/// Boxed error produced by request hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RestCallError {
    /// Base URL or substituted operation path did not parse.
    #[error("invalid url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    /// Header name or value could not be converted to its wire form.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// Body marshaling or response unmarshaling failed.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// No codec is available for the content type.
    #[error("unsupported encoding for content type `{content_type}`")]
    UnsupportedEncoding { content_type: String },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// A single attempt did not complete within its time window.
    #[error("attempt timed out after {0:?}")]
    AttemptTimeout(Duration),
    /// An attempt task panicked or was torn down before producing a result.
    #[error("attempt task failed: {0}")]
    Task(String),
    /// Every attempt was used and the last one failed at transport level.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: Box<RestCallError>,
    },
    /// The call context was cancelled.
    #[error("call cancelled")]
    Cancelled,
    /// The call context deadline passed.
    #[error("call deadline exceeded")]
    DeadlineExceeded,
    /// A before/after hook rejected the call.
    #[error("hook rejected the call: {0}")]
    Hook(#[source] BoxError),
    /// Non-success status, produced only by [`TypedResponse::error_for_status`].
    #[error("http error {status}: {reason}")]
    Http { status: u16, reason: String },
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RestCallError {
    /// Returns `true` for transport-level failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => is_retryable_transport(err),
            Self::AttemptTimeout(_) => true,
            _ => false,
        }
    }

    /// Returns `true` when the error came from the call context.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

/// Failure returned by [`RequestContext::send`](crate::RequestContext::send).
///
/// The after hook runs once the response is decoded, so its failure carries
/// the response alongside the hook error.
pub enum SendError<T> {
    /// The call failed before a typed response existed.
    Call(RestCallError),
    /// The after hook rejected an already-built response.
    AfterHook {
        response: TypedResponse<T>,
        source: BoxError,
    },
}

impl<T> SendError<T> {
    /// Response built before the after hook failed, if any.
    pub fn response(&self) -> Option<&TypedResponse<T>> {
        match self {
            Self::Call(_) => None,
            Self::AfterHook { response, .. } => Some(response),
        }
    }

    pub fn into_response(self) -> Option<TypedResponse<T>> {
        match self {
            Self::Call(_) => None,
            Self::AfterHook { response, .. } => Some(response),
        }
    }

    /// Returns the underlying call error, if the failure was not a hook rejection.
    pub fn as_call_error(&self) -> Option<&RestCallError> {
        match self {
            Self::Call(err) => Some(err),
            Self::AfterHook { .. } => None,
        }
    }
}

impl<T> From<RestCallError> for SendError<T> {
    fn from(err: RestCallError) -> Self {
        Self::Call(err)
    }
}

impl<T> From<SendError<T>> for RestCallError {
    fn from(err: SendError<T>) -> Self {
        match err {
            SendError::Call(err) => err,
            SendError::AfterHook { source, .. } => RestCallError::Hook(source),
        }
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call(err) => f.debug_tuple("Call").field(err).finish(),
            Self::AfterHook { response, source } => f
                .debug_struct("AfterHook")
                .field("status", &response.status())
                .field("source", source)
                .finish(),
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call(err) => fmt::Display::fmt(err, f),
            Self::AfterHook { response, source } => write!(
                f,
                "after hook rejected response {}: {source}",
                response.status_text()
            ),
        }
    }
}

impl<T> std::error::Error for SendError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Call(err) => Some(err),
            Self::AfterHook { source, .. } => Some(source.as_ref()),
        }
    }
}
