use thiserror::Error;

pub use crate::messenger::RequestError;
pub use crate::protocol::error::Error as ProtocolError;

use crate::backoff::BackoffError;

/// What a failed request was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// A topic-level request.
    Topic(String),

    /// A cluster-wide request.
    Cluster,
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(name) => write!(f, "topic \"{name}\""),
            Self::Cluster => write!(f, "cluster"),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] crate::connection::Error),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(
        "Server error {protocol_error:?} for {request}: {}",
        error_message.as_deref().unwrap_or("no message")
    )]
    ServerError {
        protocol_error: ProtocolError,
        error_message: Option<String>,
        request: RequestContext,
    },

    #[error("All retries failed: {0}")]
    RetryFailed(#[from] BackoffError),
}

impl Error {
    pub(crate) fn server(
        protocol_error: ProtocolError,
        error_message: Option<String>,
        request: RequestContext,
    ) -> Self {
        Self::ServerError {
            protocol_error,
            error_message,
            request,
        }
    }

    pub(crate) fn exactly_one_topic(got: usize) -> Self {
        Self::InvalidResponse(format!("Expected a single topic in response, got {got}"))
    }

    /// The error that caused the last retry to fail, or `self`.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::RetryFailed(BackoffError::DeadlineExceeded { source, .. }) => source
                .downcast_ref::<Self>()
                .map(Self::root_cause)
                .unwrap_or(self),
            _ => self,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
