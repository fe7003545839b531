use std::fmt::{Display, Formatter};

/// Classifies why an operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No reply arrived within the deadline.
    Timeout,
    /// The operation needs an open channel (or an active subscription) and there is none.
    NotConnected,
    /// Socket-level failure.
    Transport,
    /// The reply could not be parsed or lacks required fields.
    MalformedResponse,
    /// Client credentials or a valid access token are missing.
    Unauthorized,
    /// The broker answered with a status or `code` >= 400.
    ServerError,
    /// Security material could not be written back to its store.
    Persistence,
    /// The request could not be built from the caller's values. Nothing was sent.
    InvalidRequest,
}

impl ErrorKind {
    /// The status code reported when the failure did not come from the broker.
    pub fn default_code(self) -> u16 {
        match self {
            ErrorKind::Timeout | ErrorKind::NotConnected => 408,
            ErrorKind::Unauthorized => 401,
            ErrorKind::InvalidRequest => 400,
            ErrorKind::Transport
            | ErrorKind::MalformedResponse
            | ErrorKind::ServerError
            | ErrorKind::Persistence => 500,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotConnected => "not connected",
            ErrorKind::Transport => "transport error",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::ServerError => "server error",
            ErrorKind::Persistence => "persistence error",
            ErrorKind::InvalidRequest => "invalid request",
        })
    }
}

/// The error variant of a [`Response`](crate::Response).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} ({code}): {message}")]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub code: u16,
    pub message: String,
    /// Correlation token of the request that failed, if it had one.
    pub token: Option<u64>,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.default_code(),
            message: message.into(),
            token: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotConnected, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// An error reported by the broker, with the broker's code.
    pub fn server(code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ServerError,
            code,
            message: message.into(),
            token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<u64>) -> Self {
        self.token = token;
        self
    }
}
