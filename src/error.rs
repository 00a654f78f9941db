use std::{fmt, time::Duration};

use reqwest::StatusCode;

use crate::{Issue, Payload, Request, Response};

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Response rejected by the `reject` predicate (non-2xx by default).
    #[error(transparent)]
    Response(#[from] ResponseError),
    /// Parsed response data failed schema validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Transport failure, including timeout and cancellation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Input and base URL did not resolve to a valid URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// Params or body could not be serialized.
    #[error("serialize error: {0}")]
    Serialize(String),
    /// A custom response parser failed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn is_response_error(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn as_response_error(&self) -> Option<&ResponseError> {
        match self {
            Self::Response(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_validation_error(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Returns `true` when the error is a rejected-response error.
pub fn is_response_error(err: &FetchError) -> bool {
    err.is_response_error()
}

/// Returns `true` when the error is a schema validation error.
pub fn is_validation_error(err: &FetchError) -> bool {
    err.is_validation_error()
}

/// Failure reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request aborted")]
    Aborted,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(err) => err.is_timeout(),
            _ => false,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn is_connect(&self) -> bool {
        match self {
            Self::Http(err) => err.is_connect(),
            _ => false,
        }
    }
}

/// A response the `reject` predicate refused, with its parsed body.
#[derive(Debug)]
pub struct ResponseError {
    /// Body parsed by `parse_rejected`.
    pub data: Payload,
    pub response: Response,
    pub request: Request,
}

impl ResponseError {
    pub fn new(data: Payload, response: Response, request: Request) -> Self {
        Self {
            data,
            response,
            request,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.response.status
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request failed with status {} ({} {})",
            self.response.status, self.request.method, self.request.url
        )
    }
}

impl std::error::Error for ResponseError {}

/// Schema validation failure for a successfully parsed response.
#[derive(Debug)]
pub struct ValidationError {
    pub issues: Vec<Issue>,
    /// Parsed data that failed validation.
    pub data: Payload,
    pub response: Response,
    pub request: Request,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issues.first() {
            Some(first) if self.issues.len() == 1 => write!(f, "validation failed: {first}"),
            Some(first) => write!(
                f,
                "validation failed: {first} (and {} more)",
                self.issues.len() - 1
            ),
            None => f.write_str("validation failed"),
        }
    }
}

impl std::error::Error for ValidationError {}
