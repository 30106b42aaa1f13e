use std::fmt;

use reqwest::header::InvalidHeaderValue;

use crate::statement::StatementHandle;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server rejected the statement at submission time (bad SQL, bad auth, unknown warehouse).
    #[error("statement submission failed: {0}")]
    SubmissionFailed(ServerError),

    /// The statement was accepted but failed while it was being polled.
    #[error("query failed: {0}")]
    QueryFailed(ServerError),

    /// The attempt budget ran out while the statement was still running.
    /// The statement's real outcome is unknown.
    #[error("statement {} still running after {attempts} status checks", .handle.id())]
    PollTimeout {
        handle: StatementHandle,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("warehouse resume failed: {0}")]
    ResumeFailed(ServerError),

    #[error("polling config exceeds invocation budget: {0}")]
    BudgetExceeded(String),

    #[error("invalid polling config: {0}")]
    InvalidConfig(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("url error: {0}")]
    Url(String),

    #[error("json error: {0}, body: {1}")]
    Json(serde_json::Error, String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// `true` for `PollTimeout` and for transport timeouts.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::PollTimeout { .. } => true,
            Error::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// `true` when retrying the same request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::SubmissionFailed(_)
                | Error::QueryFailed(_)
                | Error::ResumeFailed(_)
                | Error::BudgetExceeded(_)
                | Error::InvalidConfig(_)
                | Error::Credential(_)
        )
    }

    /// The Snowflake error code carried by a server-side failure.
    pub fn server_code(&self) -> Option<&str> {
        match self {
            Error::SubmissionFailed(e) | Error::QueryFailed(e) | Error::ResumeFailed(e) => {
                Some(&e.code)
            }
            _ => None,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Url(e.to_string())
    }
}

/// Error code and message reported by the SQL API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: String,
    pub message: String,
    pub sql_state: Option<String>,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(sql_state) = &self.sql_state {
            write!(f, " (SQL state {sql_state})")?;
        }
        Ok(())
    }
}

/// A single outbound call that never produced an HTTP response.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(reqwest::Error),

    #[error("connection failed: {0}")]
    Connect(reqwest::Error),

    #[error("HTTP client error: {0}")]
    Other(reqwest::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e)
        } else if e.is_connect() {
            TransportError::Connect(e)
        } else {
            TransportError::Other(e)
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
