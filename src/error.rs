use std::result;

use crate::retry::RetryableError;
use thiserror::Error;

/// Error types for Virtual Observatory client operations
#[derive(Error, Debug)]
pub enum VoError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Non-success HTTP status that survived the retry policy
    #[error("HTTP {status} from {url}")]
    StatusError { status: u16, url: String },

    /// The remote service reported an error (QUERY_STATUS or error document)
    #[error("service error: {message}")]
    ServiceError { message: String },

    /// XML parsing failed
    #[error("XML parsing failed: {0}")]
    XmlError(String),

    /// The response was well-formed XML but not a usable VOTable
    #[error("invalid VOTable: {0}")]
    VotableError(String),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An asynchronous TAP job finished in a non-COMPLETED phase
    #[error("TAP job {id} ended in phase {phase}: {message}")]
    JobError {
        id: String,
        phase: String,
        message: String,
    },

    /// An asynchronous TAP job did not reach a terminal phase in time
    #[error("TAP job {id} did not finish within {waited_secs}s")]
    JobTimeout { id: String, waited_secs: u64 },

    /// Invalid ADQL or query parameters, rejected before any request is sent
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Coordinates outside the valid ICRS ranges
    #[error("invalid coordinates: ra={ra} dec={dec} (degrees)")]
    InvalidCoordinates { ra: f64, dec: f64 },

    /// Search radius outside the range accepted by the service
    #[error("invalid search radius {radius_deg} deg (maximum {max_deg} deg)")]
    InvalidRadius { radius_deg: f64, max_deg: f64 },

    /// A table, object, or product was missing from an otherwise valid response
    #[error("{what} not found")]
    NotFound { what: String },

    /// The service rejected the request for lack of credentials
    #[error("operation requires an authenticated session")]
    AuthRequired,

    /// Login to a TAP+ service failed
    #[error("login failed with HTTP status {status}")]
    LoginFailed { status: u16 },

    /// IO error during product download or extraction
    #[error("IO error: {message}")]
    IoError { message: String },
}

pub type Result<T> = result::Result<T, VoError>;

impl RetryableError for VoError {
    fn is_retryable(&self) -> bool {
        match self {
            // Network errors are typically transient
            VoError::RequestError(err) => {
                if err.is_timeout() || err.is_connect() {
                    return true;
                }

                // Server errors (5xx) and throttling responses
                if let Some(status) = err.status() {
                    return status.is_server_error() || status.as_u16() == 429;
                }

                // DNS and other transport errors
                !err.is_builder() && !err.is_redirect() && !err.is_decode()
            }

            VoError::StatusError { status, .. } => {
                (*status >= 500 && *status < 600) || *status == 429
            }

            // Everything else is a stable property of the request or response
            VoError::ServiceError { .. }
            | VoError::XmlError(_)
            | VoError::VotableError(_)
            | VoError::JsonError(_)
            | VoError::JobError { .. }
            | VoError::JobTimeout { .. }
            | VoError::InvalidQuery(_)
            | VoError::InvalidCoordinates { .. }
            | VoError::InvalidRadius { .. }
            | VoError::NotFound { .. }
            | VoError::AuthRequired
            | VoError::LoginFailed { .. }
            | VoError::IoError { .. } => false,
        }
    }

    fn retry_reason(&self) -> &str {
        if self.is_retryable() {
            match self {
                VoError::RequestError(err) if err.is_timeout() => "Request timeout",
                VoError::RequestError(err) if err.is_connect() => "Connection error",
                VoError::RequestError(_) => "Network error",
                VoError::StatusError { status, .. } => match status {
                    429 => "Rate limited by service",
                    500..=599 => "Server error",
                    _ => "Temporary HTTP error",
                },
                _ => "Transient error",
            }
        } else {
            match self {
                VoError::ServiceError { .. } => "Service rejected the query",
                VoError::XmlError(_) | VoError::VotableError(_) => "Invalid XML response",
                VoError::JsonError(_) => "Invalid JSON response",
                VoError::JobError { .. } => "Job failed on the server",
                VoError::JobTimeout { .. } => "Job polling deadline exceeded",
                VoError::InvalidQuery(_)
                | VoError::InvalidCoordinates { .. }
                | VoError::InvalidRadius { .. } => "Invalid input",
                VoError::NotFound { .. } => "Resource does not exist",
                VoError::AuthRequired | VoError::LoginFailed { .. } => "Authentication failure",
                VoError::IoError { .. } => "File system error",
                _ => "Non-transient error",
            }
        }
    }
}
