use crate::models::Provider;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{method} {target} returned {status}")]
    Status {
        method: Method,
        target: String,
        status: StatusCode,
        /// Decoded response body, when the backend sent JSON
        body: Option<Value>,
    },

    #[error("{method} {target} failed: {source}")]
    Request {
        method: Method,
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid URL {target}: {source}")]
    InvalidUrl {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Malformed response from {target}: {reason}")]
    Decode { target: String, reason: String },
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Error payload reported by the backend alongside a non-success status.
    pub fn body(&self) -> Option<&Value> {
        match self {
            TransportError::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// Coarse error classes a caller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An earlier step must be redone (pick a file, upload first)
    Precondition,
    /// The current step failed as a whole
    Transport,
    /// Object is in storage but has no completed analysis
    PartialUpload,
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("No file selected")]
    NoFileSelected,

    #[error("No request id yet, upload a file first")]
    MissingRequestId,

    #[error("Invalid request id '{0}'")]
    InvalidRequestId(String),

    #[error("Upload rejected: {0}")]
    UploadRejected(#[source] TransportError),

    #[error("Presign failed: {0}")]
    PresignFailed(#[source] TransportError),

    #[error("Storage write failed: {0}")]
    StorageWriteFailed(#[source] TransportError),

    #[error("Object '{storage_key}' was stored but analysis could not be triggered: {source}")]
    AnalysisTriggerFailed {
        storage_key: String,
        #[source]
        source: TransportError,
    },

    #[error("{provider} analysis failed: {source}")]
    AnalysisCallFailed {
        provider: Provider,
        #[source]
        source: TransportError,
    },

    #[error("Route call failed: {0}")]
    RouteCallFailed(#[source] TransportError),

    #[error("Health check failed: {0}")]
    HealthCheckFailed(#[source] TransportError),

    #[error("Result lookup failed: {0}")]
    LookupFailed(#[source] TransportError),

    #[error("Coordinator task is no longer running")]
    CoordinatorStopped,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::NoFileSelected
            | WorkflowError::MissingRequestId
            | WorkflowError::InvalidRequestId(_) => ErrorKind::Precondition,
            WorkflowError::AnalysisTriggerFailed { .. } => ErrorKind::PartialUpload,
            _ => ErrorKind::Transport,
        }
    }

    /// Underlying transport failure, if the error came from a network step.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            WorkflowError::UploadRejected(e)
            | WorkflowError::PresignFailed(e)
            | WorkflowError::StorageWriteFailed(e)
            | WorkflowError::RouteCallFailed(e)
            | WorkflowError::HealthCheckFailed(e)
            | WorkflowError::LookupFailed(e) => Some(e),
            WorkflowError::AnalysisTriggerFailed { source, .. }
            | WorkflowError::AnalysisCallFailed { source, .. } => Some(source),
            WorkflowError::NoFileSelected
            | WorkflowError::MissingRequestId
            | WorkflowError::InvalidRequestId(_)
            | WorkflowError::CoordinatorStopped => None,
        }
    }
}
