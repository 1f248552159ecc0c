//! Error types for the dashboard client core.
//!
//! # Design
//! Fetch failures and write failures are kept apart: a rejected write is what
//! gates the overlay mutation, so it carries the operation name and the
//! status text shown to the user. `Transport` and `Deserialization` together
//! form the "transport failure" class that callers usually just surface.

use thiserror::Error;

/// Errors returned by the endpoint adapter, providers and the dashboard.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (connection refused, DNS, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not valid JSON or did not match the expected shape.
    #[error("deserialization failed: {message}")]
    Deserialization { message: String, body: String },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The request could not be built from the given parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A fetch returned 404.
    #[error("resource not found")]
    NotFound,

    /// A fetch returned a non-success status other than 404.
    #[error("HTTP {status} {status_text}: {body}")]
    HttpError {
        status: u16,
        status_text: String,
        body: String,
    },

    /// A create, update or delete returned a non-success status.
    #[error("{operation} failed with status {status} : {status_text}")]
    WriteRejected {
        operation: WriteOperation,
        status: u16,
        status_text: String,
        body: String,
    },

    /// A page arrived for a provider generation that has been superseded.
    #[error("stale response from generation {received} (current {expected})")]
    StaleResponse { expected: u64, received: u64 },

    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// An item operation was attempted with no activity selected.
    #[error("no activity selected")]
    NoActivitySelected,
}

impl ApiError {
    /// `true` for failures of the network or of decoding the response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Deserialization { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleResponse { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound => Some(404),
            Self::HttpError { status, .. } | Self::WriteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn deserialization(err: impl std::fmt::Display, body: &str) -> Self {
        Self::Deserialization {
            message: err.to_string(),
            body: body.to_string(),
        }
    }
}

/// The remote write a `WriteRejected` error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WriteOperation::Create => "Create",
            WriteOperation::Update => "Update",
            WriteOperation::Delete => "Delete",
        })
    }
}

/// A local mutation whose preconditions do not hold against the current view.
///
/// The overlay is left untouched when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("cannot add key {0}: already present")]
    DuplicateKey(String),

    #[error("key {0} is not visible")]
    UnknownKey(String),

    #[error("mutation metadata does not match its records")]
    KeyMismatch,

    #[error("mutation carries no records")]
    Empty,

    #[error("record has no key field `{0}`")]
    MissingKeyField(String),
}
