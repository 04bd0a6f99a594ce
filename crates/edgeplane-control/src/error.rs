//! Error types for edgeplane-control.

use std::fmt;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::entity::ValidationError;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Broad classification of a [`ControlError`].
///
/// HTTP status codes are derived from the kind alone, so callers never need
/// to inspect error text to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, missing or disallowed input.
    Validation,
    /// A uniqueness or referential constraint was violated.
    Conflict,
    /// The addressed entity does not exist.
    NotFound,
    /// Store, node or internal failure.
    Downstream,
}

/// Errors that can occur in the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// An entity failed field-level validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Request body could not be decoded.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// An operation that addresses one entity was called without an id.
    #[error("id missing from request")]
    MissingId,

    /// Filter on a field outside the collection's allow-list.
    #[error("disallowed filter field {field:?}")]
    DisallowedFilter {
        /// The rejected field name.
        field: String,
    },

    /// Uniqueness check failed.
    #[error("duplicate record in {collection} detected for {}", KeyList(.keys))]
    Duplicate {
        /// Collection the duplicate would land in.
        collection: &'static str,
        /// The unique key fields and their values.
        keys: Vec<(&'static str, String)>,
    },

    /// Delete vetoed because another row still points at the entity.
    #[error("cannot delete {collection} {id}: referenced by {referenced_by}")]
    Referenced {
        /// Collection of the entity being deleted.
        collection: &'static str,
        /// Entity id.
        id: String,
        /// Collection holding the reference.
        referenced_by: &'static str,
    },

    /// A binding refers to an entity that does not exist.
    #[error("{field} {id} does not exist")]
    MissingReference {
        /// Reference field name.
        field: &'static str,
        /// Referenced id.
        id: String,
    },

    /// An update tried to repoint a binding at different rows.
    #[error("cannot change {field} of {collection} {id}")]
    KeyChanged {
        /// Binding collection.
        collection: &'static str,
        /// Binding id.
        id: String,
        /// Key field the update changed.
        field: &'static str,
    },

    /// Entity not found.
    #[error("{collection} {id} not found")]
    NotFound {
        /// Collection searched.
        collection: &'static str,
        /// Requested id.
        id: String,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The node answered but rejected the call.
    #[error("node {node_id} rejected {call}: {message}")]
    Node {
        /// Node identifier.
        node_id: String,
        /// RPC name.
        call: &'static str,
        /// Failure reported by the node.
        message: String,
    },

    /// The node could not be reached.
    #[error("node {node_id} unreachable: {message}")]
    NodeUnreachable {
        /// Node identifier.
        node_id: String,
        /// Transport failure.
        message: String,
    },

    /// The node record needed to open a channel does not exist.
    #[error("node {0} not found, cannot connect")]
    NodeNotFound(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Store state contradicts an earlier read in the same operation.
    #[error("inconsistent store state: {0}")]
    Inconsistent(String),

    /// The request was cancelled before a store write.
    #[error("request cancelled before {0}")]
    Cancelled(&'static str),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a serialisation error.
    #[must_use]
    pub fn serialisation(msg: impl Into<String>) -> Self {
        Self::Serialisation(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::InvalidBody(_)
            | Self::MissingId
            | Self::DisallowedFilter { .. } => ErrorKind::Validation,
            Self::Duplicate { .. }
            | Self::Referenced { .. }
            | Self::MissingReference { .. }
            | Self::KeyChanged { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Database(_)
            | Self::Node { .. }
            | Self::NodeUnreachable { .. }
            | Self::NodeNotFound(_)
            | Self::Http(_)
            | Self::Serialisation(_)
            | Self::Inconsistent(_)
            | Self::Cancelled(_)
            | Self::Config(_)
            | Self::Internal(_) => ErrorKind::Downstream,
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Downstream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure happened below the RPC layer, meaning the channel
    /// to the node should not be reused.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::NodeUnreachable { .. })
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

struct KeyList<'a>(&'a [(&'static str, String)]);

impl fmt::Display for KeyList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{field} {value}")?;
        }
        Ok(())
    }
}
