//! OData model error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the OData object model
///
/// Structural and typing violations are raised immediately at the
/// mutation site.  Remote-service failures are captured as request
/// results first and only become `Service` errors when a caller decides
/// to raise them.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ODataError {
    /// Schema or type misuse
    #[error("Model error: {message}")]
    Model { message: String },

    /// A path expression cannot be resolved or is structurally invalid
    /// for its context
    #[error("Path error: {message}")]
    Path { message: String },

    /// An expression is ill-typed or ill-formed
    #[error("Expression error: {message}")]
    Expression { message: String },

    /// Mutation attempted on a frozen value
    #[error("Frozen value cannot be modified")]
    FrozenValue,

    /// Attempt to rebind an already-bound value
    #[error("Value is already bound: {context}")]
    BoundValue { context: String },

    /// Operation requiring a service binding attempted on a transient
    /// value
    #[error("Operation requires a bound value")]
    UnboundValue,

    /// Dynamic property name collision
    #[error("Duplicate name: {name}")]
    DuplicateName { name: String },

    /// Remote-service failure with an HTTP-like status code
    #[error("Service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// An entity id could not be determined or parsed
    #[error("Invalid entity id: {message}")]
    InvalidEntityId { message: String },

    /// An entity set was structurally modified while an iterator was
    /// active
    #[error("Stale iterator detected")]
    StaleIterator,

    /// A key lookup failed; the caller-side translation of a 404
    #[error("Entity key not found")]
    MissingKey,
}

impl ODataError {
    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create a path error
    pub fn path(message: impl Into<String>) -> Self {
        Self::Path {
            message: message.into(),
        }
    }

    /// Create an expression error
    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression {
            message: message.into(),
        }
    }

    /// Create a bound-value error
    pub fn bound(context: impl Into<String>) -> Self {
        Self::BoundValue {
            context: context.into(),
        }
    }

    /// Create a duplicate-name error
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Create a service error
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid-entity-id error
    pub fn invalid_entity_id(message: impl Into<String>) -> Self {
        Self::InvalidEntityId {
            message: message.into(),
        }
    }

    /// The HTTP-like status code, for service errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a service error carrying a 404 status
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
