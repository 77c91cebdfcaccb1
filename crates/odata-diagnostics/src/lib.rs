//! Error handling for the OData object model
//!
//! This crate provides the shared error taxonomy used across the
//! workspace: schema and type misuse, path resolution failures,
//! expression errors, the value-lifecycle errors (frozen, bound,
//! unbound) and service-level failures carrying an HTTP-like status.

mod error;

pub use error::*;

/// Result type for OData model operations
pub type Result<T> = std::result::Result<T, ODataError>;
