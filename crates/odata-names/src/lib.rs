//! OData names and paths
//!
//! This crate defines the name primitives shared by the rest of the
//! workspace:
//! - `QualifiedName` (namespace-qualified type, term and operation names)
//! - `TermRef` (annotation term references, `@Ns.Term#qualifier`)
//! - `PathQualifier` (`$ref` / `$count`)
//! - `PathSegment` and property-path parsing/formatting

mod path;
mod qualified;

pub use path::*;
pub use qualified::*;

/// Returns true if `s` is a valid OData simple identifier
///
/// Simple identifiers start with a letter or underscore followed by
/// letters, digits or underscores.
pub fn is_simple_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Returns true if `s` is a valid namespace (dotted simple identifiers)
pub fn is_namespace(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_simple_identifier)
}
