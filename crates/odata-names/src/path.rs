//! Property paths
//!
//! Paths address properties through complex values, navigation
//! properties and type casts, e.g. `Schema.Employee/Address/City`.
//! Segments are a closed union; select/expand rules and the expression
//! evaluator all share this representation.

use crate::{QualifiedName, TermRef, is_simple_identifier};
use odata_diagnostics::{ODataError, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// A path qualifier: the trailing `$ref` or `$count` of an expand path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathQualifier {
    /// `$ref` - retrieve entity references only
    Ref,
    /// `$count` - retrieve the count only
    Count,
}

impl fmt::Display for PathQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref => write!(f, "$ref"),
            Self::Count => write!(f, "$count"),
        }
    }
}

impl FromStr for PathQualifier {
    type Err = ODataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "$ref" => Ok(Self::Ref),
            "$count" => Ok(Self::Count),
            _ => Err(ODataError::path(format!("bad path qualifier: {s}"))),
        }
    }
}

/// One segment of a property path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// A structural or navigation property name
    Identifier(String),
    /// A qualified name: a type cast or an operation
    Qualified(QualifiedName),
    /// An annotation term reference
    Term(TermRef),
    /// The `*` wildcard
    Wildcard,
    /// A trailing `$ref` or `$count`
    Qualifier(PathQualifier),
}

impl PathSegment {
    /// Create an identifier segment
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// True if this segment is a qualified name (type cast or operation)
    pub fn is_qualified(&self) -> bool {
        matches!(self, Self::Qualified(_))
    }

    /// True if this segment is a `$ref`/`$count` qualifier
    pub fn is_qualifier(&self) -> bool {
        matches!(self, Self::Qualifier(_))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => write!(f, "{name}"),
            Self::Qualified(qname) => write!(f, "{qname}"),
            Self::Term(term) => write!(f, "{term}"),
            Self::Wildcard => write!(f, "*"),
            Self::Qualifier(q) => write!(f, "{q}"),
        }
    }
}

/// A property path: a short vector of segments
pub type Path = SmallVec<[PathSegment; 4]>;

/// Parses a `/`-separated property path
///
/// Each segment is classified as a qualifier (`$`-prefixed), a wildcard
/// (`*`), a qualified name (contains a dot), a term reference
/// (`@`-prefixed) or a simple identifier.
pub fn path_from_str(s: &str) -> Result<Path> {
    if s.is_empty() {
        return Err(ODataError::path("empty path"));
    }
    let mut path = Path::new();
    for seg in s.split('/') {
        path.push(segment_from_str(seg)?);
    }
    Ok(path)
}

fn segment_from_str(seg: &str) -> Result<PathSegment> {
    if seg == "*" {
        Ok(PathSegment::Wildcard)
    } else if seg.starts_with('$') {
        Ok(PathSegment::Qualifier(seg.parse()?))
    } else if seg.starts_with('@') {
        Ok(PathSegment::Term(seg.parse()?))
    } else if seg.contains('.') {
        Ok(PathSegment::Qualified(seg.parse()?))
    } else if is_simple_identifier(seg) {
        Ok(PathSegment::Identifier(seg.to_string()))
    } else {
        Err(ODataError::path(format!("bad path segment: {seg}")))
    }
}

/// Formats a path as a `/`-separated string
pub fn path_to_str(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for (i, seg) in path.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&seg.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Rating")]
    #[case("Complex/Rating")]
    #[case("Schema.Type/Complex/Rating")]
    #[case("Schema.Action")]
    #[case("Friends/$count")]
    #[case("Friends/Schema.Employee/$ref")]
    #[case("*")]
    fn path_round_trip(#[case] src: &str) {
        let path = path_from_str(src).unwrap();
        assert_eq!(path_to_str(&path), src);
    }

    #[test]
    fn segment_classification() {
        let path = path_from_str("Schema.Type/Complex/@Core.Note#v/*/$count").unwrap();
        assert!(matches!(path[0], PathSegment::Qualified(_)));
        assert!(matches!(path[1], PathSegment::Identifier(_)));
        assert!(matches!(path[2], PathSegment::Term(_)));
        assert!(matches!(path[3], PathSegment::Wildcard));
        assert_eq!(path[4], PathSegment::Qualifier(PathQualifier::Count));
    }

    #[test]
    fn rejects_empty_and_bad_segments() {
        assert!(path_from_str("").is_err());
        assert!(path_from_str("A//B").is_err());
        assert!(path_from_str("$value").is_err());
        assert!(path_from_str("2Bad").is_err());
    }
}
