//! `$select` rules

use odata_diagnostics::{ODataError, Result};
use odata_names::{Path, PathSegment, QualifiedName, is_namespace, path_from_str, path_to_str};
use std::fmt;
use std::str::FromStr;

/// A property being matched against select rules
///
/// Structural and navigation properties have simple names; bound
/// operations are addressed by qualified name.
#[derive(Debug, Clone, Copy)]
pub enum PropertyName<'a> {
    Simple(&'a str),
    Operation(&'a QualifiedName),
}

/// The outcome of matching a select rule against a simple property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleMatch {
    NoMatch,
    Matched,
}

impl SimpleMatch {
    pub fn is_match(self) -> bool {
        self == Self::Matched
    }
}

/// The outcome of matching a select rule against a complex property
#[derive(Debug, Clone, PartialEq)]
pub enum SelectMatch {
    /// The rule does not apply to this property
    NoMatch,
    /// The rule selects the whole property
    Full,
    /// The rule selects part of the property; the remainder applies
    /// inside it
    Partial(SelectItem),
}

/// One `$select` rule
///
/// Either a bare wildcard (all structural and dynamic properties), a
/// namespace wildcard (all operations in a namespace) or a property
/// path of identifiers and type casts.  Term references and path
/// qualifiers are not allowed in select paths; at most two consecutive
/// casts are accepted and then only at the end of the path.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `Ns.*`
    NamespaceWildcard(String),
    /// An identifier/cast path
    Path(Path),
}

impl SelectItem {
    /// Validate a parsed path as a select rule
    pub fn from_path(path: Path) -> Result<Self> {
        if path.is_empty() {
            return Err(ODataError::path("empty select rule"));
        }
        if path.len() == 1 && path[0] == PathSegment::Wildcard {
            return Ok(Self::Wildcard);
        }
        let mut casts = 0;
        for seg in &path {
            if casts >= 2 {
                // two casts in a row must end the path
                return Err(ODataError::path(format!(
                    "bad select path: {}",
                    path_to_str(&path)
                )));
            }
            match seg {
                PathSegment::Identifier(_) => casts = 0,
                PathSegment::Qualified(_) => casts += 1,
                PathSegment::Wildcard => {
                    return Err(ODataError::path(format!(
                        "non-empty select paths must not use *: {}",
                        path_to_str(&path)
                    )));
                }
                PathSegment::Term(_) | PathSegment::Qualifier(_) => {
                    return Err(ODataError::path(format!(
                        "select paths cannot be qualified: {}",
                        path_to_str(&path)
                    )));
                }
            }
        }
        Ok(Self::Path(path))
    }

    /// Matches this rule against a simple structural property,
    /// navigation property or operation
    ///
    /// `type_cast` names the declaring type when the property is only
    /// reachable through a cast.  The result is exact: [`SimpleMatch::
    /// Matched`] only when the rule ends at the property.  A rule that
    /// continues past the matched segment is malformed for a simple
    /// property and fails with a path error.
    pub fn match_simple(
        &self,
        type_cast: Option<&QualifiedName>,
        name: PropertyName<'_>,
        nav: bool,
    ) -> Result<SimpleMatch> {
        match self {
            Self::Wildcard => Ok(match name {
                // the bare wildcard covers structural and dynamic
                // properties, never navigation or operations
                PropertyName::Simple(_) if !nav => SimpleMatch::Matched,
                _ => SimpleMatch::NoMatch,
            }),
            Self::NamespaceWildcard(ns) => Ok(match name {
                PropertyName::Operation(q) if q.namespace == *ns => SimpleMatch::Matched,
                _ => SimpleMatch::NoMatch,
            }),
            Self::Path(path) => {
                let mut i = 0;
                if let Some(cast) = type_cast {
                    match path.get(i) {
                        Some(PathSegment::Qualified(q)) if q == cast => i += 1,
                        _ => return Ok(SimpleMatch::NoMatch),
                    }
                }
                let matched = match (path.get(i), name) {
                    (Some(PathSegment::Identifier(seg)), PropertyName::Simple(n)) => seg == n,
                    (Some(PathSegment::Qualified(seg)), PropertyName::Operation(q)) => seg == q,
                    _ => false,
                };
                if !matched {
                    return Ok(SimpleMatch::NoMatch);
                }
                match path.get(i + 1) {
                    None => Ok(SimpleMatch::Matched),
                    Some(PathSegment::Qualified(_)) => Err(ODataError::path(format!(
                        "type cast after select match: {self}"
                    ))),
                    Some(_) => Err(ODataError::path(format!(
                        "select rule implies a complex property: {self}"
                    ))),
                }
            }
        }
    }

    /// Matches this rule against a complex property
    ///
    /// A prefix match yields [`SelectMatch::Partial`] carrying the
    /// remainder rule that applies inside the property; a rule ending
    /// exactly at the property selects it whole ([`SelectMatch::
    /// Full`]), which callers express as a `*` rule in the derived
    /// sub-options.
    pub fn match_complex(
        &self,
        type_cast: Option<&QualifiedName>,
        name: &str,
    ) -> Result<SelectMatch> {
        match self {
            Self::Wildcard => Ok(if type_cast.is_none() {
                SelectMatch::Full
            } else {
                SelectMatch::NoMatch
            }),
            Self::NamespaceWildcard(_) => Ok(SelectMatch::NoMatch),
            Self::Path(path) => {
                let mut i = 0;
                if let Some(cast) = type_cast {
                    match path.get(i) {
                        Some(PathSegment::Qualified(q)) if q == cast => i += 1,
                        _ => return Ok(SelectMatch::NoMatch),
                    }
                }
                match path.get(i) {
                    Some(PathSegment::Identifier(seg)) if seg == name => {}
                    _ => return Ok(SelectMatch::NoMatch),
                }
                if i + 1 == path.len() {
                    return Ok(SelectMatch::Full);
                }
                let remainder = Path::from(&path[i + 1..]);
                Ok(SelectMatch::Partial(Self::from_path(remainder)?))
            }
        }
    }
}

impl FromStr for SelectItem {
    type Err = ODataError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(ns) = s.strip_suffix(".*") {
            if !is_namespace(ns) {
                return Err(ODataError::path(format!("bad namespace: {ns}")));
            }
            return Ok(Self::NamespaceWildcard(ns.to_string()));
        }
        Self::from_path(path_from_str(s)?)
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "*"),
            Self::NamespaceWildcard(ns) => write!(f, "{ns}.*"),
            Self::Path(path) => write!(f, "{}", path_to_str(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn qn(s: &str) -> QualifiedName {
        s.parse().unwrap()
    }

    #[rstest]
    #[case("Rating")]
    #[case("Complex/Rating")]
    #[case("Schema.Type/Complex/Rating")]
    #[case("Schema.Action")]
    #[case("*")]
    #[case("Ns.*")]
    fn select_item_round_trip(#[case] src: &str) {
        let item: SelectItem = src.parse().unwrap();
        assert_eq!(item.to_string(), src);
    }

    #[rstest]
    #[case("Friends/$count")]
    #[case("Complex/*")]
    #[case("@Core.Description")]
    #[case("Schema.A/Schema.B/Schema.C")]
    fn invalid_select_paths(#[case] src: &str) {
        assert!(src.parse::<SelectItem>().is_err());
    }

    #[test]
    fn simple_match_is_exact() {
        let item: SelectItem = "Rating".parse().unwrap();
        assert_eq!(
            item.match_simple(None, PropertyName::Simple("Rating"), false)
                .unwrap(),
            SimpleMatch::Matched
        );
        assert_eq!(
            item.match_simple(None, PropertyName::Simple("Name"), false)
                .unwrap(),
            SimpleMatch::NoMatch
        );
        // a cast requirement that the rule doesn't name is no match
        assert_eq!(
            item.match_simple(Some(&qn("Schema.T")), PropertyName::Simple("Rating"), false)
                .unwrap(),
            SimpleMatch::NoMatch
        );
    }

    #[test]
    fn simple_match_with_cast() {
        let item: SelectItem = "Schema.T/Rating".parse().unwrap();
        assert_eq!(
            item.match_simple(Some(&qn("Schema.T")), PropertyName::Simple("Rating"), false)
                .unwrap(),
            SimpleMatch::Matched
        );
        assert_eq!(
            item.match_simple(None, PropertyName::Simple("Rating"), false)
                .unwrap(),
            SimpleMatch::NoMatch
        );
    }

    #[test]
    fn simple_match_rejects_continuing_rules() {
        let item: SelectItem = "Complex/Rating".parse().unwrap();
        let err = item
            .match_simple(None, PropertyName::Simple("Complex"), false)
            .unwrap_err();
        assert!(matches!(err, ODataError::Path { .. }));
    }

    #[test]
    fn wildcard_excludes_navigation_and_operations() {
        let item = SelectItem::Wildcard;
        assert!(item
            .match_simple(None, PropertyName::Simple("Rating"), false)
            .unwrap()
            .is_match());
        assert!(!item
            .match_simple(None, PropertyName::Simple("Friends"), true)
            .unwrap()
            .is_match());
        let action = qn("Schema.Action");
        assert!(!item
            .match_simple(None, PropertyName::Operation(&action), false)
            .unwrap()
            .is_match());
    }

    #[test]
    fn namespace_wildcard_matches_operations() {
        let item: SelectItem = "Schema.*".parse().unwrap();
        let action = qn("Schema.Action");
        let other = qn("Other.Action");
        assert!(item
            .match_simple(None, PropertyName::Operation(&action), false)
            .unwrap()
            .is_match());
        assert!(!item
            .match_simple(None, PropertyName::Operation(&other), false)
            .unwrap()
            .is_match());
    }

    #[test]
    fn complex_match_returns_the_remainder() {
        let item: SelectItem = "Complex/Rating".parse().unwrap();
        let expected: SelectItem = "Rating".parse().unwrap();
        assert_eq!(
            item.match_complex(None, "Complex").unwrap(),
            SelectMatch::Partial(expected)
        );
    }

    #[test]
    fn complex_match_exact_is_full() {
        let item: SelectItem = "Complex".parse().unwrap();
        assert_eq!(item.match_complex(None, "Complex").unwrap(), SelectMatch::Full);
        assert_eq!(item.match_complex(None, "Other").unwrap(), SelectMatch::NoMatch);
    }

    #[test]
    fn complex_match_wildcard() {
        assert_eq!(
            SelectItem::Wildcard.match_complex(None, "Complex").unwrap(),
            SelectMatch::Full
        );
        assert_eq!(
            SelectItem::Wildcard
                .match_complex(Some(&qn("Schema.T")), "Complex")
                .unwrap(),
            SelectMatch::NoMatch
        );
    }

    #[test]
    fn complex_match_keeps_remainder_casts() {
        let item: SelectItem = "Complex/Schema.Sub/Rating".parse().unwrap();
        match item.match_complex(None, "Complex").unwrap() {
            SelectMatch::Partial(rule) => {
                assert_eq!(rule.to_string(), "Schema.Sub/Rating");
            }
            other => panic!("expected partial match, got {other:?}"),
        }
    }
}
