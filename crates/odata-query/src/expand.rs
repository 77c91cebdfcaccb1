//! `$expand` rules

use crate::{ExpandOptions, SharedExpandOptions};
use odata_diagnostics::{ODataError, Result};
use odata_names::{Path, PathQualifier, PathSegment, QualifiedName, path_from_str, path_to_str};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// The outcome of matching an expand rule against a navigation
/// property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavMatch {
    /// The rule does not apply
    None,
    /// Matched through a `*` segment
    Wildcard,
    /// Matched the property by name
    Named,
}

impl NavMatch {
    pub fn is_match(self) -> bool {
        self != Self::None
    }
}

/// One `$expand` rule: a path ending at a navigation-shaped segment
/// (`*` counts), optionally followed by one type cast and/or one
/// `$ref`/`$count` qualifier, with nested options for the expansion
///
/// The nested options are held behind a shared handle: remainder rules
/// produced by [`match_complex`](Self::match_complex) and cached match
/// results all refer to the same options instance.  The plain `Clone`
/// impl shares the options; [`deep_clone`](Self::deep_clone) forks
/// them.
#[derive(Debug, Clone)]
pub struct ExpandItem {
    path: Path,
    pub options: SharedExpandOptions,
}

impl ExpandItem {
    /// Validate a parsed path as an expand rule
    pub fn from_path(path: Path) -> Result<Self> {
        if path.is_empty() {
            return Err(ODataError::path("empty expand rule"));
        }
        let mut done = false;
        let mut cast = false;
        let mut prop = false;
        let mut star = false;
        for seg in &path {
            if done {
                return Err(ODataError::path(format!(
                    "unexpected segment in expand path: {}",
                    path_to_str(&path)
                )));
            }
            match seg {
                PathSegment::Qualifier(_) => {
                    done = true;
                    cast = false;
                }
                PathSegment::Wildcard => {
                    star = true;
                    prop = true;
                    cast = false;
                }
                PathSegment::Identifier(_) => {
                    if star {
                        // nothing after * except qualifiers
                        return Err(ODataError::path(format!(
                            "bad expand path: {}",
                            path_to_str(&path)
                        )));
                    }
                    prop = true;
                    cast = false;
                }
                PathSegment::Qualified(_) => {
                    if star || cast {
                        return Err(ODataError::path(format!(
                            "bad expand path: {}",
                            path_to_str(&path)
                        )));
                    }
                    cast = true;
                }
                PathSegment::Term(_) => {
                    return Err(ODataError::path(format!(
                        "bad segment in expand path: {}",
                        path_to_str(&path)
                    )));
                }
            }
        }
        if !prop {
            return Err(ODataError::path(format!(
                "expand requires a navigation property or *: {}",
                path_to_str(&path)
            )));
        }
        Ok(Self {
            path,
            options: Rc::new(RefCell::new(ExpandOptions::new())),
        })
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// The path with any trailing qualifier and type cast removed;
    /// expand rules are unique by trimmed path
    pub fn trimmed_path(&self) -> &[PathSegment] {
        trim_expand_path(&self.path)
    }

    /// Fork this rule, including its nested options
    pub fn deep_clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            options: Rc::new(RefCell::new(self.options.borrow().clone())),
        }
    }

    /// Matches this rule against a navigation property
    ///
    /// Returns the match discriminator plus the optional type cast and
    /// path qualifier that apply to the expansion.  A rule that
    /// matches the property but continues with further property
    /// segments is an incomplete match and fails with a path error:
    /// such rules traverse complex properties and must be matched with
    /// [`match_complex`](Self::match_complex) instead.
    pub fn match_navigation(
        &self,
        type_cast: Option<&QualifiedName>,
        name: &str,
    ) -> Result<(NavMatch, Option<QualifiedName>, Option<PathQualifier>)> {
        let mut i = 0;
        if let Some(cast) = type_cast {
            match &self.path[i] {
                PathSegment::Qualified(q) => {
                    if q != cast {
                        return Ok((NavMatch::None, None, None));
                    }
                    i += 1;
                    if i >= self.path.len() {
                        return Ok((NavMatch::None, None, None));
                    }
                }
                // a wildcard matches cast-reachable properties too;
                // the segment is consumed below
                PathSegment::Wildcard => {}
                _ => return Ok((NavMatch::None, None, None)),
            }
        }
        let matched = match &self.path[i] {
            PathSegment::Wildcard => NavMatch::Wildcard,
            PathSegment::Identifier(seg) if seg == name => NavMatch::Named,
            _ => return Ok((NavMatch::None, None, None)),
        };
        i += 1;
        if i >= self.path.len() {
            return Ok((matched, None, None));
        }
        let mut cast = None;
        if let PathSegment::Qualified(q) = &self.path[i] {
            cast = Some(q.clone());
            i += 1;
            if i >= self.path.len() {
                return Ok((matched, cast, None));
            }
        }
        match &self.path[i] {
            PathSegment::Qualifier(q) => Ok((matched, cast, Some(*q))),
            _ => Err(ODataError::path(format!(
                "incomplete match of expand rule: {self}"
            ))),
        }
    }

    /// Matches this rule against a complex property
    ///
    /// An expand rule traversing a complex property implicitly selects
    /// it; the returned rule is the remainder to apply inside the
    /// property (sharing this rule's options), or a fork of the whole
    /// rule for `*` (a wildcard matches navigation properties inside
    /// complex properties too).  A rule ending exactly at the complex
    /// property (modulo casts and qualifiers) is malformed and fails
    /// with a path error.
    pub fn match_complex(
        &self,
        type_cast: Option<&QualifiedName>,
        name: &str,
    ) -> Result<Option<ExpandItem>> {
        let mut i = 0;
        if let Some(cast) = type_cast {
            match &self.path[i] {
                PathSegment::Qualified(q) => {
                    if q != cast {
                        return Ok(None);
                    }
                    i += 1;
                    if i >= self.path.len() {
                        return Ok(None);
                    }
                }
                PathSegment::Wildcard => {}
                _ => return Ok(None),
            }
        }
        match &self.path[i] {
            PathSegment::Wildcard => Ok(Some(self.deep_clone())),
            PathSegment::Identifier(seg) if seg == name => {
                // there must be more than a cast or qualifier left
                let tail_has_property = self.path[i + 1..].iter().any(|seg| {
                    matches!(seg, PathSegment::Identifier(_) | PathSegment::Wildcard)
                });
                if !tail_has_property {
                    return Err(ODataError::path(format!(
                        "expand rule matches complex property: {self}"
                    )));
                }
                let mut item = Self::from_path(Path::from(&self.path[i + 1..]))?;
                item.options = Rc::clone(&self.options);
                Ok(Some(item))
            }
            _ => Ok(None),
        }
    }
}

/// Strips a trailing `$ref`/`$count` qualifier and type cast from an
/// expand path
pub fn trim_expand_path(path: &[PathSegment]) -> &[PathSegment] {
    let mut end = path.len();
    if end > 1 && matches!(path[end - 1], PathSegment::Qualifier(_)) {
        end -= 1;
    }
    if end > 1 && matches!(path[end - 1], PathSegment::Qualified(_)) {
        end -= 1;
    }
    &path[..end]
}

impl FromStr for ExpandItem {
    type Err = ODataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_path(path_from_str(s)?)
    }
}

impl fmt::Display for ExpandItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", path_to_str(&self.path))?;
        let options = self.options.borrow();
        if !options.is_default() {
            write!(f, "({options})")?;
        }
        Ok(())
    }
}
