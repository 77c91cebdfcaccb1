//! Qualified names and term references

use crate::is_simple_identifier;
use odata_diagnostics::ODataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A namespace-qualified name such as `Schema.Employee`
///
/// The namespace is the dotted prefix up to the final dot; the name is
/// the last segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Dotted namespace, e.g. `Org.OData.Core.V1`
    pub namespace: String,
    /// The unqualified name
    pub name: String,
}

impl QualifiedName {
    /// Create a qualified name from namespace and name parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = ODataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = s
            .rsplit_once('.')
            .ok_or_else(|| ODataError::model(format!("expected qualified name: {s}")))?;
        if !crate::is_namespace(namespace) || !is_simple_identifier(name) {
            return Err(ODataError::model(format!("bad qualified name: {s}")));
        }
        Ok(Self::new(namespace, name))
    }
}

/// A reference to an annotation term, `@Ns.Term` or `@Ns.Term#qualifier`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermRef {
    /// The qualified term name
    pub name: QualifiedName,
    /// Optional term qualifier
    pub qualifier: Option<String>,
}

impl TermRef {
    /// Create a term reference with no qualifier
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            qualifier: None,
        }
    }

    /// Create a term reference with a qualifier
    pub fn with_qualifier(name: QualifiedName, qualifier: impl Into<String>) -> Self {
        Self {
            name,
            qualifier: Some(qualifier.into()),
        }
    }
}

impl fmt::Display for TermRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if let Some(q) = &self.qualifier {
            write!(f, "#{q}")?;
        }
        Ok(())
    }
}

impl FromStr for TermRef {
    type Err = ODataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('@')
            .ok_or_else(|| ODataError::model(format!("term reference must start with '@': {s}")))?;
        let (name, qualifier) = match body.split_once('#') {
            Some((name, q)) => {
                if !is_simple_identifier(q) {
                    return Err(ODataError::model(format!("bad term qualifier: {s}")));
                }
                (name, Some(q.to_string()))
            }
            None => (body, None),
        };
        Ok(Self {
            name: name.parse()?,
            qualifier,
        })
    }
}
