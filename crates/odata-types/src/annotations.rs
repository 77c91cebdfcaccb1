//! Applied annotations
//!
//! Model elements carry a set of applied annotations, each pairing a
//! declared term with an optional qualifier and an optional constant
//! or dynamic expression.  An annotation with no expression takes the
//! term's default value.

use crate::Term;
use odata_ast::Expression;
use odata_diagnostics::{ODataError, Result};
use odata_names::TermRef;
use std::sync::Arc;

/// A term applied to a model element
#[derive(Debug, Clone)]
pub struct Annotation {
    /// The declared term being applied
    pub term: Arc<Term>,
    /// Optional qualifier distinguishing multiple applications
    pub qualifier: Option<String>,
    /// The annotation value; `None` means the term's default applies
    pub expression: Option<Arc<Expression>>,
}

impl Annotation {
    /// Apply a term with a constant or dynamic expression
    pub fn new(term: Arc<Term>, expression: Expression) -> Self {
        Self {
            term,
            qualifier: None,
            expression: Some(Arc::new(expression)),
        }
    }

    /// Apply a term taking its default value
    pub fn with_default(term: Arc<Term>) -> Self {
        Self {
            term,
            qualifier: None,
            expression: None,
        }
    }

    /// Add a qualifier to this application
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// The term reference that addresses this annotation
    pub fn term_ref(&self) -> TermRef {
        TermRef {
            name: self.term.qname.clone(),
            qualifier: self.qualifier.clone(),
        }
    }
}

/// The annotations applied to one model element
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    items: Vec<Annotation>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an annotation; the term/qualifier pair must be unique
    pub fn insert(&mut self, annotation: Annotation) -> Result<()> {
        let term_ref = annotation.term_ref();
        if self.lookup(&term_ref).is_some() {
            return Err(ODataError::duplicate_name(term_ref.to_string()));
        }
        self.items.push(annotation);
        Ok(())
    }

    /// Find an annotation by exact term and qualifier match
    pub fn lookup(&self, term_ref: &TermRef) -> Option<&Annotation> {
        self.items.iter().find(|a| {
            a.term.qname == term_ref.name && a.qualifier == term_ref.qualifier
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
