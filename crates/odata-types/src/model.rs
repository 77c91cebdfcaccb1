//! Entity model and container
//!
//! The model is the namespace of qualified names: types, annotation
//! terms and operation overload sets.  The container holds the named
//! entity sets and singletons that form the service's root.

use crate::{Annotations, TypeDef, TypeRef};
use indexmap::IndexMap;
use odata_ast::Literal;
use odata_diagnostics::{ODataError, Result};
use odata_names::QualifiedName;
use std::sync::Arc;

/// A declared annotation term
#[derive(Debug)]
pub struct Term {
    pub qname: QualifiedName,
    /// The term's value type
    pub type_ref: TypeRef,
    /// Default value taken by annotations with no expression
    pub default_value: Option<Literal>,
}

impl Term {
    pub fn new(qname: QualifiedName, type_ref: &TypeRef) -> Arc<Self> {
        Arc::new(Self {
            qname,
            type_ref: type_ref.clone(),
            default_value: None,
        })
    }

    pub fn with_default(
        qname: QualifiedName,
        type_ref: &TypeRef,
        default_value: Literal,
    ) -> Arc<Self> {
        Arc::new(Self {
            qname,
            type_ref: type_ref.clone(),
            default_value: Some(default_value),
        })
    }
}

/// A parameter of a function or action overload
#[derive(Debug)]
pub struct Parameter {
    pub name: String,
    pub type_ref: TypeRef,
    pub collection: bool,
    pub nullable: bool,
}

/// One overload of a function or action
#[derive(Debug)]
pub struct FunctionDef {
    /// Binding parameter type for bound overloads; the type an
    /// instance must be derived from for the overload to apply
    pub binding: Option<TypeRef>,
    /// Non-binding parameters
    pub params: Vec<Parameter>,
    /// Return type; `None` for actions that return nothing
    pub return_type: Option<TypeRef>,
    pub return_collection: bool,
    /// True for actions (side effects, POST); false for functions
    pub is_action: bool,
}

impl FunctionDef {
    /// Look up a non-binding parameter by name
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// The overload set declared under one qualified name
#[derive(Debug)]
pub struct FunctionOverloads {
    pub qname: QualifiedName,
    pub overloads: Vec<Arc<FunctionDef>>,
}

impl FunctionOverloads {
    pub fn new(qname: QualifiedName, overloads: Vec<FunctionDef>) -> Arc<Self> {
        Arc::new(Self {
            qname,
            overloads: overloads.into_iter().map(Arc::new).collect(),
        })
    }

    /// Resolve an overload against a binding type and the set of named
    /// arguments supplied
    ///
    /// A bound overload matches when the binding type is derived from
    /// the overload's binding parameter type; an unbound overload
    /// matches only an unbound call.  The supplied argument names must
    /// cover the overload's non-binding parameters exactly.
    pub fn resolve(
        &self,
        binding: Option<&TypeRef>,
        arg_names: &[&str],
    ) -> Option<Arc<FunctionDef>> {
        self.overloads
            .iter()
            .find(|overload| {
                let binding_matches = match (&overload.binding, binding) {
                    (None, None) => true,
                    (Some(expected), Some(actual)) => actual.is_derived_from(expected),
                    _ => false,
                };
                binding_matches
                    && overload.params.len() == arg_names.len()
                    && overload
                        .params
                        .iter()
                        .all(|p| arg_names.contains(&p.name.as_str()))
            })
            .cloned()
    }
}

/// A named element of the model
#[derive(Debug, Clone)]
pub enum ModelElement {
    Type(TypeRef),
    Term(Arc<Term>),
    Function(Arc<FunctionOverloads>),
}

/// The entity data model: the namespace of declared elements plus the
/// optional entity container
#[derive(Debug, Default)]
pub struct EntityModel {
    elements: IndexMap<QualifiedName, ModelElement>,
    container: Option<Arc<EntityContainer>>,
}

impl EntityModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a named type
    pub fn declare_type(&mut self, type_ref: TypeRef) -> Result<TypeRef> {
        let qname = type_ref
            .qname()
            .cloned()
            .ok_or_else(|| ODataError::model("cannot declare an unnamed type"))?;
        self.declare(qname, ModelElement::Type(type_ref.clone()))?;
        Ok(type_ref)
    }

    /// Declare an annotation term
    pub fn declare_term(&mut self, term: Arc<Term>) -> Result<Arc<Term>> {
        self.declare(term.qname.clone(), ModelElement::Term(term.clone()))?;
        Ok(term)
    }

    /// Declare a function or action overload set
    pub fn declare_function(
        &mut self,
        overloads: Arc<FunctionOverloads>,
    ) -> Result<Arc<FunctionOverloads>> {
        self.declare(
            overloads.qname.clone(),
            ModelElement::Function(overloads.clone()),
        )?;
        Ok(overloads)
    }

    fn declare(&mut self, qname: QualifiedName, element: ModelElement) -> Result<()> {
        if self.elements.contains_key(&qname) {
            return Err(ODataError::duplicate_name(qname.to_string()));
        }
        self.elements.insert(qname, element);
        Ok(())
    }

    /// Look up any model element by qualified name
    pub fn qualified_get(&self, qname: &QualifiedName) -> Option<&ModelElement> {
        self.elements.get(qname)
    }

    /// Look up a type, failing if the name is missing or names
    /// something else
    pub fn qualified_type(&self, qname: &QualifiedName) -> Result<TypeRef> {
        match self.qualified_get(qname) {
            Some(ModelElement::Type(t)) => Ok(t.clone()),
            _ => Err(ODataError::model(format!("no such type: {qname}"))),
        }
    }

    /// Look up an annotation term
    pub fn term(&self, qname: &QualifiedName) -> Result<Arc<Term>> {
        match self.qualified_get(qname) {
            Some(ModelElement::Term(t)) => Ok(t.clone()),
            _ => Err(ODataError::model(format!("no such term: {qname}"))),
        }
    }

    /// Look up a function or action overload set
    pub fn function(&self, qname: &QualifiedName) -> Result<Arc<FunctionOverloads>> {
        match self.qualified_get(qname) {
            Some(ModelElement::Function(f)) => Ok(f.clone()),
            _ => Err(ODataError::model(format!("no such operation: {qname}"))),
        }
    }

    pub fn set_container(&mut self, container: EntityContainer) {
        self.container = Some(Arc::new(container));
    }

    pub fn container(&self) -> Option<&Arc<EntityContainer>> {
        self.container.as_ref()
    }
}

/// A declared entity set
#[derive(Debug)]
pub struct EntitySetDecl {
    pub name: String,
    pub entity_type: TypeRef,
    /// The entity-set value type: `EntitySet(entity_type)`
    pub set_type: TypeRef,
    pub annotations: Annotations,
}

impl EntitySetDecl {
    pub fn new(name: impl Into<String>, entity_type: &TypeRef) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.clone(),
            set_type: TypeDef::entity_set_of(entity_type),
            annotations: Annotations::new(),
        }
    }
}

/// A declared singleton
#[derive(Debug)]
pub struct SingletonDecl {
    pub name: String,
    pub entity_type: TypeRef,
    /// The singleton value type: `Singleton(entity_type)`
    pub singleton_type: TypeRef,
    pub annotations: Annotations,
}

impl SingletonDecl {
    pub fn new(name: impl Into<String>, entity_type: &TypeRef) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.clone(),
            singleton_type: TypeDef::singleton_of(entity_type),
            annotations: Annotations::new(),
        }
    }
}

/// The entity container: the service root's named children
#[derive(Debug, Default)]
pub struct EntityContainer {
    name: String,
    entity_sets: IndexMap<String, Arc<EntitySetDecl>>,
    singletons: IndexMap<String, Arc<SingletonDecl>>,
}

impl EntityContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_sets: IndexMap::new(),
            singletons: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare an entity set; names share one namespace with
    /// singletons
    pub fn declare_entity_set(&mut self, decl: EntitySetDecl) -> Result<Arc<EntitySetDecl>> {
        if self.entity_sets.contains_key(&decl.name) || self.singletons.contains_key(&decl.name) {
            return Err(ODataError::duplicate_name(decl.name));
        }
        let decl = Arc::new(decl);
        self.entity_sets.insert(decl.name.clone(), decl.clone());
        Ok(decl)
    }

    /// Declare a singleton
    pub fn declare_singleton(&mut self, decl: SingletonDecl) -> Result<Arc<SingletonDecl>> {
        if self.entity_sets.contains_key(&decl.name) || self.singletons.contains_key(&decl.name) {
            return Err(ODataError::duplicate_name(decl.name));
        }
        let decl = Arc::new(decl);
        self.singletons.insert(decl.name.clone(), decl.clone());
        Ok(decl)
    }

    pub fn entity_set(&self, name: &str) -> Option<&Arc<EntitySetDecl>> {
        self.entity_sets.get(name)
    }

    pub fn singleton(&self, name: &str) -> Option<&Arc<SingletonDecl>> {
        self.singletons.get(name)
    }

    pub fn entity_sets(&self) -> impl Iterator<Item = &Arc<EntitySetDecl>> {
        self.entity_sets.values()
    }

    pub fn singletons(&self) -> impl Iterator<Item = &Arc<SingletonDecl>> {
        self.singletons.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm;

    fn qn(s: &str) -> QualifiedName {
        s.parse().unwrap()
    }

    fn person_type() -> TypeRef {
        TypeDef::entity(qn("Schema.Person"))
            .key_property("UserName", &edm().string)
            .build()
            .unwrap()
    }

    #[test]
    fn model_namespace_is_shared_across_element_kinds() {
        let mut model = EntityModel::new();
        model.declare_type(person_type()).unwrap();
        let result = model.declare_term(Term::new(qn("Schema.Person"), &edm().string));
        assert!(matches!(result, Err(ODataError::DuplicateName { .. })));
    }

    #[test]
    fn qualified_type_rejects_terms() {
        let mut model = EntityModel::new();
        model
            .declare_term(Term::new(qn("Core.Description"), &edm().string))
            .unwrap();
        assert!(model.qualified_type(&qn("Core.Description")).is_err());
        assert!(model.term(&qn("Core.Description")).is_ok());
    }

    #[test]
    fn container_names_are_unique_across_sets_and_singletons() {
        let person = person_type();
        let mut container = EntityContainer::new("Service");
        container
            .declare_entity_set(EntitySetDecl::new("People", &person))
            .unwrap();
        let result = container.declare_singleton(SingletonDecl::new("People", &person));
        assert!(matches!(result, Err(ODataError::DuplicateName { .. })));
    }

    #[test]
    fn overload_resolution_matches_binding_and_names() {
        let person = person_type();
        let manager = TypeDef::entity(qn("Schema.Manager"))
            .base(&person)
            .build()
            .unwrap();
        let overloads = FunctionOverloads::new(
            qn("Schema.Promote"),
            vec![
                FunctionDef {
                    binding: Some(person.clone()),
                    params: vec![Parameter {
                        name: "Grade".to_string(),
                        type_ref: edm().int32.clone(),
                        collection: false,
                        nullable: false,
                    }],
                    return_type: Some(person.clone()),
                    return_collection: false,
                    is_action: false,
                },
                FunctionDef {
                    binding: None,
                    params: vec![],
                    return_type: Some(edm().int32.clone()),
                    return_collection: false,
                    is_action: false,
                },
            ],
        );
        // derived binding type matches the bound overload
        let resolved = overloads.resolve(Some(&manager), &["Grade"]).unwrap();
        assert!(resolved.binding.is_some());
        // unbound call with no args matches the unbound overload
        let resolved = overloads.resolve(None, &[]).unwrap();
        assert!(resolved.binding.is_none());
        // wrong argument names resolve to nothing
        assert!(overloads.resolve(Some(&manager), &["Level"]).is_none());
    }
}
