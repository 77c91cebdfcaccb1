//! Type definitions and derivation
//!
//! [`TypeDef`] is the single node type of the type graph; its
//! [`TypeKind`] discriminates primitives, enumerations, complex and
//! entity types, and the collection-like kinds.  Structured types
//! chain to an optional base type; property lookup and derivation
//! checks walk that chain.

use crate::{Annotations, EntityModel, PrimitiveKind, edm};
use indexmap::IndexMap;
use odata_ast::Literal;
use odata_diagnostics::{ODataError, Result};
use odata_names::{Path, PathSegment, QualifiedName};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a type definition
pub type TypeRef = Arc<TypeDef>;

/// A type in the entity data model
#[derive(Debug)]
pub struct TypeDef {
    name: Option<QualifiedName>,
    base: Option<TypeRef>,
    abstract_type: bool,
    open_type: bool,
    kind: TypeKind,
    annotations: Annotations,
}

/// The closed set of type kinds
#[derive(Debug)]
pub enum TypeKind {
    /// A primitive type of the Edm namespace
    Primitive(PrimitiveKind),
    /// An enumeration type
    Enumeration(EnumType),
    /// A complex (structured, keyless) type
    Complex(StructuredType),
    /// An entity type
    Entity(EntityType),
    /// An unordered collection of primitive, enumeration or complex
    /// values
    Collection { item_type: TypeRef },
    /// A keyed collection of entities
    EntitySet { item_type: TypeRef },
    /// A named single entity
    Singleton { item_type: TypeRef },
}

/// An enumeration type: named members over an integral underlying type
#[derive(Debug)]
pub struct EnumType {
    pub underlying: PrimitiveKind,
    pub is_flags: bool,
    pub members: IndexMap<String, i64>,
}

/// The properties a structured type declares itself
///
/// Inherited properties are reached through the base chain, not copied
/// into derived types.
#[derive(Debug, Default)]
pub struct StructuredType {
    properties: IndexMap<String, PropertyDef>,
}

impl StructuredType {
    /// The properties declared directly on this type, in declaration
    /// order
    pub fn declared_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.values()
    }

    /// Look up a property declared directly on this type
    pub fn declared_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.get(name)
    }
}

/// An entity type: a structured type plus its declared key
#[derive(Debug)]
pub struct EntityType {
    pub structure: StructuredType,
    /// Key properties; empty when the key is inherited (or, for
    /// abstract types, not declared at all)
    pub key: Vec<KeyProperty>,
}

/// One property reference in an entity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyProperty {
    /// The alias used in key predicates; for single-segment keys this
    /// is the property name itself
    pub alias: String,
    /// Path of property names from the entity to a primitive property,
    /// traversing complex properties if necessary
    pub path: SmallVec<[String; 2]>,
}

impl KeyProperty {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: SmallVec::from_iter([name.clone()]),
            alias: name,
        }
    }

    pub fn aliased(alias: impl Into<String>, path: &[&str]) -> Self {
        Self {
            alias: alias.into(),
            path: path.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// A structural or navigation property
#[derive(Debug)]
pub enum PropertyDef {
    Structural(Property),
    Navigation(NavigationProperty),
}

impl PropertyDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Structural(p) => &p.name,
            Self::Navigation(p) => &p.name,
        }
    }
}

/// A structural property
#[derive(Debug)]
pub struct Property {
    pub name: String,
    /// The item type: primitive, enumeration or complex
    pub type_ref: TypeRef,
    /// True when the property holds a collection of `type_ref` items
    pub collection: bool,
    pub nullable: bool,
    pub default_value: Option<Literal>,
}

/// A navigation property
#[derive(Debug)]
pub struct NavigationProperty {
    pub name: String,
    /// The target entity type
    pub entity_type: TypeRef,
    /// True when the property navigates to a collection of entities
    pub collection: bool,
    /// True when the target entities are contained by the source
    pub contains_target: bool,
    pub nullable: bool,
}

impl TypeDef {
    fn new(
        name: Option<QualifiedName>,
        base: Option<TypeRef>,
        abstract_type: bool,
        open_type: bool,
        kind: TypeKind,
        annotations: Annotations,
    ) -> TypeRef {
        Arc::new(Self {
            name,
            base,
            abstract_type,
            open_type,
            kind,
            annotations,
        })
    }

    pub(crate) fn primitive(kind: PrimitiveKind, base: Option<TypeRef>) -> TypeRef {
        Self::new(
            Some(QualifiedName::new("Edm", kind.name())),
            base,
            kind == PrimitiveKind::PrimitiveType,
            false,
            TypeKind::Primitive(kind),
            Annotations::new(),
        )
    }

    pub(crate) fn structured_base(name: &str, entity: bool) -> TypeRef {
        let kind = if entity {
            TypeKind::Entity(EntityType {
                structure: StructuredType::default(),
                key: Vec::new(),
            })
        } else {
            TypeKind::Complex(StructuredType::default())
        };
        Self::new(
            Some(QualifiedName::new("Edm", name)),
            None,
            true,
            false,
            kind,
            Annotations::new(),
        )
    }

    /// Start building a complex type derived (by default) from
    /// `Edm.ComplexType`
    pub fn complex(qname: QualifiedName) -> StructuredTypeBuilder {
        StructuredTypeBuilder::new(qname, false)
    }

    /// Start building an entity type derived (by default) from
    /// `Edm.EntityType`
    pub fn entity(qname: QualifiedName) -> StructuredTypeBuilder {
        StructuredTypeBuilder::new(qname, true)
    }

    /// Define an enumeration type
    pub fn enumeration(
        qname: QualifiedName,
        is_flags: bool,
        members: &[(&str, i64)],
    ) -> Result<TypeRef> {
        let mut table = IndexMap::new();
        for (name, value) in members {
            if table.insert((*name).to_string(), *value).is_some() {
                return Err(ODataError::duplicate_name(*name));
            }
        }
        Ok(Self::new(
            Some(qname),
            None,
            false,
            false,
            TypeKind::Enumeration(EnumType {
                underlying: PrimitiveKind::Int32,
                is_flags,
                members: table,
            }),
            Annotations::new(),
        ))
    }

    /// An anonymous collection of the given item type
    pub fn collection_of(item_type: &TypeRef) -> TypeRef {
        Self::new(
            None,
            None,
            false,
            false,
            TypeKind::Collection {
                item_type: item_type.clone(),
            },
            Annotations::new(),
        )
    }

    /// An anonymous entity set of the given entity type
    pub fn entity_set_of(entity_type: &TypeRef) -> TypeRef {
        Self::new(
            None,
            None,
            false,
            false,
            TypeKind::EntitySet {
                item_type: entity_type.clone(),
            },
            Annotations::new(),
        )
    }

    /// An anonymous singleton of the given entity type
    pub fn singleton_of(entity_type: &TypeRef) -> TypeRef {
        Self::new(
            None,
            None,
            false,
            false,
            TypeKind::Singleton {
                item_type: entity_type.clone(),
            },
            Annotations::new(),
        )
    }

    /// The qualified name, if the type is named
    pub fn qname(&self) -> Option<&QualifiedName> {
        self.name.as_ref()
    }

    /// The base type, if any
    pub fn base(&self) -> Option<&TypeRef> {
        self.base.as_ref()
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_abstract(&self) -> bool {
        self.abstract_type
    }

    /// True for open structured types, which accept dynamic properties
    pub fn is_open(&self) -> bool {
        self.open_type
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(_))
    }

    /// The primitive kind, if this is a primitive type
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match &self.kind {
            TypeKind::Primitive(k) => Some(*k),
            _ => None,
        }
    }

    pub fn is_enumeration(&self) -> bool {
        matches!(self.kind, TypeKind::Enumeration(_))
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.kind, TypeKind::Complex(_))
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, TypeKind::Entity(_))
    }

    pub fn is_structured(&self) -> bool {
        self.is_complex() || self.is_entity()
    }

    /// True for the collection-like kinds: collection, entity set and
    /// singleton
    pub fn is_collection_like(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Collection { .. } | TypeKind::EntitySet { .. } | TypeKind::Singleton { .. }
        )
    }

    /// The item type of a collection-like type
    pub fn item_type(&self) -> Option<&TypeRef> {
        match &self.kind {
            TypeKind::Collection { item_type }
            | TypeKind::EntitySet { item_type }
            | TypeKind::Singleton { item_type } => Some(item_type),
            _ => None,
        }
    }

    /// The enumeration definition, if this is an enumeration type
    pub fn enum_type(&self) -> Option<&EnumType> {
        match &self.kind {
            TypeKind::Enumeration(e) => Some(e),
            _ => None,
        }
    }

    /// The declared-property table, for complex and entity types
    pub fn structure(&self) -> Option<&StructuredType> {
        match &self.kind {
            TypeKind::Complex(s) => Some(s),
            TypeKind::Entity(e) => Some(&e.structure),
            _ => None,
        }
    }

    /// True if `self` is `other` or is (transitively) derived from it
    pub fn is_derived_from(&self, other: &TypeDef) -> bool {
        let mut current = self;
        loop {
            if std::ptr::eq(current, other) {
                return true;
            }
            match &current.base {
                Some(base) => current = base,
                None => return false,
            }
        }
    }

    /// The closest common ancestor of two types, if they share one
    pub fn common_ancestor(a: &TypeRef, b: &TypeRef) -> Option<TypeRef> {
        let mut current = a.clone();
        loop {
            if b.is_derived_from(&current) {
                return Some(current);
            }
            let base = current.base.clone()?;
            current = base;
        }
    }

    /// Look up a declared or inherited property
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        let mut current = self;
        loop {
            if let Some(p) = current.structure().and_then(|s| s.declared_property(name)) {
                return Some(p);
            }
            current = current.base.as_deref()?;
        }
    }

    /// The qualified name of the nearest type in the base chain that
    /// declares `name`
    pub fn declared_in(&self, name: &str) -> Option<&QualifiedName> {
        let mut current = self;
        loop {
            if current
                .structure()
                .and_then(|s| s.declared_property(name))
                .is_some()
            {
                return current.name.as_ref();
            }
            current = current.base.as_deref()?;
        }
    }

    /// All declared and inherited properties, base-first, in
    /// declaration order
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDef> {
        let mut chain: SmallVec<[&TypeDef; 4]> = SmallVec::new();
        let mut current = Some(self);
        while let Some(t) = current {
            chain.push(t);
            current = t.base.as_deref();
        }
        chain
            .into_iter()
            .rev()
            .filter_map(|t| t.structure())
            .flat_map(StructuredType::declared_properties)
    }

    /// The key of an entity type, walking the base chain to the
    /// declaring type
    pub fn key(&self) -> Result<&[KeyProperty]> {
        let mut current = self;
        loop {
            match &current.kind {
                TypeKind::Entity(e) => {
                    if !e.key.is_empty() {
                        return Ok(&e.key);
                    }
                }
                _ => return Err(ODataError::model("key requested on a non-entity type")),
            }
            current = current.base.as_deref().ok_or(ODataError::MissingKey)?;
        }
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.kind) {
            (Some(qname), _) => write!(f, "{qname}"),
            (None, TypeKind::Collection { item_type }) => write!(f, "Collection({item_type})"),
            (None, TypeKind::EntitySet { item_type }) => write!(f, "EntitySet({item_type})"),
            (None, TypeKind::Singleton { item_type }) => write!(f, "Singleton({item_type})"),
            (None, _) => write!(f, "<anonymous>"),
        }
    }
}

/// Builder for complex and entity types
pub struct StructuredTypeBuilder {
    name: QualifiedName,
    entity: bool,
    base: Option<TypeRef>,
    abstract_type: bool,
    open_type: bool,
    properties: Vec<PropertyDef>,
    key: Vec<KeyProperty>,
    annotations: Annotations,
}

impl StructuredTypeBuilder {
    fn new(name: QualifiedName, entity: bool) -> Self {
        Self {
            name,
            entity,
            base: None,
            abstract_type: false,
            open_type: false,
            properties: Vec::new(),
            key: Vec::new(),
            annotations: Annotations::new(),
        }
    }

    /// Derive from a named structured type instead of the Edm base
    pub fn base(mut self, base: &TypeRef) -> Self {
        self.base = Some(base.clone());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.abstract_type = true;
        self
    }

    pub fn open_type(mut self) -> Self {
        self.open_type = true;
        self
    }

    /// Declare a nullable structural property
    pub fn property(mut self, name: impl Into<String>, type_ref: &TypeRef) -> Self {
        self.properties.push(PropertyDef::Structural(Property {
            name: name.into(),
            type_ref: type_ref.clone(),
            collection: false,
            nullable: true,
            default_value: None,
        }));
        self
    }

    /// Declare a non-nullable structural property
    pub fn required_property(mut self, name: impl Into<String>, type_ref: &TypeRef) -> Self {
        self.properties.push(PropertyDef::Structural(Property {
            name: name.into(),
            type_ref: type_ref.clone(),
            collection: false,
            nullable: false,
            default_value: None,
        }));
        self
    }

    /// Declare a structural property with a default value
    pub fn property_with_default(
        mut self,
        name: impl Into<String>,
        type_ref: &TypeRef,
        default_value: Literal,
    ) -> Self {
        self.properties.push(PropertyDef::Structural(Property {
            name: name.into(),
            type_ref: type_ref.clone(),
            collection: false,
            nullable: true,
            default_value: Some(default_value),
        }));
        self
    }

    /// Declare a collection-valued structural property
    pub fn collection_property(mut self, name: impl Into<String>, item_type: &TypeRef) -> Self {
        self.properties.push(PropertyDef::Structural(Property {
            name: name.into(),
            type_ref: item_type.clone(),
            collection: true,
            nullable: true,
            default_value: None,
        }));
        self
    }

    /// Declare a non-nullable property and include it in the key
    pub fn key_property(mut self, name: impl Into<String>, type_ref: &TypeRef) -> Self {
        let name = name.into();
        self.key.push(KeyProperty::new(name.clone()));
        self.required_property(name, type_ref)
    }

    /// Declare the key explicitly (composite or aliased keys)
    pub fn key(mut self, key: Vec<KeyProperty>) -> Self {
        self.key = key;
        self
    }

    /// Declare a single-valued navigation property
    pub fn navigation(mut self, name: impl Into<String>, entity_type: &TypeRef) -> Self {
        self.properties.push(PropertyDef::Navigation(NavigationProperty {
            name: name.into(),
            entity_type: entity_type.clone(),
            collection: false,
            contains_target: false,
            nullable: true,
        }));
        self
    }

    /// Declare a collection-valued navigation property
    pub fn collection_navigation(mut self, name: impl Into<String>, entity_type: &TypeRef) -> Self {
        self.properties.push(PropertyDef::Navigation(NavigationProperty {
            name: name.into(),
            entity_type: entity_type.clone(),
            collection: true,
            contains_target: false,
            nullable: false,
        }));
        self
    }

    /// Declare a containment navigation property
    pub fn contained_navigation(
        mut self,
        name: impl Into<String>,
        entity_type: &TypeRef,
        collection: bool,
    ) -> Self {
        self.properties.push(PropertyDef::Navigation(NavigationProperty {
            name: name.into(),
            entity_type: entity_type.clone(),
            collection,
            contains_target: true,
            nullable: !collection,
        }));
        self
    }

    /// Apply an annotation to the type
    pub fn annotate(mut self, annotation: crate::Annotation) -> Result<Self> {
        self.annotations.insert(annotation)?;
        Ok(self)
    }

    /// Close the type
    ///
    /// Fails with a duplicate-name error if two properties share a
    /// name, or a model error if the base type has the wrong kind.
    pub fn build(self) -> Result<TypeRef> {
        let base = match self.base {
            Some(base) => {
                if base.is_entity() != self.entity {
                    return Err(ODataError::model(format!(
                        "base type {base} has the wrong kind for {}",
                        self.name
                    )));
                }
                base
            }
            None if self.entity => edm().entity_type.clone(),
            None => edm().complex_type.clone(),
        };
        let mut table = IndexMap::with_capacity(self.properties.len());
        for p in self.properties {
            let name = p.name().to_string();
            if table.insert(name.clone(), p).is_some() {
                return Err(ODataError::duplicate_name(name));
            }
        }
        let structure = StructuredType { properties: table };
        let kind = if self.entity {
            TypeKind::Entity(EntityType {
                structure,
                key: self.key,
            })
        } else {
            TypeKind::Complex(structure)
        };
        Ok(Arc::new(TypeDef {
            name: Some(self.name),
            base: Some(base),
            abstract_type: self.abstract_type,
            open_type: self.open_type,
            kind,
            annotations: self.annotations,
        }))
    }
}

enum PathStep {
    Complex(TypeRef),
    Structural,
    Navigation(TypeRef),
}

/// Splits a property path at navigation boundaries
///
/// Returns the sub-paths that address, in turn, each navigation
/// property traversed and finally (unless `navigation` is set) a
/// structural property.  Type-cast segments are minimised: a cast is
/// kept only when the following property cannot be reached without it,
/// and then the recorded cast is the property's declaring type.  With
/// `navigation` set the path must end at a navigation property.
pub fn split_path(
    entity: &TypeRef,
    path: &[PathSegment],
    model: Option<&EntityModel>,
    navigation: bool,
) -> Result<Vec<Path>> {
    let mut result: Vec<Path> = Vec::new();
    let mut next_type = entity.clone();
    let mut done = false;
    let mut i = 0;
    while i < path.len() {
        if done {
            return Err(ODataError::path(
                "property path continues past a terminal property",
            ));
        }
        let mut ctype = next_type.clone();
        let mut ctype_cast = ctype.clone();
        let mut xpath = Path::new();
        let mut terminal: Option<PathStep> = None;
        while i < path.len() {
            match &path[i] {
                PathSegment::Identifier(name) => {
                    let step = match ctype_cast.property(name) {
                        Some(PropertyDef::Structural(p)) if p.type_ref.is_complex() => {
                            PathStep::Complex(p.type_ref.clone())
                        }
                        Some(PropertyDef::Structural(_)) => PathStep::Structural,
                        Some(PropertyDef::Navigation(np)) => {
                            PathStep::Navigation(np.entity_type.clone())
                        }
                        None => {
                            return Err(ODataError::path(format!(
                                "no such property: {name} on {ctype_cast}"
                            )));
                        }
                    };
                    if ctype.property(name).is_none() {
                        // only reachable through the cast; record the
                        // declaring type
                        let declaring = ctype_cast.declared_in(name).ok_or_else(|| {
                            ODataError::path(format!("{name} declared on an unnamed type"))
                        })?;
                        xpath.push(PathSegment::Qualified(declaring.clone()));
                    }
                    xpath.push(PathSegment::Identifier(name.clone()));
                    i += 1;
                    match step {
                        PathStep::Complex(complex) => {
                            ctype = complex.clone();
                            ctype_cast = complex;
                        }
                        step => {
                            terminal = Some(step);
                            break;
                        }
                    }
                }
                PathSegment::Qualified(qname) => {
                    let model = model
                        .ok_or_else(|| ODataError::path("type cast requires a model context"))?;
                    let cast = model.qualified_type(qname)?;
                    if !cast.is_derived_from(&ctype_cast) {
                        return Err(ODataError::path(format!(
                            "incompatible type cast: {qname}"
                        )));
                    }
                    ctype_cast = cast;
                    i += 1;
                }
                seg => {
                    return Err(ODataError::path(format!(
                        "unexpected segment in property path: {seg}"
                    )));
                }
            }
        }
        if xpath.is_empty() {
            // the remaining segments were all type casts
            let qname = ctype_cast
                .qname()
                .cloned()
                .ok_or_else(|| ODataError::path("cannot cast to an unnamed type"))?;
            match result.last_mut() {
                Some(last) => {
                    last.push(PathSegment::Qualified(qname));
                    break;
                }
                None => return Err(ODataError::path("expected a property path")),
            }
        }
        match terminal {
            Some(PathStep::Navigation(target)) => {
                result.push(xpath);
                next_type = target;
            }
            Some(PathStep::Structural) | Some(PathStep::Complex(_)) | None => {
                if navigation {
                    return Err(ODataError::path(
                        "expected a navigation property path",
                    ));
                }
                if terminal.is_none() && !Arc::ptr_eq(&ctype_cast, &ctype) {
                    // ended with a cast of a complex property
                    let qname = ctype_cast.qname().cloned().ok_or_else(|| {
                        ODataError::path("cannot cast to an unnamed type")
                    })?;
                    xpath.push(PathSegment::Qualified(qname));
                }
                result.push(xpath);
                done = true;
            }
        }
    }
    Ok(result)
}
