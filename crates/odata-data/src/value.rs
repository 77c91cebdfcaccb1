//! The value hierarchy
//!
//! [`Value`] is a shared handle (`Rc<RefCell<..>>`) to one node of a
//! value tree.  The node's body is a closed union over the seven value
//! shapes: primitive, enumeration, collection, complex, entity, entity
//! set and singleton.  Structured and collection-like values cache
//! their children lazily; bound values fault missing cache entries in
//! through the owning [`DataService`](crate::DataService).
//!
//! Every value carries the common lifecycle state: an optional service
//! binding, an optional parent link (the property slot that owns it),
//! the frozen and dirty flags and a set of applied annotation values.

use crate::DataService;
use indexmap::IndexMap;
use odata_ast::{EnumLiteral, Expression, Literal};
use odata_diagnostics::{ODataError, Result};
use odata_names::{Path, PathQualifier, PathSegment, QualifiedName, TermRef};
use odata_query::SharedExpandOptions;
use odata_types::{
    Annotation, EntityKey, EntitySetDecl, PrimitiveKind, SingletonDecl, Term, TypeKind, TypeRef,
};
use once_cell::sync::OnceCell;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// A shared handle to one value
#[derive(Clone)]
pub struct Value {
    cell: Rc<RefCell<ValueCell>>,
}

/// A weak handle, used for parent links to avoid reference cycles
#[derive(Clone)]
pub struct WeakValue {
    cell: Weak<RefCell<ValueCell>>,
}

impl WeakValue {
    pub fn upgrade(&self) -> Option<Value> {
        self.cell.upgrade().map(|cell| Value { cell })
    }
}

/// The container-root declaration an entity value (or container value)
/// is associated with
#[derive(Debug, Clone)]
pub enum EntityBinding {
    EntitySet(Arc<EntitySetDecl>),
    Singleton(Arc<SingletonDecl>),
}

impl EntityBinding {
    pub fn name(&self) -> &str {
        match self {
            Self::EntitySet(decl) => &decl.name,
            Self::Singleton(decl) => &decl.name,
        }
    }

    /// The declared entity type of the bound container root
    pub fn entity_type(&self) -> &TypeRef {
        match self {
            Self::EntitySet(decl) => &decl.entity_type,
            Self::Singleton(decl) => &decl.entity_type,
        }
    }
}

pub(crate) struct ValueCell {
    pub(crate) type_def: TypeRef,
    pub(crate) service: Option<Rc<dyn DataService>>,
    pub(crate) frozen: bool,
    pub(crate) dirty: bool,
    pub(crate) parent: Option<ParentLink>,
    pub(crate) annotations: HashMap<TermRef, Value>,
    pub(crate) body: ValueBody,
}

/// The property slot that owns a value
pub(crate) struct ParentLink {
    pub(crate) value: WeakValue,
    pub(crate) name: String,
    /// Qualified name of the declaring type when the slot is only
    /// reachable through a type cast on the parent
    pub(crate) type_cast: Option<QualifiedName>,
}

pub(crate) enum ValueBody {
    Primitive(Option<Literal>),
    Enumeration(Option<EnumLiteral>),
    Collection(CollectionBody),
    Complex(StructuredBody),
    Entity(EntityBody),
    EntitySet(EntitySetBody),
    Singleton(SingletonBody),
}

/// Query-option state shared by the composite value shapes
pub(crate) struct CompositeState {
    pub(crate) options: Option<SharedExpandOptions>,
    /// True while the options are shared with (inherited from) the
    /// owning container; mutators fork before the first change
    pub(crate) inherited: bool,
}

impl CompositeState {
    pub(crate) fn new() -> Self {
        Self {
            options: None,
            inherited: true,
        }
    }
}

pub(crate) struct CollectionBody {
    pub(crate) composite: CompositeState,
    /// The current item type; a cast may narrow it below the declared
    /// item type
    pub(crate) item_type: TypeRef,
    pub(crate) fully_cached: bool,
    pub(crate) items: Vec<Value>,
    pub(crate) next_link: Option<String>,
}

pub(crate) struct StructuredBody {
    pub(crate) composite: CompositeState,
    /// The declared type; casts move `type_def` down the chain but
    /// never below this
    pub(crate) base_def: TypeRef,
    pub(crate) null: bool,
    pub(crate) cache: Option<IndexMap<String, Value>>,
    pub(crate) loading: bool,
}

pub(crate) struct EntityBody {
    pub(crate) structured: StructuredBody,
    pub(crate) binding: Option<EntityBinding>,
}

pub(crate) struct EntitySetBody {
    pub(crate) composite: CompositeState,
    pub(crate) item_type: TypeRef,
    pub(crate) binding: Option<EntityBinding>,
    pub(crate) qualifier: Option<PathQualifier>,
    pub(crate) fully_cached: bool,
    pub(crate) cache: IndexMap<EntityKey, Value>,
    /// Bumped on every structural change; active iterators compare
    /// against their captured value and fail when it moves
    pub(crate) key_lock: u64,
    pub(crate) next_link: Option<String>,
}

pub(crate) struct SingletonBody {
    pub(crate) composite: CompositeState,
    pub(crate) item_type: TypeRef,
    pub(crate) binding: Option<EntityBinding>,
    pub(crate) qualifier: Option<PathQualifier>,
    pub(crate) cached: bool,
    pub(crate) cache: Option<Value>,
}

impl StructuredBody {
    fn new(type_def: &TypeRef) -> Self {
        Self {
            composite: CompositeState::new(),
            base_def: type_def.clone(),
            null: true,
            cache: None,
            loading: false,
        }
    }
}

impl ValueCell {
    pub(crate) fn structured(&self) -> Option<&StructuredBody> {
        match &self.body {
            ValueBody::Complex(b) => Some(b),
            ValueBody::Entity(b) => Some(&b.structured),
            _ => None,
        }
    }

    pub(crate) fn structured_mut(&mut self) -> Option<&mut StructuredBody> {
        match &mut self.body {
            ValueBody::Complex(b) => Some(b),
            ValueBody::Entity(b) => Some(&mut b.structured),
            _ => None,
        }
    }

    pub(crate) fn composite(&self) -> Option<&CompositeState> {
        match &self.body {
            ValueBody::Collection(b) => Some(&b.composite),
            ValueBody::Complex(b) => Some(&b.composite),
            ValueBody::Entity(b) => Some(&b.structured.composite),
            ValueBody::EntitySet(b) => Some(&b.composite),
            ValueBody::Singleton(b) => Some(&b.composite),
            _ => None,
        }
    }

    pub(crate) fn composite_mut(&mut self) -> Option<&mut CompositeState> {
        match &mut self.body {
            ValueBody::Collection(b) => Some(&mut b.composite),
            ValueBody::Complex(b) => Some(&mut b.composite),
            ValueBody::Entity(b) => Some(&mut b.structured.composite),
            ValueBody::EntitySet(b) => Some(&mut b.composite),
            ValueBody::Singleton(b) => Some(&mut b.composite),
            _ => None,
        }
    }
}

/// A native representation of a value, used to fill values from
/// deserialized payloads and literals
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSeed {
    Null,
    Literal(Literal),
    List(Vec<ValueSeed>),
    Map(IndexMap<String, ValueSeed>),
}

impl From<Literal> for ValueSeed {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}

impl From<&str> for ValueSeed {
    fn from(s: &str) -> Self {
        Self::Literal(Literal::String(s.to_string()))
    }
}

impl From<i64> for ValueSeed {
    fn from(i: i64) -> Self {
        Self::Literal(Literal::Int64(i))
    }
}

impl From<bool> for ValueSeed {
    fn from(b: bool) -> Self {
        Self::Literal(Literal::Boolean(b))
    }
}

impl Value {
    /// Create a transient null (or empty) value of the given type
    pub fn new(type_def: &TypeRef) -> Self {
        let body = match type_def.kind() {
            TypeKind::Primitive(_) => ValueBody::Primitive(None),
            TypeKind::Enumeration(_) => ValueBody::Enumeration(None),
            TypeKind::Complex(_) => ValueBody::Complex(StructuredBody::new(type_def)),
            TypeKind::Entity(_) => ValueBody::Entity(EntityBody {
                structured: StructuredBody::new(type_def),
                binding: None,
            }),
            TypeKind::Collection { item_type } => ValueBody::Collection(CollectionBody {
                composite: CompositeState::new(),
                item_type: item_type.clone(),
                fully_cached: true,
                items: Vec::new(),
                next_link: None,
            }),
            TypeKind::EntitySet { item_type } => ValueBody::EntitySet(EntitySetBody {
                composite: CompositeState::new(),
                item_type: item_type.clone(),
                binding: None,
                qualifier: None,
                fully_cached: true,
                cache: IndexMap::new(),
                key_lock: 1,
                next_link: None,
            }),
            TypeKind::Singleton { item_type } => ValueBody::Singleton(SingletonBody {
                composite: CompositeState::new(),
                item_type: item_type.clone(),
                binding: None,
                qualifier: None,
                cached: true,
                cache: None,
            }),
        };
        Self {
            cell: Rc::new(RefCell::new(ValueCell {
                type_def: type_def.clone(),
                service: None,
                frozen: false,
                dirty: false,
                parent: None,
                annotations: HashMap::new(),
                body,
            })),
        }
    }

    pub(crate) fn cell(&self) -> Ref<'_, ValueCell> {
        self.cell.borrow()
    }

    pub(crate) fn cell_mut(&self) -> RefMut<'_, ValueCell> {
        self.cell.borrow_mut()
    }

    pub fn downgrade(&self) -> WeakValue {
        WeakValue {
            cell: Rc::downgrade(&self.cell),
        }
    }

    /// True if two handles refer to the same value
    pub fn same(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Value {

    /// The value's current type; for structured values a cast may have
    /// narrowed it below the declared type
    pub fn type_def(&self) -> TypeRef {
        self.cell().type_def.clone()
    }

    pub fn service(&self) -> Option<Rc<dyn DataService>> {
        self.cell().service.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.cell().service.is_some()
    }

    pub fn frozen(&self) -> bool {
        self.cell().frozen
    }

    /// Freeze the value against modification; freezing is one-way
    pub fn freeze(&self) {
        self.cell_mut().frozen = true;
    }

    pub fn dirty(&self) -> bool {
        self.cell().dirty
    }

    /// Mark the value dirty; complex values propagate to their parent
    pub fn touch(&self) {
        let parent = {
            let mut cell = self.cell_mut();
            cell.dirty = true;
            match &cell.body {
                ValueBody::Complex(_) => cell.parent.as_ref().and_then(|p| p.value.upgrade()),
                _ => None,
            }
        };
        if let Some(parent) = parent {
            parent.touch();
        }
    }

    pub fn clean(&self) {
        self.cell_mut().dirty = false;
    }

    /// Mark the value and, for structured values, all cached children
    /// clean
    pub fn rclean(&self) {
        let children: Vec<Value> = {
            let cell = self.cell();
            cell.structured()
                .and_then(|b| b.cache.as_ref())
                .map(|cache| cache.values().cloned().collect())
                .unwrap_or_default()
        };
        for child in children {
            if child.is_structured() {
                child.rclean();
            } else {
                child.clean();
            }
        }
        self.clean();
    }

    /// Marks the start of a user mutation: the dirty bit is set before
    /// the frozen check so a failed mutation still reads as dirty
    pub(crate) fn begin_mutation(&self) -> Result<()> {
        let mut cell = self.cell_mut();
        cell.dirty = true;
        if cell.frozen {
            return Err(ODataError::FrozenValue);
        }
        Ok(())
    }

    pub fn is_structured(&self) -> bool {
        matches!(self.cell().body, ValueBody::Complex(_) | ValueBody::Entity(_))
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.cell().body, ValueBody::Entity(_))
    }

    /// True for the unordered-collection and entity-set shapes
    pub fn is_collection(&self) -> bool {
        matches!(
            self.cell().body,
            ValueBody::Collection(_) | ValueBody::EntitySet(_)
        )
    }

    /// The name of the property slot owning this value, if any
    pub fn name(&self) -> Option<String> {
        self.cell().parent.as_ref().map(|p| p.name.clone())
    }

    pub fn parent(&self) -> Option<Value> {
        self.cell().parent.as_ref().and_then(|p| p.value.upgrade())
    }

    /// Bind a transient value (and its cached children) to a service
    pub fn bind_to_service(&self, service: &Rc<dyn DataService>) -> Result<()> {
        if self.cell().service.is_some() {
            return Err(ODataError::bound(self.to_string()));
        }
        let mut children: Vec<Value> = Vec::new();
        {
            let mut cell = self.cell_mut();
            match &mut cell.body {
                ValueBody::EntitySet(b) => {
                    if !b.cache.is_empty() {
                        return Err(ODataError::model(
                            "cannot bind a non-empty entity set to a service",
                        ));
                    }
                    b.fully_cached = false;
                }
                ValueBody::Singleton(b) => {
                    if b.cache.is_some() {
                        return Err(ODataError::model(
                            "cannot bind a non-empty singleton to a service",
                        ));
                    }
                    b.cached = false;
                }
                ValueBody::Complex(b) => {
                    if let Some(cache) = &b.cache {
                        children.extend(cache.values().cloned());
                    }
                }
                ValueBody::Entity(b) => {
                    if let Some(cache) = &b.structured.cache {
                        children.extend(cache.values().cloned());
                    }
                }
                ValueBody::Primitive(_) | ValueBody::Enumeration(_) | ValueBody::Collection(_) => {}
            }
            cell.service = Some(Rc::clone(service));
        }
        for child in children {
            if !child.is_bound() {
                child.bind_to_service(service)?;
            }
        }
        Ok(())
    }

    /// Attach this value to the property slot `name` of `parent`
    ///
    /// A value can only ever have one parent.  The slot records the
    /// type cast needed to reach the property when it is not declared
    /// on the parent's base type, and the value inherits the parent's
    /// service binding.
    pub(crate) fn set_parent(&self, parent: &Value, name: &str) -> Result<()> {
        if self.cell().parent.is_some() {
            return Err(ODataError::bound(format!("{self} is already owned")));
        }
        let (type_cast, service) = {
            let pcell = parent.cell();
            let cast = match pcell.structured() {
                Some(b)
                    if b.base_def.property(name).is_none()
                        && pcell.type_def.property(name).is_some() =>
                {
                    pcell.type_def.declared_in(name).cloned()
                }
                _ => None,
            };
            (cast, pcell.service.clone())
        };
        self.cell_mut().parent = Some(ParentLink {
            value: parent.downgrade(),
            name: name.to_string(),
            type_cast,
        });
        if let Some(service) = service {
            if !self.is_bound() {
                self.bind_to_service(&service)?;
            }
        }
        Ok(())
    }

    /// The entity this value belongs to, if any
    ///
    /// Walks the parent chain, prepending each slot name (and the type
    /// cast needed to reach it) to `prefix`; on return `prefix` is the
    /// path from the entity down to this value.  Contained entities
    /// keep walking to their containing entity; a parentless non-entity
    /// value has no entity context.
    pub fn containing_entity(&self, prefix: &mut Path) -> Result<Option<Value>> {
        let step = {
            let cell = self.cell();
            match &cell.parent {
                None => {
                    return Ok(if matches!(cell.body, ValueBody::Entity(_)) {
                        Some(self.clone())
                    } else {
                        None
                    });
                }
                Some(link) => {
                    let parent = link.value.upgrade().ok_or_else(|| {
                        ODataError::model("parent value has been dropped")
                    })?;
                    prefix.insert(0, PathSegment::Identifier(link.name.clone()));
                    if let Some(cast) = &link.type_cast {
                        prefix.insert(0, PathSegment::Qualified(cast.clone()));
                    }
                    parent
                }
            }
        };
        step.containing_entity(prefix)
    }

    pub fn is_null(&self) -> bool {
        match &self.cell().body {
            ValueBody::Primitive(v) => v.is_none(),
            ValueBody::Enumeration(v) => v.is_none(),
            ValueBody::Complex(b) => b.null,
            ValueBody::Entity(b) => b.structured.null,
            ValueBody::Collection(_) | ValueBody::EntitySet(_) | ValueBody::Singleton(_) => false,
        }
    }

    /// The literal held by a primitive or enumeration value; `None`
    /// when null or not a primitive shape
    pub fn get_value(&self) -> Option<Literal> {
        match &self.cell().body {
            ValueBody::Primitive(v) => v.clone(),
            ValueBody::Enumeration(v) => v.clone().map(Literal::Enum),
            _ => None,
        }
    }

    /// Set the value from a native representation
    ///
    /// Primitives and enumerations take a literal, collections a list
    /// and structured values an object or null.  Entity sets and
    /// singletons cannot be set wholesale.
    pub fn set_value(&self, seed: ValueSeed) -> Result<()> {
        self.begin_mutation()?;
        enum Shape {
            Primitive,
            Enumeration,
            Collection,
            Structured,
        }
        let shape = match &self.cell().body {
            ValueBody::Primitive(_) => Shape::Primitive,
            ValueBody::Enumeration(_) => Shape::Enumeration,
            ValueBody::Collection(_) => Shape::Collection,
            ValueBody::Complex(_) | ValueBody::Entity(_) => Shape::Structured,
            ValueBody::EntitySet(_) | ValueBody::Singleton(_) => {
                return Err(ODataError::model(format!("cannot set {self} wholesale")));
            }
        };
        match shape {
            Shape::Primitive => self.set_primitive(seed),
            Shape::Enumeration => self.set_enumeration(seed),
            Shape::Collection => match seed {
                ValueSeed::List(items) => self.set_collection_items(items),
                ValueSeed::Null => Err(ODataError::model("collection values cannot be null")),
                _ => Err(ODataError::model("expected a list value")),
            },
            Shape::Structured => match seed {
                ValueSeed::Map(map) => self.set_structured_value(map),
                ValueSeed::Null => {
                    {
                        let mut cell = self.cell_mut();
                        if let Some(b) = cell.structured_mut() {
                            b.null = true;
                            b.cache = None;
                        }
                    }
                    self.touch();
                    Ok(())
                }
                _ => Err(ODataError::model("expected an object or null value")),
            },
        }
    }

    fn set_primitive(&self, seed: ValueSeed) -> Result<()> {
        let lit = match seed {
            ValueSeed::Null | ValueSeed::Literal(Literal::Null) => {
                if let ValueBody::Primitive(v) = &mut self.cell_mut().body {
                    *v = None;
                }
                self.touch();
                return Ok(());
            }
            ValueSeed::Literal(lit) => lit,
            _ => return Err(ODataError::model(format!("expected a literal for {self}"))),
        };
        let kind = self
            .type_def()
            .primitive_kind()
            .ok_or_else(|| ODataError::model(format!("{self} is not primitive")))?;
        if kind == PrimitiveKind::PrimitiveType {
            return Err(ODataError::model(
                "the abstract primitive type is always null",
            ));
        }
        if !literal_matches(kind, &lit) {
            return Err(ODataError::model(format!(
                "literal {lit} does not fit Edm.{}",
                kind.name()
            )));
        }
        if let ValueBody::Primitive(v) = &mut self.cell_mut().body {
            *v = Some(lit);
        }
        self.touch();
        Ok(())
    }

    fn set_enumeration(&self, seed: ValueSeed) -> Result<()> {
        let value = match seed {
            ValueSeed::Null | ValueSeed::Literal(Literal::Null) => None,
            ValueSeed::Literal(Literal::Enum(e)) => Some(e),
            ValueSeed::Literal(Literal::String(member)) => {
                let qname = self
                    .type_def()
                    .qname()
                    .cloned()
                    .ok_or_else(|| ODataError::model("anonymous enumeration type"))?;
                Some(EnumLiteral {
                    qname,
                    members: std::iter::once(member).collect(),
                })
            }
            _ => return Err(ODataError::model(format!("expected an enum literal for {self}"))),
        };
        if let Some(e) = &value {
            let type_def = self.type_def();
            let enum_type = type_def
                .enum_type()
                .ok_or_else(|| ODataError::model(format!("{self} is not an enumeration")))?;
            if let Some(qname) = type_def.qname() {
                if qname != &e.qname {
                    return Err(ODataError::model(format!(
                        "enum literal {e} does not fit {qname}"
                    )));
                }
            }
            for member in &e.members {
                if !enum_type.members.contains_key(member) {
                    return Err(ODataError::model(format!("no such member: {member}")));
                }
            }
            if e.members.len() > 1 && !enum_type.is_flags {
                return Err(ODataError::model(
                    "multiple members require a flags enumeration",
                ));
            }
        }
        if let ValueBody::Enumeration(v) = &mut self.cell_mut().body {
            *v = value;
        }
        self.touch();
        Ok(())
    }

    /// Copy another value into this one
    ///
    /// Null propagates as null.  Otherwise the source type must be the
    /// target type or derived from it; structured values copy property
    /// by property and collections item by item.
    pub fn assign(&self, other: &Value) -> Result<()> {
        if other.is_null() {
            return self.set_value(ValueSeed::Null);
        }
        let kind = {
            let cell = self.cell();
            match &cell.body {
                ValueBody::Primitive(_) | ValueBody::Enumeration(_) => 0u8,
                ValueBody::Collection(_) => 1,
                ValueBody::Complex(_) | ValueBody::Entity(_) => 2,
                _ => 3,
            }
        };
        match kind {
            0 => {
                if !other.type_def().is_derived_from(&self.type_def()) {
                    return Err(ODataError::model(format!("cannot assign {other} to {self}")));
                }
                match other.get_value() {
                    Some(lit) => self.set_value(ValueSeed::Literal(lit)),
                    None => self.set_value(ValueSeed::Null),
                }
            }
            1 => self.assign_collection(other),
            2 => self.assign_structured(other),
            _ => Err(ODataError::model(format!("cannot assign into {self}"))),
        }
    }

    /// Cast this value to another type
    ///
    /// Returns a new transient value of the target type.  The result is
    /// null when the target is abstract, when this value's type is not
    /// derived from the target or when the copy fails; casting never
    /// errors.
    pub fn cast(&self, target: &TypeRef) -> Value {
        let result = Value::new(target);
        if !target.is_abstract() && self.type_def().is_derived_from(target) {
            let _ = result.assign(self);
        }
        result
    }

    /// Drop cached state so the next access faults fresh data in
    ///
    /// Transient structured values rebuild their property cache
    /// immediately; bound values defer to the next access.
    pub fn clear_cache(&self) -> Result<()> {
        let bound = self.is_bound();
        let mut rebuild = false;
        {
            let mut cell = self.cell_mut();
            match &mut cell.body {
                ValueBody::Primitive(_) | ValueBody::Enumeration(_) => {}
                ValueBody::Collection(b) => {
                    if bound {
                        b.fully_cached = false;
                        b.items.clear();
                        b.next_link = None;
                    }
                }
                ValueBody::Complex(b) => {
                    if bound {
                        b.cache = None;
                    } else {
                        rebuild = b.cache.is_some();
                    }
                }
                ValueBody::Entity(b) => {
                    if bound {
                        b.structured.cache = None;
                    } else {
                        rebuild = b.structured.cache.is_some();
                    }
                }
                ValueBody::EntitySet(b) => {
                    if bound {
                        b.fully_cached = false;
                        b.cache.clear();
                        b.key_lock += 1;
                        b.next_link = None;
                    }
                }
                ValueBody::Singleton(b) => {
                    if bound {
                        b.cache = None;
                        b.cached = false;
                    }
                }
            }
        }
        if rebuild {
            self.rebuild_property_cache(false)?;
        }
        Ok(())
    }

    /// Re-fetch this value from the service
    pub fn reload(&self) -> Result<()> {
        let service = self.service().ok_or(ODataError::UnboundValue)?;
        enum Shape {
            Collection,
            Entity,
            Complex,
            Container,
        }
        let shape = match &self.cell().body {
            ValueBody::Collection(_) => Shape::Collection,
            ValueBody::Entity(_) => Shape::Entity,
            ValueBody::Complex(_) => Shape::Complex,
            ValueBody::EntitySet(_) | ValueBody::Singleton(_) => Shape::Container,
            _ => return Err(ODataError::model(format!("cannot reload {self}"))),
        };
        match shape {
            Shape::Collection => {
                self.clear_cache()?;
                self.load_collection()
            }
            Shape::Entity => crate::service::run(service.get_entity(self)),
            Shape::Complex => {
                if self.parent().is_none() {
                    return Err(ODataError::model(
                        "an orphan complex value cannot be reloaded",
                    ));
                }
                crate::service::run(service.get_property(self))
            }
            // container values reload lazily on the next access
            Shape::Container => self.clear_cache(),
        }
    }

    /// Cast this value's type in place
    ///
    /// Containers narrow their item type; structured values narrow
    /// their own type and rebuild the property cache.  The target must
    /// be derived from the declared type; bound structured values can
    /// only be cast while a load is in progress.
    pub fn type_cast(&self, new_type: &TypeRef) -> Result<()> {
        self.type_cast_inner(new_type, false)
    }

    pub(crate) fn type_cast_for_load(&self, new_type: &TypeRef) -> Result<()> {
        self.type_cast_inner(new_type, true)
    }

    fn type_cast_inner(&self, new_type: &TypeRef, for_load: bool) -> Result<()> {
        if self.frozen() {
            return Err(ODataError::FrozenValue);
        }
        enum Target {
            Container,
            Structured,
        }
        let target = {
            let cell = self.cell();
            match &cell.body {
                ValueBody::Collection(b) => {
                    if Arc::ptr_eq(&b.item_type, new_type) {
                        return Ok(());
                    }
                    check_item_cast(&cell.type_def, new_type)?;
                    Target::Container
                }
                ValueBody::EntitySet(b) => {
                    if Arc::ptr_eq(&b.item_type, new_type) {
                        return Ok(());
                    }
                    check_item_cast(&cell.type_def, new_type)?;
                    Target::Container
                }
                ValueBody::Singleton(b) => {
                    if Arc::ptr_eq(&b.item_type, new_type) {
                        return Ok(());
                    }
                    check_item_cast(&cell.type_def, new_type)?;
                    Target::Container
                }
                ValueBody::Complex(b) => {
                    check_structured_cast(self, &cell, b, new_type, for_load)?;
                    if Arc::ptr_eq(&cell.type_def, new_type) {
                        return Ok(());
                    }
                    Target::Structured
                }
                ValueBody::Entity(body) => {
                    let b = &body.structured;
                    check_structured_cast(self, &cell, b, new_type, for_load)?;
                    if Arc::ptr_eq(&cell.type_def, new_type) {
                        return Ok(());
                    }
                    Target::Structured
                }
                ValueBody::Primitive(_) | ValueBody::Enumeration(_) => {
                    return Err(ODataError::model(format!("cannot cast {self} in place")));
                }
            }
        };
        match target {
            Target::Container => {
                {
                    let mut cell = self.cell_mut();
                    match &mut cell.body {
                        ValueBody::Collection(b) => b.item_type = new_type.clone(),
                        ValueBody::EntitySet(b) => b.item_type = new_type.clone(),
                        ValueBody::Singleton(b) => b.item_type = new_type.clone(),
                        _ => {}
                    }
                }
                self.clear_cache()
            }
            Target::Structured => {
                self.cell_mut().type_def = new_type.clone();
                self.rebuild_property_cache(false)
            }
        }
    }

    pub(crate) fn set_qualifier(&self, qualifier: PathQualifier) {
        let mut cell = self.cell_mut();
        match &mut cell.body {
            ValueBody::EntitySet(b) => b.qualifier = Some(qualifier),
            ValueBody::Singleton(b) => b.qualifier = Some(qualifier),
            _ => {}
        }
    }

    /// The `$ref`/`$count` qualifier of the expand rule this value was
    /// created under, if any
    pub fn qualifier(&self) -> Option<PathQualifier> {
        match &self.cell().body {
            ValueBody::EntitySet(b) => b.qualifier,
            ValueBody::Singleton(b) => b.qualifier,
            _ => None,
        }
    }

    /// Number of items (or cached properties) in this value
    pub fn len(&self) -> Result<usize> {
        enum Shape {
            Collection,
            EntitySet,
            Structured,
        }
        let shape = match &self.cell().body {
            ValueBody::Collection(_) => Shape::Collection,
            ValueBody::EntitySet(_) => Shape::EntitySet,
            ValueBody::Complex(_) | ValueBody::Entity(_) => Shape::Structured,
            _ => return Err(ODataError::model(format!("{self} has no length"))),
        };
        match shape {
            Shape::Collection => self.collection_len(),
            Shape::EntitySet => self.entity_set_len(),
            Shape::Structured => Ok(self.property_names()?.len()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn check_structured_cast(
    value: &Value,
    cell: &ValueCell,
    body: &StructuredBody,
    new_type: &TypeRef,
    for_load: bool,
) -> Result<()> {
    if Arc::ptr_eq(&cell.type_def, new_type) {
        return Ok(());
    }
    if cell.service.is_some() && !for_load && !body.loading {
        return Err(ODataError::bound(format!(
            "{value} cannot be cast once bound"
        )));
    }
    if !new_type.is_derived_from(&body.base_def) {
        return Err(ODataError::model(format!(
            "{new_type} is not derived from {}",
            body.base_def
        )));
    }
    Ok(())
}

fn check_item_cast(type_def: &TypeRef, new_type: &TypeRef) -> Result<()> {
    let base = type_def
        .item_type()
        .ok_or_else(|| ODataError::model("container value without an item type"))?;
    if !new_type.is_derived_from(base) {
        return Err(ODataError::model(format!(
            "{new_type} is not derived from {base}"
        )));
    }
    Ok(())
}

fn literal_matches(kind: PrimitiveKind, lit: &Literal) -> bool {
    match lit {
        Literal::Boolean(_) => kind == PrimitiveKind::Boolean,
        Literal::Int64(_) => {
            kind.is_integral()
                || matches!(
                    kind,
                    PrimitiveKind::Decimal | PrimitiveKind::Double | PrimitiveKind::Single
                )
        }
        Literal::Decimal(_) => kind == PrimitiveKind::Decimal,
        Literal::Double(_) => matches!(kind, PrimitiveKind::Double | PrimitiveKind::Single),
        Literal::String(_) => kind == PrimitiveKind::String,
        Literal::Guid(_) => kind == PrimitiveKind::Guid,
        Literal::Date(_) => kind == PrimitiveKind::Date,
        Literal::DateTimeOffset(_) => kind == PrimitiveKind::DateTimeOffset,
        Literal::TimeOfDay(_) => kind == PrimitiveKind::TimeOfDay,
        Literal::Duration(_) => kind == PrimitiveKind::Duration,
        Literal::Binary(_) => matches!(kind, PrimitiveKind::Binary | PrimitiveKind::Stream),
        Literal::Null | Literal::Enum(_) => false,
    }
}

/// Evaluates dynamic annotation expressions against a context value
pub type AnnotationEvaluator = fn(&Annotation, &Value) -> Result<Value>;

static ANNOTATION_EVALUATOR: OnceCell<AnnotationEvaluator> = OnceCell::new();

/// Install the evaluator used for dynamic annotation expressions
///
/// Constant expressions and term defaults evaluate without one; the
/// first installation wins.
pub fn install_annotation_evaluator(evaluator: AnnotationEvaluator) {
    let _ = ANNOTATION_EVALUATOR.set(evaluator);
}

fn evaluate_annotation(annotation: &Annotation, context: &Value) -> Result<Value> {
    let value = Value::new(&annotation.term.type_ref);
    match annotation.expression.as_deref() {
        None => {
            if let Some(default) = &annotation.term.default_value {
                value.set_value(ValueSeed::Literal(default.clone()))?;
            }
            Ok(value)
        }
        Some(Expression::Literal(lit)) => {
            if !lit.is_null() {
                value.set_value(ValueSeed::Literal(lit.clone()))?;
            }
            Ok(value)
        }
        Some(_) => match ANNOTATION_EVALUATOR.get() {
            Some(evaluate) => evaluate(annotation, context),
            None => Err(ODataError::expression(
                "dynamic annotations require an expression evaluator",
            )),
        },
    }
}

impl Value {
    /// The value of an applied annotation, if the term applies
    ///
    /// A local updatable annotation takes precedence; otherwise the
    /// annotations declared on the value's type (walking the base
    /// chain) and, for entity sets, on the set declaration are
    /// evaluated.  Declared annotation values are computed fresh on
    /// each call and returned frozen.
    pub fn get_annotation(&self, term_ref: &TermRef) -> Result<Option<Value>> {
        if let Some(v) = self.cell().annotations.get(term_ref) {
            return Ok(Some(v.clone()));
        }
        let annotation = match self.find_declared_annotation(term_ref) {
            Some(a) => a,
            None => return Ok(None),
        };
        let computed = evaluate_annotation(&annotation, self)?;
        let result = Value::new(&annotation.term.type_ref);
        result.assign(&computed)?;
        result.freeze();
        Ok(Some(result))
    }

    fn find_declared_annotation(&self, term_ref: &TermRef) -> Option<Annotation> {
        let type_def = self.type_def();
        let mut current = Some(&type_def);
        while let Some(t) = current {
            if let Some(a) = t.annotations().lookup(term_ref) {
                return Some(a.clone());
            }
            current = t.base();
        }
        if let ValueBody::EntitySet(b) = &self.cell().body {
            if let Some(EntityBinding::EntitySet(decl)) = &b.binding {
                if let Some(a) = decl.annotations.lookup(term_ref) {
                    return Some(a.clone());
                }
            }
        }
        None
    }

    /// A mutable annotation value applied directly to this value
    ///
    /// Returns the existing local value or creates one of the term's
    /// type; with `default` set the new value starts from the declared
    /// annotation's computed value instead of null.
    pub fn get_updatable_annotation(
        &self,
        term: &Arc<Term>,
        qualifier: Option<&str>,
        default: bool,
    ) -> Result<Value> {
        let term_ref = TermRef {
            name: term.qname.clone(),
            qualifier: qualifier.map(str::to_string),
        };
        if let Some(v) = self.cell().annotations.get(&term_ref) {
            return Ok(v.clone());
        }
        let value = Value::new(&term.type_ref);
        if default {
            if let Some(computed) = self.get_annotation(&term_ref)? {
                value.assign(&computed)?;
            }
        }
        self.cell_mut()
            .annotations
            .insert(term_ref, value.clone());
        Ok(value)
    }

    /// Remove a local annotation value, re-exposing the declared one
    pub fn remove_updatable_annotation(&self, term_ref: &TermRef) {
        self.cell_mut().annotations.remove(term_ref);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.borrow();
        let shape = match &cell.body {
            ValueBody::Primitive(_) => "primitive value",
            ValueBody::Enumeration(_) => "enumeration value",
            ValueBody::Collection(_) => "collection value",
            ValueBody::Complex(_) => "complex value",
            ValueBody::Entity(_) => "entity value",
            ValueBody::EntitySet(_) => "entity set value",
            ValueBody::Singleton(_) => "singleton value",
        };
        write!(f, "{shape} of type {}", cell.type_def)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_names::path_to_str;
    use odata_types::{TypeDef, edm};
    use pretty_assertions::assert_eq;

    fn qn(s: &str) -> QualifiedName {
        s.parse().unwrap()
    }

    fn person_type() -> TypeRef {
        let address = TypeDef::complex(qn("Schema.Address"))
            .property("City", &edm().string)
            .build()
            .unwrap();
        TypeDef::entity(qn("Schema.Person"))
            .key_property("UserName", &edm().string)
            .property("Name", &edm().string)
            .property("Address", &address)
            .build()
            .unwrap()
    }

    #[test]
    fn primitive_set_get_and_null() {
        let v = Value::new(&edm().string);
        assert!(v.is_null());
        v.set_value(ValueSeed::from("hello")).unwrap();
        assert_eq!(v.get_value(), Some(Literal::String("hello".to_string())));
        v.set_value(ValueSeed::Null).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn primitive_rejects_mismatched_literals() {
        let v = Value::new(&edm().int32);
        assert!(v.set_value(ValueSeed::from("text")).is_err());
        v.set_value(ValueSeed::from(42i64)).unwrap();
        assert_eq!(v.get_value(), Some(Literal::Int64(42)));
    }

    #[test]
    fn frozen_mutation_fails_but_marks_dirty() {
        let v = Value::new(&edm().int64);
        v.freeze();
        let err = v.set_value(ValueSeed::from(1i64)).unwrap_err();
        assert_eq!(err, ODataError::FrozenValue);
        assert!(v.dirty());
    }

    #[test]
    fn enumeration_members_are_checked() {
        let color = TypeDef::enumeration(
            qn("Schema.Color"),
            false,
            &[("Red", 1), ("Green", 2)],
        )
        .unwrap();
        let v = Value::new(&color);
        v.set_value(ValueSeed::from("Red")).unwrap();
        assert_eq!(v.get_value().unwrap().to_string(), "Schema.Color'Red'");
        assert!(v.set_value(ValueSeed::from("Blue")).is_err());
    }

    #[test]
    fn cast_to_unrelated_type_is_null() {
        let v = Value::new(&edm().int64);
        v.set_value(ValueSeed::from(7i64)).unwrap();
        let s = v.cast(&edm().string);
        assert!(s.is_null());
        let i = v.cast(&edm().int64);
        assert_eq!(i.get_value(), Some(Literal::Int64(7)));
    }

    #[test]
    fn cast_to_abstract_type_is_null() {
        let v = Value::new(&edm().int64);
        v.set_value(ValueSeed::from(7i64)).unwrap();
        assert!(v.cast(&edm().primitive_type).is_null());
    }

    #[test]
    fn assign_requires_a_derived_source() {
        let target = Value::new(&edm().string);
        let source = Value::new(&edm().int64);
        source.set_value(ValueSeed::from(1i64)).unwrap();
        assert!(target.assign(&source).is_err());
        // null propagates regardless of type
        let null_source = Value::new(&edm().int64);
        target.set_value(ValueSeed::from("x")).unwrap();
        target.assign(&null_source).unwrap();
        assert!(target.is_null());
    }

    #[test]
    fn containing_entity_builds_the_path_back() {
        let person = person_type();
        let entity = Value::new(&person);
        entity.set_defaults().unwrap();
        let address = entity.property("Address").unwrap();
        address.set_defaults().unwrap();
        let city = address.property("City").unwrap();
        let mut path = Path::new();
        let found = city.containing_entity(&mut path).unwrap().unwrap();
        assert!(found.same(&entity));
        assert_eq!(path_to_str(&path), "Address/City");
    }

    #[test]
    fn parentless_complex_value_has_no_entity() {
        let address = TypeDef::complex(qn("Schema.Address"))
            .property("City", &edm().string)
            .build()
            .unwrap();
        let v = Value::new(&address);
        let mut path = Path::new();
        assert!(v.containing_entity(&mut path).unwrap().is_none());
    }

    #[test]
    fn declared_annotations_evaluate_frozen() {
        let term = Term::new(qn("Core.Description"), &edm().string);
        let annotated = TypeDef::complex(qn("Schema.Noted"))
            .property("A", &edm().string)
            .annotate(Annotation::new(
                term.clone(),
                Expression::Literal(Literal::String("a note".to_string())),
            ))
            .unwrap()
            .build()
            .unwrap();
        let v = Value::new(&annotated);
        let term_ref: TermRef = "@Core.Description".parse().unwrap();
        let note = v.get_annotation(&term_ref).unwrap().unwrap();
        assert_eq!(note.get_value(), Some(Literal::String("a note".to_string())));
        assert!(note.frozen());
        assert!(v.get_annotation(&"@Core.Other".parse().unwrap()).unwrap().is_none());
    }

    #[test]
    fn updatable_annotations_shadow_declared_ones() {
        let term = Term::with_default(
            qn("Core.Rank"),
            &edm().int64,
            Literal::Int64(1),
        );
        let plain = TypeDef::complex(qn("Schema.Plain"))
            .property("A", &edm().string)
            .annotate(Annotation::with_default(term.clone()))
            .unwrap()
            .build()
            .unwrap();
        let v = Value::new(&plain);
        let term_ref: TermRef = "@Core.Rank".parse().unwrap();
        // declared value carries the term default
        let declared = v.get_annotation(&term_ref).unwrap().unwrap();
        assert_eq!(declared.get_value(), Some(Literal::Int64(1)));
        // an updatable value starts from the default and can change
        let local = v.get_updatable_annotation(&term, None, true).unwrap();
        assert_eq!(local.get_value(), Some(Literal::Int64(1)));
        local.set_value(ValueSeed::from(9i64)).unwrap();
        let seen = v.get_annotation(&term_ref).unwrap().unwrap();
        assert_eq!(seen.get_value(), Some(Literal::Int64(9)));
        v.remove_updatable_annotation(&term_ref);
        let seen = v.get_annotation(&term_ref).unwrap().unwrap();
        assert_eq!(seen.get_value(), Some(Literal::Int64(1)));
    }

    #[test]
    fn touch_propagates_through_complex_parents() {
        let person = person_type();
        let entity = Value::new(&person);
        entity.set_defaults().unwrap();
        entity.rclean();
        let address = entity.property("Address").unwrap();
        address.set_defaults().unwrap();
        address.rclean();
        entity.clean();
        let city = address.property("City").unwrap();
        city.set_value(ValueSeed::from("Lemington")).unwrap();
        // the complex value and the entity both see the change
        assert!(address.dirty());
        assert!(entity.dirty());
    }
}
