//! Entities, entity sets and singletons
//!
//! Entity sets cache entities under their [`EntityKey`].  A bound set
//! is a window onto the service: lookups fault misses in by key,
//! removal deletes remotely and iteration detects structural changes
//! made while it is in progress.  Singletons cache at most one entity.

use crate::service::run;
use crate::value::{EntityBinding, Value, ValueBody};
use indexmap::IndexMap;
use odata_diagnostics::{ODataError, Result};
use odata_types::{EntityKey, KeyScalar, key_from_map};

impl Value {
    /// Associate this value with a container-root declaration
    ///
    /// Must happen before the value is bound to a service.  Setting the
    /// same declaration again is a no-op.
    pub fn set_entity_binding(&self, binding: EntityBinding) -> Result<()> {
        if self.is_bound() {
            return Err(ODataError::bound(format!(
                "binding must be set before {self} is bound to a service"
            )));
        }
        {
            let cell = self.cell();
            let current = match &cell.body {
                ValueBody::Entity(b) => &b.binding,
                ValueBody::EntitySet(b) => &b.binding,
                ValueBody::Singleton(b) => &b.binding,
                _ => {
                    return Err(ODataError::model(format!(
                        "{self} cannot carry a container binding"
                    )));
                }
            };
            if let Some(current) = current {
                if current.name() == binding.name() {
                    return Ok(());
                }
                return Err(ODataError::model(format!(
                    "{self} is already associated with {}",
                    current.name()
                )));
            }
        }
        let mut cell = self.cell_mut();
        match &mut cell.body {
            ValueBody::Entity(b) => b.binding = Some(binding),
            ValueBody::EntitySet(b) => b.binding = Some(binding),
            ValueBody::Singleton(b) => b.binding = Some(binding),
            _ => {}
        }
        Ok(())
    }

    /// The container-root declaration this value is associated with
    pub fn entity_binding(&self) -> Option<EntityBinding> {
        let cell = self.cell();
        match &cell.body {
            ValueBody::Entity(b) => b.binding.clone(),
            ValueBody::EntitySet(b) => b.binding.clone(),
            ValueBody::Singleton(b) => b.binding.clone(),
            _ => None,
        }
    }

    /// The key of this entity, read from its key properties
    ///
    /// Fails with [`ODataError::MissingKey`] when any key property is
    /// null or absent from the selection.
    pub fn get_key(&self) -> Result<EntityKey> {
        if !self.is_entity() {
            return Err(ODataError::model(format!("{self} has no key")));
        }
        let type_def = self.type_def();
        let mut values: IndexMap<String, KeyScalar> = IndexMap::new();
        for kp in type_def.key()? {
            let (leaf, prefix) = kp.path.split_last().ok_or(ODataError::MissingKey)?;
            let mut current = self.clone();
            for name in prefix {
                current = current.property(name)?;
            }
            let literal = current
                .property(leaf)?
                .get_value()
                .ok_or(ODataError::MissingKey)?;
            values.insert(kp.alias.clone(), KeyScalar::try_from(literal)?);
        }
        key_from_map(&type_def, &values)
    }

    /// Fetch the id-only reference form of this entity
    pub fn get_ref(&self) -> Result<Value> {
        if !self.is_entity() {
            return Err(ODataError::model(format!("{self} is not an entity")));
        }
        let service = self.service().ok_or(ODataError::UnboundValue)?;
        run(service.get_entity_ref(self))
    }

    /// Delete this entity from the service and null the local value
    pub fn delete(&self) -> Result<()> {
        if !self.is_entity() {
            return Err(ODataError::model(format!("cannot delete {self}")));
        }
        let service = self.service().ok_or(ODataError::UnboundValue)?;
        log::debug!("deleting {self}");
        run(service.delete_entity(self))?;
        if let Some(b) = self.cell_mut().structured_mut() {
            b.null = true;
            b.cache = None;
        }
        self.clean();
        Ok(())
    }

    /// Load the remaining pages of a bound entity set
    pub(crate) fn load_entity_set(&self) -> Result<()> {
        let service = match self.service() {
            Some(service) => service,
            None => return Ok(()),
        };
        loop {
            let next = match &self.cell().body {
                ValueBody::EntitySet(b) => {
                    if b.fully_cached {
                        return Ok(());
                    }
                    b.next_link.clone()
                }
                _ => {
                    return Err(ODataError::model(format!("{self} is not an entity set")));
                }
            };
            log::debug!("loading entity set page for {self}");
            run(service.get_entity_collection(self, next.clone()))?;
            let (fully, after) = match &self.cell().body {
                ValueBody::EntitySet(b) => (b.fully_cached, b.next_link.clone()),
                _ => {
                    return Err(ODataError::model(format!("{self} is not an entity set")));
                }
            };
            if fully {
                return Ok(());
            }
            if after == next {
                return Err(ODataError::model("entity set load made no progress"));
            }
        }
    }

    /// Number of entities in the set
    ///
    /// A fully cached set answers locally; otherwise the count is asked
    /// of the service without loading any entities.
    pub fn entity_set_len(&self) -> Result<usize> {
        let fully = match &self.cell().body {
            ValueBody::EntitySet(b) => b.fully_cached,
            _ => {
                return Err(ODataError::model(format!("{self} is not an entity set")));
            }
        };
        if fully {
            if let ValueBody::EntitySet(b) = &self.cell().body {
                return Ok(b.cache.len());
            }
        }
        let service = self.service().ok_or(ODataError::UnboundValue)?;
        let count = run(service.get_item_count(self))?;
        usize::try_from(count).map_err(|_| ODataError::model("item count out of range"))
    }

    /// Look up an entity by key
    ///
    /// A miss on a fully cached set is [`ODataError::MissingKey`]; a
    /// miss on a partial set asks the service, translating a 404 the
    /// same way.  Fetched entities are cached under their own key.
    pub fn get(&self, key: &EntityKey) -> Result<Value> {
        let (hit, fully) = {
            let cell = self.cell();
            match &cell.body {
                ValueBody::EntitySet(b) => (b.cache.get(key).cloned(), b.fully_cached),
                _ => {
                    return Err(ODataError::model(format!("{self} is not an entity set")));
                }
            }
        };
        if let Some(entity) = hit {
            return Ok(entity);
        }
        if fully {
            return Err(ODataError::MissingKey);
        }
        let service = self.service().ok_or(ODataError::UnboundValue)?;
        log::debug!("fetching entity {key} from {self}");
        let entity = match run(service.get_entity_by_key(self, key)) {
            Ok(entity) => entity,
            Err(err) if err.is_not_found() => return Err(ODataError::MissingKey),
            Err(err) => return Err(err),
        };
        if !entity.is_bound() {
            entity.bind_to_service(&service)?;
        }
        let key = entity.get_key()?;
        if let ValueBody::EntitySet(b) = &mut self.cell_mut().body {
            b.cache.insert(key, entity.clone());
        }
        Ok(entity)
    }

    /// True when the set holds an entity with this key
    pub fn contains_key(&self, key: &EntityKey) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(ODataError::MissingKey) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Remove the entity with this key
    ///
    /// On a bound, fully cached set the cached entity is deleted first;
    /// on a partial set the local cache is dropped and the delete is
    /// issued by key, translating a 404 into [`ODataError::MissingKey`].
    pub fn remove(&self, key: &EntityKey) -> Result<()> {
        self.begin_mutation()?;
        let (bound, fully) = match &self.cell().body {
            ValueBody::EntitySet(b) => (self.is_bound(), b.fully_cached),
            _ => {
                return Err(ODataError::model(format!("{self} is not an entity set")));
            }
        };
        if !bound {
            let removed = match &mut self.cell_mut().body {
                ValueBody::EntitySet(b) => {
                    let removed = b.cache.shift_remove(key);
                    if removed.is_some() {
                        b.key_lock += 1;
                    }
                    removed
                }
                _ => None,
            };
            if removed.is_none() {
                return Err(ODataError::MissingKey);
            }
            self.touch();
            return Ok(());
        }
        let service = self.service().ok_or(ODataError::UnboundValue)?;
        log::debug!("deleting {key} from {self}");
        if fully {
            let entity = match &self.cell().body {
                ValueBody::EntitySet(b) => b.cache.get(key).cloned(),
                _ => None,
            }
            .ok_or(ODataError::MissingKey)?;
            run(service.delete_entity(&entity))?;
            if let ValueBody::EntitySet(b) = &mut self.cell_mut().body {
                b.cache.shift_remove(key);
                b.key_lock += 1;
            }
            return Ok(());
        }
        // partial cache: drop the local page and delete by key
        self.clear_cache()?;
        match run(service.delete_entity_by_key(self, key)) {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Err(ODataError::MissingKey),
            Err(err) => Err(err),
        }
    }

    /// Add an entity to the set
    ///
    /// Unbound sets cache the entity under its key, rejecting
    /// duplicates.  Bound sets create the entity through the service
    /// and cache it under the key the service assigned.
    pub fn insert(&self, entity: &Value) -> Result<()> {
        self.begin_mutation()?;
        let item_type = match &self.cell().body {
            ValueBody::EntitySet(b) => b.item_type.clone(),
            _ => {
                return Err(ODataError::model(format!("{self} is not an entity set")));
            }
        };
        if !entity.type_def().is_derived_from(&item_type) {
            return Err(ODataError::model(format!(
                "cannot insert {entity} into {self}"
            )));
        }
        if !self.is_bound() {
            let key = entity.get_key()?;
            let dup = match &self.cell().body {
                ValueBody::EntitySet(b) => b.cache.contains_key(&key),
                _ => false,
            };
            if dup {
                return Err(ODataError::duplicate_name(key.to_predicate()));
            }
            if let ValueBody::EntitySet(b) = &mut self.cell_mut().body {
                b.cache.insert(key, entity.clone());
                b.key_lock += 1;
            }
            self.touch();
            return Ok(());
        }
        let service = self.service().ok_or(ODataError::UnboundValue)?;
        if !entity.is_bound() && entity.entity_binding().is_none() {
            if let Some(binding) = self.entity_binding() {
                entity.set_entity_binding(binding)?;
            }
        }
        log::debug!("creating entity in {self}");
        run(service.create_entity(self, entity, false))?;
        if !entity.is_bound() {
            entity.bind_to_service(&service)?;
        }
        let key = entity.get_key()?;
        if let ValueBody::EntitySet(b) = &mut self.cell_mut().body {
            b.cache.insert(key, entity.clone());
            b.key_lock += 1;
        }
        entity.rclean();
        Ok(())
    }

    /// The keys of every entity in the set, loading the remainder first
    pub fn entity_keys(&self) -> Result<Vec<EntityKey>> {
        if !self.is_fully_cached() {
            self.load_entity_set()?;
        }
        match &self.cell().body {
            ValueBody::EntitySet(b) => Ok(b.cache.keys().cloned().collect()),
            _ => Err(ODataError::model(format!("{self} is not an entity set"))),
        }
    }

    /// Iterate over the entities in the set
    ///
    /// The set is loaded fully first.  Structural changes made while
    /// the iterator is live surface as [`ODataError::StaleIterator`]
    /// from the next call.
    pub fn iter_entities(&self) -> Result<EntityIter> {
        let keys = self.entity_keys()?;
        let lock = match &self.cell().body {
            ValueBody::EntitySet(b) => b.key_lock,
            _ => {
                return Err(ODataError::model(format!("{self} is not an entity set")));
            }
        };
        Ok(EntityIter {
            set: self.clone(),
            keys: keys.into_iter(),
            lock,
        })
    }

    /// The entity a singleton refers to
    ///
    /// Bound singletons fetch on first access; an absent target is
    /// [`ODataError::MissingKey`].  A transient singleton hands out a
    /// fresh null entity and keeps it.
    pub fn entity(&self) -> Result<Value> {
        let (cached, cache) = {
            let cell = self.cell();
            match &cell.body {
                ValueBody::Singleton(b) => (b.cached, b.cache.clone()),
                _ => {
                    return Err(ODataError::model(format!("{self} is not a singleton")));
                }
            }
        };
        if let Some(entity) = cache {
            return Ok(entity);
        }
        if !cached {
            let service = self.service().ok_or(ODataError::UnboundValue)?;
            log::debug!("fetching singleton {self}");
            let fetched = run(service.get_singleton(self))?;
            if let Some(entity) = &fetched {
                if !entity.is_bound() {
                    entity.bind_to_service(&service)?;
                }
            }
            if let ValueBody::Singleton(b) = &mut self.cell_mut().body {
                b.cached = true;
                b.cache = fetched.clone();
            }
            return fetched.ok_or(ODataError::MissingKey);
        }
        let entity = self.new_item()?;
        if let ValueBody::Singleton(b) = &mut self.cell_mut().body {
            b.cache = Some(entity.clone());
        }
        Ok(entity)
    }

    /// Point a singleton at a different entity
    pub fn change(&self, entity: &Value) -> Result<()> {
        self.begin_mutation()?;
        let item_type = match &self.cell().body {
            ValueBody::Singleton(b) => b.item_type.clone(),
            _ => {
                return Err(ODataError::model(format!("{self} is not a singleton")));
            }
        };
        if !entity.type_def().is_derived_from(&item_type) {
            return Err(ODataError::model(format!(
                "cannot point {self} at {entity}"
            )));
        }
        if let ValueBody::Singleton(b) = &mut self.cell_mut().body {
            b.cached = true;
            b.cache = Some(entity.clone());
        }
        self.touch();
        Ok(())
    }
}

/// Iterates the entities of an entity set by key
///
/// Holds the keys captured when iteration began; the set noticing a
/// structural change in the meantime fails the iteration rather than
/// yielding entities from a moved window.
pub struct EntityIter {
    set: Value,
    keys: std::vec::IntoIter<EntityKey>,
    lock: u64,
}

impl Iterator for EntityIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        let hit = {
            let cell = self.set.cell();
            match &cell.body {
                ValueBody::EntitySet(b) => {
                    if b.key_lock != self.lock {
                        return Some(Err(ODataError::StaleIterator));
                    }
                    b.cache.get(&key).cloned()
                }
                _ => return Some(Err(ODataError::StaleIterator)),
            }
        };
        match hit {
            Some(entity) => Some(Ok(entity)),
            None => Some(Err(ODataError::StaleIterator)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueSeed;
    use odata_names::QualifiedName;
    use odata_types::{KeyProperty, TypeDef, TypeRef, edm};
    use pretty_assertions::assert_eq;

    fn qn(s: &str) -> QualifiedName {
        s.parse().unwrap()
    }

    fn person_type() -> TypeRef {
        TypeDef::entity(qn("Schema.Person"))
            .key_property("UserName", &edm().string)
            .property("FirstName", &edm().string)
            .build()
            .unwrap()
    }

    fn person(user_name: &str) -> Value {
        let p = Value::new(&person_type());
        p.set_value(ValueSeed::Map(IndexMap::from_iter([(
            "UserName".to_string(),
            ValueSeed::from(user_name),
        )])))
        .unwrap();
        p
    }

    fn people_set() -> Value {
        Value::new(&TypeDef::entity_set_of(&person_type()))
    }

    #[test]
    fn key_from_key_properties() {
        let p = person("kristakemp");
        assert_eq!(p.get_key().unwrap().to_predicate(), "'kristakemp'");
    }

    #[test]
    fn composite_key_uses_declaration_order() {
        let line_type = TypeDef::entity(qn("Schema.OrderLine"))
            .required_property("OrderID", &edm().int32)
            .required_property("LineNo", &edm().int32)
            .key(vec![KeyProperty::new("OrderID"), KeyProperty::new("LineNo")])
            .build()
            .unwrap();
        let line = Value::new(&line_type);
        line.set_value(ValueSeed::Map(IndexMap::from_iter([
            ("LineNo".to_string(), ValueSeed::from(2i64)),
            ("OrderID".to_string(), ValueSeed::from(5i64)),
        ])))
        .unwrap();
        assert_eq!(line.get_key().unwrap().to_predicate(), "OrderID=5,LineNo=2");
    }

    #[test]
    fn null_key_property_is_a_missing_key() {
        let p = Value::new(&person_type());
        p.set_defaults().unwrap();
        assert_eq!(p.get_key(), Err(ODataError::MissingKey));
    }

    #[test]
    fn insert_get_and_remove() {
        let people = people_set();
        people.insert(&person("a")).unwrap();
        people.insert(&person("b")).unwrap();
        assert_eq!(people.entity_set_len().unwrap(), 2);
        let key = EntityKey::Single("a".into());
        assert!(people.contains_key(&key).unwrap());
        let found = people.get(&key).unwrap();
        assert_eq!(found.get_key().unwrap(), key);
        people.remove(&key).unwrap();
        assert!(!people.contains_key(&key).unwrap());
        assert_eq!(people.remove(&key), Err(ODataError::MissingKey));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let people = people_set();
        people.insert(&person("a")).unwrap();
        let err = people.insert(&person("a")).unwrap_err();
        assert_eq!(err, ODataError::duplicate_name("'a'"));
    }

    #[test]
    fn lookup_miss_on_a_complete_set() {
        let people = people_set();
        people.insert(&person("a")).unwrap();
        assert_eq!(
            people.get(&EntityKey::Single("nobody".into())),
            Err(ODataError::MissingKey)
        );
    }

    #[test]
    fn iteration_walks_the_cache_in_order() {
        let people = people_set();
        for name in ["c", "a", "b"] {
            people.insert(&person(name)).unwrap();
        }
        let names: Vec<String> = people
            .iter_entities()
            .unwrap()
            .map(|e| e.unwrap().get_key().unwrap().to_predicate())
            .collect();
        assert_eq!(names, vec!["'c'", "'a'", "'b'"]);
    }

    #[test]
    fn removal_during_iteration_is_detected() {
        let people = people_set();
        people.insert(&person("a")).unwrap();
        people.insert(&person("b")).unwrap();
        let mut iter = people.iter_entities().unwrap();
        assert!(iter.next().unwrap().is_ok());
        people.remove(&EntityKey::Single("b".into())).unwrap();
        assert_eq!(iter.next(), Some(Err(ODataError::StaleIterator)));
    }

    #[test]
    fn insertion_during_iteration_is_detected() {
        let people = people_set();
        people.insert(&person("a")).unwrap();
        let mut iter = people.iter_entities().unwrap();
        people.insert(&person("b")).unwrap();
        assert_eq!(iter.next(), Some(Err(ODataError::StaleIterator)));
    }

    #[test]
    fn insert_checks_the_item_type() {
        let other = TypeDef::entity(qn("Schema.Airline"))
            .key_property("Code", &edm().string)
            .build()
            .unwrap();
        let people = people_set();
        let airline = Value::new(&other);
        airline
            .set_value(ValueSeed::Map(IndexMap::from_iter([(
                "Code".to_string(),
                ValueSeed::from("AA"),
            )])))
            .unwrap();
        assert!(people.insert(&airline).is_err());
    }

    #[test]
    fn transient_singleton_hands_out_one_entity() {
        let me = Value::new(&TypeDef::singleton_of(&person_type()));
        let first = me.entity().unwrap();
        assert!(first.is_null());
        let second = me.entity().unwrap();
        assert!(first.same(&second));
    }

    #[test]
    fn change_retargets_a_singleton() {
        let me = Value::new(&TypeDef::singleton_of(&person_type()));
        let krista = person("kristakemp");
        me.change(&krista).unwrap();
        assert!(me.entity().unwrap().same(&krista));
        assert!(me.dirty());
    }

    #[test]
    fn change_checks_the_entity_type() {
        let me = Value::new(&TypeDef::singleton_of(&person_type()));
        let stray = Value::new(&edm().string);
        assert!(me.change(&stray).is_err());
    }
}
