//! Bound value tests against a scripted in-memory service
//!
//! Exercises the service-facing side of the value hierarchy:
//! - opening container roots
//! - paged entity set loading and iteration
//! - key lookups faulting single entities, 404 translation
//! - removal on partial and fully cached sets
//! - insertion, update and singleton access

use indexmap::IndexMap;
use odata_data::{DataRequest, DataService, Value, ValueSeed, open};
use odata_diagnostics::{ODataError, Result};
use odata_types::{
    EntityContainer, EntityKey, EntityModel, EntitySetDecl, SingletonDecl, TypeDef, TypeRef, edm,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

type Rows = Rc<RefCell<IndexMap<EntityKey, IndexMap<String, ValueSeed>>>>;
type Calls = Rc<RefCell<Vec<String>>>;

struct TestService {
    model: EntityModel,
    rows: Rows,
    page_size: usize,
    calls: Calls,
}

fn person_type() -> TypeRef {
    TypeDef::entity("Sample.Person".parse().unwrap())
        .key_property("UserName", &edm().string)
        .property("FirstName", &edm().string)
        .build()
        .unwrap()
}

fn person_row(user: &str, first: &str) -> (EntityKey, IndexMap<String, ValueSeed>) {
    let row = IndexMap::from_iter([
        ("UserName".to_string(), ValueSeed::from(user)),
        ("FirstName".to_string(), ValueSeed::from(first)),
    ]);
    (EntityKey::Single(user.into()), row)
}

fn setup(people: &[(&str, &str)], page_size: usize) -> (Rc<dyn DataService>, Rows, Calls) {
    let person = person_type();
    let mut model = EntityModel::new();
    model.declare_type(person.clone()).unwrap();
    let mut container = EntityContainer::new("Service");
    container
        .declare_entity_set(EntitySetDecl::new("People", &person))
        .unwrap();
    container
        .declare_singleton(SingletonDecl::new("Me", &person))
        .unwrap();
    model.set_container(container);
    let rows: Rows = Rc::new(RefCell::new(
        people.iter().map(|(u, f)| person_row(u, f)).collect(),
    ));
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    let service = Rc::new(TestService {
        model,
        rows: Rc::clone(&rows),
        page_size,
        calls: Rc::clone(&calls),
    });
    (service, rows, calls)
}

fn fill_entity(entity: &Value, row: IndexMap<String, ValueSeed>) -> Result<()> {
    entity.loading(None, |_| entity.set_value(ValueSeed::Map(row)))
}

fn snapshot_row(entity: &Value) -> Result<IndexMap<String, ValueSeed>> {
    let mut row = IndexMap::new();
    for name in entity.property_names()? {
        if let Some(lit) = entity.property(&name)?.get_value() {
            row.insert(name, ValueSeed::Literal(lit));
        }
    }
    Ok(row)
}

impl DataService for TestService {
    fn model(&self) -> &EntityModel {
        &self.model
    }

    fn get_entity_collection(&self, value: &Value, next_link: Option<String>) -> DataRequest<()> {
        self.calls.borrow_mut().push(format!("list {next_link:?}"));
        let value = value.clone();
        let rows: Vec<IndexMap<String, ValueSeed>> =
            self.rows.borrow().values().cloned().collect();
        let page_size = self.page_size;
        DataRequest::new(move || {
            let start: usize = match &next_link {
                Some(link) => link.parse().map_err(|_| ODataError::model("bad next link"))?,
                None => 0,
            };
            let end = (start + page_size).min(rows.len());
            let next = (end < rows.len()).then(|| end.to_string());
            value.loading(next, |loader| {
                for row in &rows[start..end] {
                    let item = loader.new_item()?;
                    fill_entity(&item, row.clone())?;
                    loader.load_item(item)?;
                }
                Ok(())
            })
        })
    }

    fn get_entity_by_key(&self, value: &Value, key: &EntityKey) -> DataRequest<Value> {
        self.calls.borrow_mut().push(format!("get {key}"));
        let row = self.rows.borrow().get(key).cloned();
        let value = value.clone();
        DataRequest::new(move || {
            let row = row.ok_or_else(|| ODataError::service(404, "no such person"))?;
            let item = value.new_item()?;
            fill_entity(&item, row)?;
            Ok(item)
        })
    }

    fn get_item_count(&self, _value: &Value) -> DataRequest<u64> {
        self.calls.borrow_mut().push("count".to_string());
        DataRequest::ready(self.rows.borrow().len() as u64)
    }

    fn get_singleton(&self, value: &Value) -> DataRequest<Option<Value>> {
        self.calls.borrow_mut().push("me".to_string());
        let row = self.rows.borrow().values().next().cloned();
        let value = value.clone();
        DataRequest::new(move || match row {
            Some(row) => {
                let item = value.new_item()?;
                fill_entity(&item, row)?;
                Ok(Some(item))
            }
            None => Ok(None),
        })
    }

    fn get_entity(&self, entity: &Value) -> DataRequest<()> {
        self.calls.borrow_mut().push("reload".to_string());
        let key = match entity.get_key() {
            Ok(key) => key,
            Err(err) => return DataRequest::failed(err),
        };
        let row = self.rows.borrow().get(&key).cloned();
        let entity = entity.clone();
        DataRequest::new(move || {
            let row = row.ok_or_else(|| ODataError::service(404, "no such person"))?;
            fill_entity(&entity, row)
        })
    }

    fn create_entity(&self, _target: &Value, entity: &Value, _omit_clean: bool) -> DataRequest<()> {
        self.calls.borrow_mut().push("create".to_string());
        let rows = Rc::clone(&self.rows);
        let entity = entity.clone();
        DataRequest::new(move || {
            let key = entity.get_key()?;
            let row = snapshot_row(&entity)?;
            if rows.borrow_mut().insert(key, row).is_some() {
                return Err(ODataError::service(409, "key already exists"));
            }
            Ok(())
        })
    }

    fn update_entity(&self, entity: &Value) -> DataRequest<()> {
        self.calls.borrow_mut().push("update".to_string());
        let rows = Rc::clone(&self.rows);
        let entity = entity.clone();
        DataRequest::new(move || {
            let key = entity.get_key()?;
            let row = snapshot_row(&entity)?;
            if rows.borrow_mut().insert(key, row).is_none() {
                return Err(ODataError::service(404, "no such person"));
            }
            Ok(())
        })
    }

    fn delete_entity(&self, entity: &Value) -> DataRequest<()> {
        self.calls.borrow_mut().push("delete".to_string());
        let rows = Rc::clone(&self.rows);
        let entity = entity.clone();
        DataRequest::new(move || {
            let key = entity.get_key()?;
            rows.borrow_mut()
                .shift_remove(&key)
                .map(|_| ())
                .ok_or_else(|| ODataError::service(404, "no such person"))
        })
    }

    fn delete_entity_by_key(&self, _value: &Value, key: &EntityKey) -> DataRequest<()> {
        self.calls.borrow_mut().push(format!("delete {key}"));
        let rows = Rc::clone(&self.rows);
        let key = key.clone();
        DataRequest::new(move || {
            rows.borrow_mut()
                .shift_remove(&key)
                .map(|_| ())
                .ok_or_else(|| ODataError::service(404, "no such person"))
        })
    }
}

fn first_name(entity: &Value) -> String {
    match entity.property("FirstName").unwrap().get_value() {
        Some(odata_ast::Literal::String(s)) => s,
        other => panic!("unexpected FirstName: {other:?}"),
    }
}

// === Container roots ===

#[test]
fn open_looks_up_container_roots() {
    let (service, _, _) = setup(&[("a", "Ann")], 10);
    let people = open(&service, "People").unwrap();
    assert!(people.is_bound());
    assert!(!people.is_fully_cached());
    let me = open(&service, "Me").unwrap();
    assert!(me.is_bound());
    assert!(open(&service, "Nowhere").is_err());
}

// === Paged loading ===

#[test]
fn iteration_loads_every_page() {
    let (service, _, calls) = setup(
        &[
            ("a", "Ann"),
            ("b", "Bob"),
            ("c", "Cat"),
            ("d", "Dan"),
            ("e", "Eve"),
        ],
        2,
    );
    let people = open(&service, "People").unwrap();
    let names: Vec<String> = people
        .iter_entities()
        .unwrap()
        .map(|e| first_name(&e.unwrap()))
        .collect();
    assert_eq!(names, vec!["Ann", "Bob", "Cat", "Dan", "Eve"]);
    assert!(people.is_fully_cached());
    let pages = calls.borrow().iter().filter(|c| c.starts_with("list")).count();
    assert_eq!(pages, 3);
    // a second pass answers from the cache
    assert_eq!(people.iter_entities().unwrap().count(), 5);
    assert_eq!(calls.borrow().len(), 3);
}

#[test]
fn top_caps_the_load() {
    let (service, _, calls) = setup(&[("a", "Ann"), ("b", "Bob"), ("c", "Cat")], 2);
    let people = open(&service, "People").unwrap();
    people.set_page(Some(2), 0, None).unwrap();
    let keys = people.entity_keys().unwrap();
    assert_eq!(keys.len(), 2);
    assert!(people.is_fully_cached());
    let pages = calls.borrow().iter().filter(|c| c.starts_with("list")).count();
    assert_eq!(pages, 1);
}

// === Key lookups ===

#[test]
fn lookup_faults_a_single_entity() {
    let (service, _, calls) = setup(&[("a", "Ann"), ("b", "Bob")], 10);
    let people = open(&service, "People").unwrap();
    let key = EntityKey::Single("b".into());
    let bob = people.get(&key).unwrap();
    assert!(bob.is_bound());
    assert!(!bob.dirty());
    assert_eq!(first_name(&bob), "Bob");
    assert_eq!(*calls.borrow(), ["get 'b'"]);
    // the second lookup is a cache hit
    let again = people.get(&key).unwrap();
    assert!(again.same(&bob));
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn lookup_miss_becomes_a_missing_key() {
    let (service, _, _) = setup(&[("a", "Ann")], 10);
    let people = open(&service, "People").unwrap();
    assert_eq!(
        people.get(&EntityKey::Single("nobody".into())),
        Err(ODataError::MissingKey)
    );
    assert!(!people.contains_key(&EntityKey::Single("nobody".into())).unwrap());
}

#[test]
fn length_asks_the_service_until_fully_cached() {
    let (service, _, calls) = setup(&[("a", "Ann"), ("b", "Bob"), ("c", "Cat")], 10);
    let people = open(&service, "People").unwrap();
    assert_eq!(people.entity_set_len().unwrap(), 3);
    assert_eq!(*calls.borrow(), ["count"]);
    people.entity_keys().unwrap();
    assert_eq!(people.entity_set_len().unwrap(), 3);
    // no second count once the cache is complete
    let counts = calls.borrow().iter().filter(|c| *c == "count").count();
    assert_eq!(counts, 1);
}

// === Removal ===

#[test]
fn remove_on_a_partial_cache_deletes_by_key() {
    let (service, rows, calls) = setup(&[("a", "Ann"), ("b", "Bob")], 10);
    let people = open(&service, "People").unwrap();
    people.get(&EntityKey::Single("a".into())).unwrap();
    people.remove(&EntityKey::Single("b".into())).unwrap();
    assert!(calls.borrow().contains(&"delete 'b'".to_string()));
    assert_eq!(rows.borrow().len(), 1);
    // the local cache was dropped along with the delete
    assert!(!people.is_fully_cached());
    assert!(people.contains_key(&EntityKey::Single("a".into())).unwrap());
}

#[test]
fn remove_on_a_full_cache_deletes_the_cached_entity() {
    let (service, rows, calls) = setup(&[("a", "Ann"), ("b", "Bob")], 10);
    let people = open(&service, "People").unwrap();
    people.entity_keys().unwrap();
    people.remove(&EntityKey::Single("a".into())).unwrap();
    assert!(calls.borrow().contains(&"delete".to_string()));
    assert_eq!(rows.borrow().len(), 1);
    assert_eq!(people.entity_set_len().unwrap(), 1);
    assert_eq!(
        people.remove(&EntityKey::Single("a".into())),
        Err(ODataError::MissingKey)
    );
}

// === Insertion and update ===

#[test]
fn insert_creates_through_the_service() {
    let (service, rows, calls) = setup(&[("a", "Ann")], 10);
    let people = open(&service, "People").unwrap();
    let cat = people.new_item().unwrap();
    cat.set_value(ValueSeed::Map(IndexMap::from_iter([
        ("UserName".to_string(), ValueSeed::from("c")),
        ("FirstName".to_string(), ValueSeed::from("Cat")),
    ])))
    .unwrap();
    people.insert(&cat).unwrap();
    assert!(calls.borrow().contains(&"create".to_string()));
    assert!(rows.borrow().contains_key(&EntityKey::Single("c".into())));
    assert!(cat.is_bound());
    assert!(!cat.dirty());
    assert!(people.get(&EntityKey::Single("c".into())).unwrap().same(&cat));
}

#[test]
fn commit_updates_a_fetched_entity() {
    let (service, rows, _) = setup(&[("a", "Ann")], 10);
    let people = open(&service, "People").unwrap();
    let key = EntityKey::Single("a".into());
    let ann = people.get(&key).unwrap();
    ann.property("FirstName")
        .unwrap()
        .set_value(ValueSeed::from("Annie"))
        .unwrap();
    assert!(ann.dirty());
    ann.commit().unwrap();
    assert!(!ann.dirty());
    assert_eq!(
        rows.borrow()[&key]["FirstName"],
        ValueSeed::from("Annie")
    );
}

// === Singletons ===

#[test]
fn singleton_fetches_once() {
    let (service, _, calls) = setup(&[("a", "Ann")], 10);
    let me = open(&service, "Me").unwrap();
    let entity = me.entity().unwrap();
    assert!(entity.is_bound());
    assert_eq!(first_name(&entity), "Ann");
    let again = me.entity().unwrap();
    assert!(again.same(&entity));
    let fetches = calls.borrow().iter().filter(|c| *c == "me").count();
    assert_eq!(fetches, 1);
}
