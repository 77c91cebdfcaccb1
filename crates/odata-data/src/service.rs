//! The client-side service contract
//!
//! A [`DataService`] supplies the entity model and the remote
//! operations the value hierarchy faults data through.  Every remote
//! operation is exposed as a [`DataRequest`]: a deferred unit of work
//! whose outcome is captured in a result slot rather than raised, so a
//! caller can batch, retry or inspect failures before deciding to
//! propagate them.

use crate::{EntityBinding, Value};
use odata_diagnostics::{ODataError, Result};
use odata_types::{EntityKey, EntityModel};
use std::rc::Rc;

/// A deferred service operation
///
/// Created ready-to-run by a [`DataService`]; [`execute_request`]
/// performs the work and stores the outcome in [`result`].  A request
/// can be executed at most once.
///
/// [`execute_request`]: DataRequest::execute_request
/// [`result`]: DataRequest::result
pub struct DataRequest<T> {
    work: Option<Box<dyn FnOnce() -> Result<T>>>,
    /// The captured outcome; `None` until executed
    pub result: Option<Result<T>>,
}

impl<T> DataRequest<T> {
    /// A request backed by a unit of work
    pub fn new(work: impl FnOnce() -> Result<T> + 'static) -> Self {
        Self {
            work: Some(Box::new(work)),
            result: None,
        }
    }

    /// A request that is already complete
    pub fn ready(value: T) -> Self {
        Self {
            work: None,
            result: Some(Ok(value)),
        }
    }

    /// A request that has already failed
    pub fn failed(error: ODataError) -> Self {
        Self {
            work: None,
            result: Some(Err(error)),
        }
    }

    /// Execute the request, capturing the outcome in `result`
    ///
    /// Executing an already-completed request is a no-op.
    pub fn execute_request(&mut self) {
        if let Some(work) = self.work.take() {
            self.result = Some(work());
        }
    }

    /// Take the captured outcome, failing if the request never ran
    pub fn take_result(&mut self) -> Result<T> {
        match self.result.take() {
            Some(result) => result,
            None => Err(ODataError::model("request has not been executed")),
        }
    }
}

/// Execute a request synchronously and propagate its outcome
pub(crate) fn run<T>(mut request: DataRequest<T>) -> Result<T> {
    request.execute_request();
    request.take_result()
}

fn unsupported<T>(operation: &str) -> DataRequest<T> {
    DataRequest::failed(ODataError::model(format!(
        "service does not support {operation}"
    )))
}

/// The operations a data service exposes to the value hierarchy
///
/// Only [`model`](DataService::model) is required.  The default request
/// constructors fail with a model error, so a read-only or in-memory
/// service implements just the operations it supports.  The value
/// passed to each operation is the bound value being faulted; its
/// options, container binding and containing entity describe the
/// request context.
pub trait DataService {
    /// The entity model this service serves
    fn model(&self) -> &EntityModel;

    /// Fill a collection value with one page of items
    ///
    /// `next_link` is the continuation token from the previous page, if
    /// any; the service records a new one on the value when more pages
    /// remain.
    fn get_collection(&self, value: &Value, next_link: Option<String>) -> DataRequest<()> {
        let _ = (value, next_link);
        unsupported("get_collection")
    }

    /// Fill an entity set value with one page of entities
    fn get_entity_collection(&self, value: &Value, next_link: Option<String>) -> DataRequest<()> {
        let _ = (value, next_link);
        unsupported("get_entity_collection")
    }

    /// Fetch a single entity from an entity set by key
    fn get_entity_by_key(&self, value: &Value, key: &EntityKey) -> DataRequest<Value> {
        let _ = (value, key);
        unsupported("get_entity_by_key")
    }

    /// The size of an entity set or collection, without items
    fn get_item_count(&self, value: &Value) -> DataRequest<u64> {
        let _ = value;
        unsupported("get_item_count")
    }

    /// Fetch the entity referenced by a singleton, `None` when absent
    fn get_singleton(&self, value: &Value) -> DataRequest<Option<Value>> {
        let _ = value;
        unsupported("get_singleton")
    }

    /// Re-fetch an entity in place
    fn get_entity(&self, value: &Value) -> DataRequest<()> {
        let _ = value;
        unsupported("get_entity")
    }

    /// Re-fetch a single property of an entity in place
    fn get_property(&self, value: &Value) -> DataRequest<()> {
        let _ = value;
        unsupported("get_property")
    }

    /// Create an entity in the target entity set
    ///
    /// With `omit_clean` set only dirty properties are sent.
    fn create_entity(&self, target: &Value, entity: &Value, omit_clean: bool) -> DataRequest<()> {
        let _ = (target, entity, omit_clean);
        unsupported("create_entity")
    }

    /// Push an entity's changes to the service
    fn update_entity(&self, entity: &Value) -> DataRequest<()> {
        let _ = entity;
        unsupported("update_entity")
    }

    /// Push a single property's changes to the service
    fn update_property(&self, value: &Value) -> DataRequest<()> {
        let _ = value;
        unsupported("update_property")
    }

    /// Delete an entity
    fn delete_entity(&self, entity: &Value) -> DataRequest<()> {
        let _ = entity;
        unsupported("delete_entity")
    }

    /// Delete an entity from an entity set by key
    fn delete_entity_by_key(&self, value: &Value, key: &EntityKey) -> DataRequest<()> {
        let _ = (value, key);
        unsupported("delete_entity_by_key")
    }

    /// Fetch an entity reference (id-only form) for an entity
    fn get_entity_ref(&self, entity: &Value) -> DataRequest<Value> {
        let _ = entity;
        unsupported("get_entity_ref")
    }

    /// The id of an entity as the service knows it
    fn get_entity_id(&self, entity: &Value) -> Result<String> {
        let _ = entity;
        Err(ODataError::invalid_entity_id(
            "service does not expose entity ids",
        ))
    }

    /// Repair the id of an entity loaded without one
    ///
    /// Called with the owning collection when [`get_entity_id`] fails
    /// during a load; the default accepts the entity as-is.
    ///
    /// [`get_entity_id`]: DataService::get_entity_id
    fn fix_entity_id(&self, entity: &Value, collection: &Value) -> Result<()> {
        let _ = (entity, collection);
        Ok(())
    }
}

/// Open a container root by name
///
/// Looks the name up among the service container's entity sets and
/// singletons and returns a bound value for it.
pub fn open(service: &Rc<dyn DataService>, name: &str) -> Result<Value> {
    let container = service
        .model()
        .container()
        .ok_or_else(|| ODataError::model("service has no entity container"))?;
    let (type_ref, binding) = if let Some(decl) = container.entity_set(name) {
        (decl.set_type.clone(), EntityBinding::EntitySet(decl.clone()))
    } else if let Some(decl) = container.singleton(name) {
        (
            decl.singleton_type.clone(),
            EntityBinding::Singleton(decl.clone()),
        )
    } else {
        return Err(ODataError::model(format!(
            "no entity set or singleton named {name}"
        )));
    };
    log::debug!("opening container root {name}");
    let value = Value::new(&type_ref);
    value.set_entity_binding(binding)?;
    value.bind_to_service(service)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_lifecycle() {
        let mut request = DataRequest::new(|| Ok(21 * 2));
        assert!(request.result.is_none());
        request.execute_request();
        assert_eq!(request.result, Some(Ok(42)));
        assert_eq!(request.take_result(), Ok(42));
    }

    #[test]
    fn unexecuted_request_has_no_result() {
        let mut request: DataRequest<()> = DataRequest::new(|| Ok(()));
        assert!(request.take_result().is_err());
    }

    #[test]
    fn ready_and_failed_requests() {
        let mut request = DataRequest::ready("done");
        assert_eq!(request.take_result(), Ok("done"));
        let mut request: DataRequest<()> = DataRequest::failed(ODataError::MissingKey);
        assert_eq!(request.take_result(), Err(ODataError::MissingKey));
    }

    #[test]
    fn executing_twice_keeps_the_first_outcome() {
        let mut request = DataRequest::new(|| Ok(1));
        request.execute_request();
        request.execute_request();
        assert_eq!(request.take_result(), Ok(1));
        // a second take sees the empty slot
        assert!(request.take_result().is_err());
    }
}
