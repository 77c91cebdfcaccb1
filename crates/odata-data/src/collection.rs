//! Ordered collections and the loading protocol
//!
//! Bound collection values cache pages of items and fault the rest in
//! on demand.  Services fill values through [`Value::loading`]: the
//! scope suspends the usual mutation rules, routes items through a
//! [`ValueLoader`] and finalizes the cache flags when the page is
//! complete, so a freshly loaded value always reads as clean.

use crate::service::run;
use crate::value::{Value, ValueBody, ValueSeed};
use odata_diagnostics::{ODataError, Result};
use odata_types::{EntityKey, TypeRef, key_expression};

impl Value {
    /// The current item type of a container value
    pub fn item_type(&self) -> Option<TypeRef> {
        match &self.cell().body {
            ValueBody::Collection(b) => Some(b.item_type.clone()),
            ValueBody::EntitySet(b) => Some(b.item_type.clone()),
            ValueBody::Singleton(b) => Some(b.item_type.clone()),
            _ => None,
        }
    }

    /// True when every item the service holds is in the local cache
    pub fn is_fully_cached(&self) -> bool {
        match &self.cell().body {
            ValueBody::Collection(b) => b.fully_cached,
            ValueBody::EntitySet(b) => b.fully_cached,
            ValueBody::Singleton(b) => b.cached,
            _ => true,
        }
    }

    /// A transient item value for this container
    ///
    /// The item carries the container's service binding, container
    /// declaration and (for structured items) a shared handle to the
    /// container's options.
    pub fn new_item(&self) -> Result<Value> {
        let (item_type, options, binding) = {
            let cell = self.cell();
            match &cell.body {
                ValueBody::Collection(b) => {
                    (b.item_type.clone(), b.composite.options.clone(), None)
                }
                ValueBody::EntitySet(b) => (
                    b.item_type.clone(),
                    b.composite.options.clone(),
                    b.binding.clone(),
                ),
                ValueBody::Singleton(b) => (
                    b.item_type.clone(),
                    b.composite.options.clone(),
                    b.binding.clone(),
                ),
                _ => {
                    return Err(ODataError::model(format!("{self} is not a container")));
                }
            }
        };
        let item = Value::new(&item_type);
        if let Some(binding) = binding {
            if item.is_entity() {
                item.set_entity_binding(binding)?;
            }
        }
        if let Some(options) = &options {
            if item.is_structured() {
                item.inherit_options(options, None)?;
            }
        }
        Ok(item)
    }

    /// Number of items in a collection, loading the remainder first
    pub fn collection_len(&self) -> Result<usize> {
        if !self.is_fully_cached() {
            self.load_collection()?;
        }
        match &self.cell().body {
            ValueBody::Collection(b) => Ok(b.items.len()),
            _ => Err(ODataError::model(format!("{self} is not a collection"))),
        }
    }

    fn cached_item(&self, index: usize) -> Option<Value> {
        match &self.cell().body {
            ValueBody::Collection(b) => b.items.get(index).cloned(),
            _ => None,
        }
    }

    /// The item at `index`; a miss on a partial cache loads the rest
    pub fn item(&self, index: usize) -> Result<Value> {
        if !matches!(self.cell().body, ValueBody::Collection(_)) {
            return Err(ODataError::model(format!("{self} is not a collection")));
        }
        if let Some(item) = self.cached_item(index) {
            return Ok(item);
        }
        if !self.is_fully_cached() {
            self.load_collection()?;
            if let Some(item) = self.cached_item(index) {
                return Ok(item);
            }
        }
        Err(ODataError::model(format!(
            "collection index {index} out of range"
        )))
    }

    /// A snapshot of all items, loading the remainder first
    pub fn items(&self) -> Result<Vec<Value>> {
        self.collection_len()?;
        match &self.cell().body {
            ValueBody::Collection(b) => Ok(b.items.clone()),
            _ => Err(ODataError::model(format!("{self} is not a collection"))),
        }
    }

    /// Append a copy of `value`
    pub fn push(&self, value: &Value) -> Result<()> {
        self.begin_mutation()?;
        if !self.is_fully_cached() {
            self.load_collection()?;
        }
        let item = self.new_item()?;
        item.assign(value)?;
        if let ValueBody::Collection(b) = &mut self.cell_mut().body {
            b.items.push(item);
        }
        self.touch();
        Ok(())
    }

    /// Insert a copy of `value` at `index`
    pub fn insert_item(&self, index: usize, value: &Value) -> Result<()> {
        self.begin_mutation()?;
        let len = self.collection_len()?;
        if index > len {
            return Err(ODataError::model(format!(
                "collection index {index} out of range"
            )));
        }
        let item = self.new_item()?;
        item.assign(value)?;
        if let ValueBody::Collection(b) = &mut self.cell_mut().body {
            b.items.insert(index, item);
        }
        self.touch();
        Ok(())
    }

    /// Replace the item at `index` with a copy of `value`
    pub fn set_item(&self, index: usize, value: &Value) -> Result<()> {
        self.begin_mutation()?;
        let len = self.collection_len()?;
        if index >= len {
            return Err(ODataError::model(format!(
                "collection index {index} out of range"
            )));
        }
        let item = self.new_item()?;
        item.assign(value)?;
        if let ValueBody::Collection(b) = &mut self.cell_mut().body {
            b.items[index] = item;
        }
        self.touch();
        Ok(())
    }

    /// Remove and return the item at `index`
    pub fn remove_item(&self, index: usize) -> Result<Value> {
        self.begin_mutation()?;
        let len = self.collection_len()?;
        if index >= len {
            return Err(ODataError::model(format!(
                "collection index {index} out of range"
            )));
        }
        let removed = match &mut self.cell_mut().body {
            ValueBody::Collection(b) => b.items.remove(index),
            _ => return Err(ODataError::model(format!("{self} is not a collection"))),
        };
        self.touch();
        Ok(removed)
    }

    /// Drop every item from `start` on
    ///
    /// Truncating within the cached prefix of a partially cached
    /// collection discards the unloaded tail without fetching it.
    pub fn truncate(&self, start: usize) -> Result<()> {
        self.begin_mutation()?;
        let needs_load = match &self.cell().body {
            ValueBody::Collection(b) => !b.fully_cached && start > b.items.len(),
            _ => return Err(ODataError::model(format!("{self} is not a collection"))),
        };
        if needs_load {
            self.load_collection()?;
        }
        if let ValueBody::Collection(b) = &mut self.cell_mut().body {
            b.items.truncate(start);
            b.fully_cached = true;
            b.next_link = None;
        }
        self.touch();
        Ok(())
    }

    /// Remove every item
    pub fn clear_items(&self) -> Result<()> {
        self.truncate(0)
    }

    /// Load the remaining pages of a bound collection
    pub(crate) fn load_collection(&self) -> Result<()> {
        let service = match self.service() {
            Some(service) => service,
            // unbound collections hold everything they will ever hold
            None => return Ok(()),
        };
        loop {
            let next = match &self.cell().body {
                ValueBody::Collection(b) => {
                    if b.fully_cached {
                        return Ok(());
                    }
                    b.next_link.clone()
                }
                _ => return Err(ODataError::model(format!("{self} is not a collection"))),
            };
            log::debug!("loading collection page for {self}");
            run(service.get_collection(self, next.clone()))?;
            let (fully, after) = match &self.cell().body {
                ValueBody::Collection(b) => (b.fully_cached, b.next_link.clone()),
                _ => return Err(ODataError::model(format!("{self} is not a collection"))),
            };
            if fully {
                return Ok(());
            }
            if after == next {
                return Err(ODataError::model("collection load made no progress"));
            }
        }
    }

    /// Restrict a collection of entities to those matching `key`
    ///
    /// Expressed as a `$filter` on the key properties.
    pub fn set_key_filter(&self, key: &EntityKey) -> Result<()> {
        let item_type = self
            .item_type()
            .ok_or_else(|| ODataError::model(format!("{self} is not a container")))?;
        if !item_type.is_entity() {
            return Err(ODataError::model(
                "key filters apply to collections of entities",
            ));
        }
        let expr = key_expression(&item_type, key)?;
        self.set_filter(Some(expr), None)
    }

    pub(crate) fn set_collection_items(&self, seeds: Vec<ValueSeed>) -> Result<()> {
        if let ValueBody::Collection(b) = &mut self.cell_mut().body {
            b.items.clear();
            b.fully_cached = true;
            b.next_link = None;
        }
        for seed in seeds {
            let item = self.new_item()?;
            item.set_value(seed)?;
            if let ValueBody::Collection(b) = &mut self.cell_mut().body {
                b.items.push(item);
            }
        }
        self.touch();
        Ok(())
    }

    pub(crate) fn assign_collection(&self, other: &Value) -> Result<()> {
        if !matches!(other.cell().body, ValueBody::Collection(_)) {
            return Err(ODataError::model(format!(
                "cannot assign {other} to {self}"
            )));
        }
        let count = other.collection_len()?;
        if let ValueBody::Collection(b) = &mut self.cell_mut().body {
            b.items.clear();
            b.fully_cached = true;
            b.next_link = None;
        }
        for index in 0..count {
            let source = other.item(index)?;
            let item = self.new_item()?;
            item.assign(&source)?;
            if let ValueBody::Collection(b) = &mut self.cell_mut().body {
                b.items.push(item);
            }
        }
        self.touch();
        Ok(())
    }

    /// Run a service fill against this value
    ///
    /// `next_link` is the continuation token found in the page being
    /// loaded, `None` for a final page.  Inside the scope structured
    /// values accept property writes and type casts regardless of
    /// binding; on success the cache flags are finalized and the value
    /// reads as clean.
    pub fn loading<R>(
        &self,
        next_link: Option<String>,
        fill: impl FnOnce(&ValueLoader<'_>) -> Result<R>,
    ) -> Result<R> {
        self.begin_loading(next_link)?;
        let loader = ValueLoader { value: self };
        match fill(&loader) {
            Ok(result) => {
                self.end_loading()?;
                Ok(result)
            }
            Err(err) => {
                self.abort_loading();
                Err(err)
            }
        }
    }

    fn begin_loading(&self, next_link: Option<String>) -> Result<()> {
        let bound = self.is_bound();
        let mut rebuild = false;
        {
            let mut cell = self.cell_mut();
            match &mut cell.body {
                ValueBody::Collection(b) => {
                    if bound {
                        b.next_link = next_link;
                    } else {
                        b.items.clear();
                        b.next_link = None;
                    }
                }
                ValueBody::EntitySet(b) => {
                    if bound {
                        b.next_link = next_link;
                    } else {
                        b.cache.clear();
                        b.key_lock += 1;
                        b.next_link = None;
                    }
                }
                ValueBody::Complex(b) => {
                    b.null = false;
                    b.loading = true;
                    rebuild = b.cache.is_none();
                }
                ValueBody::Entity(b) => {
                    b.structured.null = false;
                    b.structured.loading = true;
                    rebuild = b.structured.cache.is_none();
                }
                _ => {
                    return Err(ODataError::model(format!("cannot load into {self}")));
                }
            }
        }
        if rebuild {
            self.rebuild_property_cache(false)?;
        }
        Ok(())
    }

    fn end_loading(&self) -> Result<()> {
        let top = self.get_page_size();
        let mut structured = false;
        {
            let mut cell = self.cell_mut();
            match &mut cell.body {
                ValueBody::Collection(b) => {
                    b.fully_cached = b.next_link.is_none();
                    // a full page under $top caps the load
                    if let Some(top) = top {
                        if b.items.len() as u64 >= top {
                            b.fully_cached = true;
                            b.next_link = None;
                        }
                    }
                }
                ValueBody::EntitySet(b) => {
                    b.fully_cached = b.next_link.is_none();
                    if let Some(top) = top {
                        if b.cache.len() as u64 == top {
                            b.fully_cached = true;
                            b.next_link = None;
                        }
                    }
                }
                ValueBody::Complex(b) => {
                    b.loading = false;
                    structured = true;
                }
                ValueBody::Entity(b) => {
                    b.structured.loading = false;
                    structured = true;
                }
                _ => {}
            }
        }
        if structured {
            self.rclean();
        } else {
            self.clean();
        }
        Ok(())
    }

    fn abort_loading(&self) {
        let mut cell = self.cell_mut();
        match &mut cell.body {
            ValueBody::Complex(b) => b.loading = false,
            ValueBody::Entity(b) => b.structured.loading = false,
            _ => {}
        }
    }
}

/// Routes loaded items into the value being filled
pub struct ValueLoader<'a> {
    value: &'a Value,
}

impl ValueLoader<'_> {
    /// The value being filled
    pub fn value(&self) -> &Value {
        self.value
    }

    /// A transient item to deserialize one payload entry into
    pub fn new_item(&self) -> Result<Value> {
        self.value.new_item()
    }

    /// Add one loaded item to the cache
    ///
    /// Items loaded into a bound container become bound themselves.
    /// Collection items that are entities get their id checked; a
    /// missing id is repaired through the service before the item is
    /// accepted.  Entity set items are cached under their key.
    pub fn load_item(&self, item: Value) -> Result<()> {
        if let Some(service) = self.value.service() {
            if !item.is_bound() {
                item.bind_to_service(&service)?;
            }
        }
        enum Target {
            Collection,
            EntitySet,
        }
        let target = match &self.value.cell().body {
            ValueBody::Collection(_) => Target::Collection,
            ValueBody::EntitySet(_) => Target::EntitySet,
            _ => {
                return Err(ODataError::model(format!(
                    "{} does not take loaded items",
                    self.value
                )));
            }
        };
        match target {
            Target::Collection => {
                if item.is_entity() && self.value.name().is_some() {
                    if let Some(service) = self.value.service() {
                        match service.get_entity_id(&item) {
                            Ok(_) => {}
                            Err(ODataError::InvalidEntityId { .. }) => {
                                log::debug!("repairing entity id in {}", self.value);
                                service.fix_entity_id(&item, self.value)?;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                }
                if let ValueBody::Collection(b) = &mut self.value.cell_mut().body {
                    b.items.push(item);
                }
                Ok(())
            }
            Target::EntitySet => {
                let key = item.get_key()?;
                if let ValueBody::EntitySet(b) = &mut self.value.cell_mut().body {
                    b.cache.insert(key, item);
                }
                Ok(())
            }
        }
    }
}
