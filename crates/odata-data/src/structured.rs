//! Structured values
//!
//! Complex and entity values hold their properties in a lazily built
//! cache.  The cache is shaped by the value's options: unselected
//! structural properties are absent, complex properties carry derived
//! sub-options and navigation properties appear only when expanded or
//! selected.  Null structured values have no cache at all; becoming
//! non-null builds one.

use crate::service::run;
use crate::value::{Value, ValueBody, ValueSeed};
use indexmap::IndexMap;
use odata_diagnostics::{ODataError, Result};
use odata_names::{PathSegment, QualifiedName, is_simple_identifier};
use odata_query::{PropertyName, SelectItem, SharedExpandOptions};
use odata_types::{NavigationProperty, PropertyDef, TypeDef, TypeRef};
use std::collections::HashSet;

impl Value {
    pub(crate) fn require_structured(&self) -> Result<()> {
        if self.is_structured() {
            Ok(())
        } else {
            Err(ODataError::model(format!("{self} is not structured")))
        }
    }

    /// Rebuild the property cache from the type and the options
    ///
    /// Existing structural children are kept where the shape allows it,
    /// so property values survive option changes; navigation children
    /// are recreated.  With `clear` set nothing is kept.
    pub(crate) fn rebuild_property_cache(&self, clear: bool) -> Result<()> {
        let (type_def, base_def, options, null) = {
            let cell = self.cell();
            match cell.structured() {
                Some(b) => (
                    cell.type_def.clone(),
                    b.base_def.clone(),
                    b.composite.options.clone(),
                    b.null,
                ),
                None => {
                    return Err(ODataError::model(format!("{self} has no properties")));
                }
            }
        };
        if null {
            return Ok(());
        }
        let mut existing = {
            let mut cell = self.cell_mut();
            match cell.structured_mut() {
                Some(b) if clear => {
                    b.cache = None;
                    IndexMap::new()
                }
                Some(b) => b.cache.take().unwrap_or_default(),
                None => IndexMap::new(),
            }
        };
        let mut cache: IndexMap<String, Value> = IndexMap::new();
        for property in type_def.properties() {
            let name = property.name();
            let declared_cast = if base_def.property(name).is_some() {
                None
            } else {
                type_def.declared_in(name)
            };
            match property {
                PropertyDef::Structural(p) if p.type_ref.is_complex() => {
                    let derived = match &options {
                        Some(o) => match o.borrow().complex_selected(declared_cast, name)? {
                            Some(derived) => Some(derived),
                            None => continue,
                        },
                        None => None,
                    };
                    let child = match existing.shift_remove(name) {
                        Some(child) => child,
                        None => {
                            let child = if p.collection {
                                Value::new(&TypeDef::collection_of(&p.type_ref))
                            } else {
                                Value::new(&p.type_ref)
                            };
                            child.set_parent(self, name)?;
                            child
                        }
                    };
                    if let Some(derived) = derived {
                        let implied = take_implied_cast(&derived);
                        child.inherit_options(&derived, implied.as_ref())?;
                    }
                    cache.insert(name.to_string(), child);
                }
                PropertyDef::Structural(p) => {
                    let include = match &options {
                        Some(o) => o
                            .borrow()
                            .selected(declared_cast, PropertyName::Simple(name))?,
                        None => true,
                    };
                    if !include {
                        continue;
                    }
                    let child = match existing.shift_remove(name) {
                        Some(child) => child,
                        None => {
                            let child = if p.collection {
                                Value::new(&TypeDef::collection_of(&p.type_ref))
                            } else {
                                Value::new(&p.type_ref)
                            };
                            child.set_parent(self, name)?;
                            child
                        }
                    };
                    cache.insert(name.to_string(), child);
                }
                PropertyDef::Navigation(np) => {
                    let Some(o) = &options else { continue };
                    let expanded = o.borrow().expanded(declared_cast, name)?;
                    if let Some((xitem, cast, qualifier)) = expanded {
                        existing.shift_remove(name);
                        let child = navigation_value(np);
                        child.set_parent(self, name)?;
                        if let Some(q) = qualifier {
                            child.set_qualifier(q);
                        }
                        child.inherit_options(&xitem.options, cast.as_ref())?;
                        cache.insert(name.to_string(), child);
                    } else if o.borrow().nav_selected(declared_cast, name)? {
                        let child = match existing.shift_remove(name) {
                            Some(child) => child,
                            None => {
                                let child = navigation_value(np);
                                child.set_parent(self, name)?;
                                child
                            }
                        };
                        cache.insert(name.to_string(), child);
                    }
                }
            }
        }
        // dynamic properties of open types survive the rebuild
        for (name, child) in existing {
            if type_def.property(&name).is_none() {
                cache.insert(name, child);
            }
        }
        if let Some(b) = self.cell_mut().structured_mut() {
            b.cache = Some(cache);
        }
        Ok(())
    }

    fn ensure_property_cache(&self) -> Result<()> {
        let (needs, null, bound) = {
            let cell = self.cell();
            match cell.structured() {
                Some(b) => (b.cache.is_none(), b.null, cell.service.is_some()),
                None => {
                    return Err(ODataError::model(format!("{self} has no properties")));
                }
            }
        };
        if null || !needs {
            return Ok(());
        }
        self.rebuild_property_cache(false)?;
        if bound {
            self.reload()?;
        }
        Ok(())
    }

    fn cached_properties(&self) -> IndexMap<String, Value> {
        self.cell()
            .structured()
            .and_then(|b| b.cache.clone())
            .unwrap_or_default()
    }

    /// The named property's value
    ///
    /// Fails for properties the type does not declare, properties
    /// excluded by the selection and any access on a null value.
    pub fn property(&self, name: &str) -> Result<Value> {
        self.try_property(name)?
            .ok_or_else(|| ODataError::path(format!("no such property: {name}")))
    }

    /// The named property's value, `None` when absent from the cache
    pub fn try_property(&self, name: &str) -> Result<Option<Value>> {
        self.require_structured()?;
        if self.is_null() {
            return Err(ODataError::path(format!(
                "property access on a null {self}"
            )));
        }
        self.ensure_property_cache()?;
        let cell = self.cell();
        Ok(cell
            .structured()
            .and_then(|b| b.cache.as_ref())
            .and_then(|cache| cache.get(name).cloned()))
    }

    /// The names of the cached properties, in declaration order
    pub fn property_names(&self) -> Result<Vec<String>> {
        self.require_structured()?;
        if self.is_null() {
            return Ok(Vec::new());
        }
        self.ensure_property_cache()?;
        let cell = self.cell();
        Ok(cell
            .structured()
            .and_then(|b| b.cache.as_ref())
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Make the value non-null and fill in declared defaults
    ///
    /// Null primitive properties take their declared default values;
    /// non-nullable complex properties get their own defaults set
    /// recursively.  Calling this on a non-null value re-applies the
    /// defaults to properties that are still null.
    pub fn set_defaults(&self) -> Result<()> {
        self.require_structured()?;
        self.begin_mutation()?;
        if let Some(b) = self.cell_mut().structured_mut() {
            b.null = false;
        }
        let needs = self
            .cell()
            .structured()
            .is_some_and(|b| b.cache.is_none());
        if needs {
            self.rebuild_property_cache(false)?;
        }
        let type_def = self.type_def();
        let cache = self.cached_properties();
        for property in type_def.properties() {
            let PropertyDef::Structural(p) = property else {
                continue;
            };
            let Some(child) = cache.get(&p.name) else {
                continue;
            };
            if p.collection {
                continue;
            }
            if p.type_ref.is_complex() {
                if !p.nullable && child.is_null() {
                    child.set_defaults()?;
                }
            } else if child.is_null() {
                if let Some(default) = &p.default_value {
                    child.set_value(ValueSeed::Literal(default.clone()))?;
                }
            }
        }
        self.touch();
        Ok(())
    }

    pub(crate) fn set_structured_value(&self, mut map: IndexMap<String, ValueSeed>) -> Result<()> {
        if let Some(b) = self.cell_mut().structured_mut() {
            b.null = false;
        }
        let needs = self
            .cell()
            .structured()
            .is_some_and(|b| b.cache.is_none());
        if needs {
            self.rebuild_property_cache(false)?;
        }
        let type_def = self.type_def();
        let cache = self.cached_properties();
        for property in type_def.properties() {
            let PropertyDef::Structural(p) = property else {
                continue;
            };
            let Some(child) = cache.get(&p.name) else {
                if map.shift_remove(&p.name).is_some() {
                    return Err(ODataError::model(format!(
                        "property {} is not selected",
                        p.name
                    )));
                }
                continue;
            };
            match map.shift_remove(&p.name) {
                Some(seed) => child.set_value(seed)?,
                None if p.collection => child.clear_items()?,
                None if p.type_ref.is_complex() => {
                    if p.nullable {
                        child.set_value(ValueSeed::Null)?;
                    } else {
                        child.set_defaults()?;
                    }
                }
                None => match &p.default_value {
                    Some(default) => child.set_value(ValueSeed::Literal(default.clone()))?,
                    None => child.set_value(ValueSeed::Null)?,
                },
            }
        }
        if !map.is_empty() {
            if type_def.is_open() {
                for name in map.keys() {
                    log::trace!("ignoring dynamic property {name} in object payload");
                }
            } else {
                let names: Vec<&str> = map.keys().map(String::as_str).collect();
                return Err(ODataError::model(format!(
                    "no such properties: {}",
                    names.join(", ")
                )));
            }
        }
        self.touch();
        Ok(())
    }

    /// Set the value and narrow the selection to the supplied shape
    ///
    /// The object's keys become select rules, so a later commit sends
    /// exactly the supplied properties.  Supplying every property of
    /// the type (a tight fit) restores the default selection instead of
    /// enumerating rules.
    pub fn select_value(&self, seed: ValueSeed) -> Result<()> {
        self.require_structured()?;
        self.begin_mutation()?;
        match seed {
            ValueSeed::Null => {
                if let Some(b) = self.cell_mut().structured_mut() {
                    b.null = true;
                    b.cache = None;
                }
                self.touch();
                Ok(())
            }
            ValueSeed::Map(map) => {
                let rules = subselect(&self.type_def(), &map)?;
                let options = self.fork_options()?;
                {
                    let mut o = options.borrow_mut();
                    o.clear_select();
                    for rule in &rules {
                        o.add_select_path(&rule.join("/"))?;
                    }
                }
                self.clear_cache()?;
                self.set_value(ValueSeed::Map(map))
            }
            _ => Err(ODataError::model("expected an object or null value")),
        }
    }

    /// Add a dynamic property to an open structured value
    ///
    /// The value becomes owned by this one; declared property names and
    /// existing dynamic names are rejected.
    pub fn set_dynamic(&self, name: &str, value: &Value) -> Result<()> {
        self.require_structured()?;
        self.begin_mutation()?;
        if !self.type_def().is_open() {
            return Err(ODataError::model(format!(
                "{} is not an open type",
                self.type_def()
            )));
        }
        if !is_simple_identifier(name) {
            return Err(ODataError::model(format!("bad property name: {name}")));
        }
        if self.type_def().property(name).is_some() {
            return Err(ODataError::duplicate_name(name));
        }
        if value.parent().is_some() || value.is_bound() {
            return Err(ODataError::bound(format!("{value} is already owned")));
        }
        if self.is_null() {
            self.set_defaults()?;
        }
        self.ensure_property_cache()?;
        {
            let cell = self.cell();
            if let Some(cache) = cell.structured().and_then(|b| b.cache.as_ref()) {
                if cache.contains_key(name) {
                    return Err(ODataError::duplicate_name(name));
                }
            }
        }
        value.set_parent(self, name)?;
        if let Some(b) = self.cell_mut().structured_mut() {
            if let Some(cache) = &mut b.cache {
                cache.insert(name.to_string(), value.clone());
            }
        }
        self.touch();
        Ok(())
    }

    pub(crate) fn assign_structured(&self, other: &Value) -> Result<()> {
        if !other.is_structured() || !other.type_def().is_derived_from(&self.type_def()) {
            return Err(ODataError::model(format!(
                "cannot assign {other} to {self}"
            )));
        }
        if self.is_null() {
            self.set_defaults()?;
        }
        for name in self.property_names()? {
            let child = self.property(&name)?;
            if matches!(
                child.cell().body,
                ValueBody::EntitySet(_) | ValueBody::Singleton(_)
            ) {
                continue;
            }
            match other.try_property(&name)? {
                Some(source) => child.assign(&source)?,
                None if child.is_collection() => child.clear_items()?,
                None => child.set_value(ValueSeed::Null)?,
            }
        }
        self.touch();
        Ok(())
    }

    /// Push this value's changes to the service
    ///
    /// Bound entities are updated in place; bound complex values update
    /// their property.  Committing a transient value just marks the
    /// tree clean.
    pub fn commit(&self) -> Result<()> {
        self.require_structured()?;
        let Some(service) = self.service() else {
            self.rclean();
            return Ok(());
        };
        if self.is_entity() {
            log::debug!("updating {self}");
            run(service.update_entity(self))?;
        } else {
            log::debug!("updating property {self}");
            run(service.update_property(self))?;
        }
        self.rclean();
        Ok(())
    }
}

fn navigation_value(np: &NavigationProperty) -> Value {
    if np.collection {
        Value::new(&TypeDef::entity_set_of(&np.entity_type))
    } else if np.contains_target {
        Value::new(&np.entity_type)
    } else {
        Value::new(&TypeDef::singleton_of(&np.entity_type))
    }
}

/// Extract a pure type-cast rule from derived sub-options
///
/// A rule like `Schema.Type` narrows the property's value type rather
/// than selecting anything; it is replaced with a wildcard and returned
/// so the child value can be cast.
fn take_implied_cast(options: &SharedExpandOptions) -> Option<QualifiedName> {
    let found = {
        let o = options.borrow();
        o.select_items().iter().find_map(|item| match item {
            SelectItem::Path(path) if path.len() == 1 => match &path[0] {
                PathSegment::Qualified(q) => Some(q.clone()),
                _ => None,
            },
            _ => None,
        })
    };
    if let Some(q) = &found {
        let mut o = options.borrow_mut();
        let _ = o.remove_select_path(&q.to_string());
        o.add_select_item(SelectItem::Wildcard);
    }
    found
}

/// Infer select rules from an object's shape
///
/// Every key must name a declared structural property.  An empty
/// result means the object is a tight fit for the default selection.
fn subselect(ctype: &TypeRef, map: &IndexMap<String, ValueSeed>) -> Result<Vec<Vec<String>>> {
    if map.is_empty() {
        return Err(ODataError::model(
            "cannot infer a selection from an empty object",
        ));
    }
    let mut unused: HashSet<&str> = map.keys().map(String::as_str).collect();
    let mut rules: Vec<Vec<String>> = Vec::new();
    let mut complete = true;
    for property in ctype.properties() {
        let PropertyDef::Structural(p) = property else {
            continue;
        };
        let Some(seed) = map.get(&p.name) else {
            complete = false;
            continue;
        };
        unused.remove(p.name.as_str());
        if p.type_ref.is_complex() {
            let sub = if p.collection {
                match seed {
                    ValueSeed::List(items) => subselect_intersect(&p.type_ref, items)?,
                    _ => {
                        return Err(ODataError::model(format!(
                            "expected a list for {}",
                            p.name
                        )));
                    }
                }
            } else {
                match seed {
                    ValueSeed::Map(m) => subselect(&p.type_ref, m)?,
                    ValueSeed::Null => Vec::new(),
                    _ => {
                        return Err(ODataError::model(format!(
                            "expected an object for {}",
                            p.name
                        )));
                    }
                }
            };
            if sub.is_empty() {
                rules.push(vec![p.name.clone()]);
            } else {
                complete = false;
                for mut rule in sub {
                    rule.insert(0, p.name.clone());
                    rules.push(rule);
                }
            }
        } else {
            rules.push(vec![p.name.clone()]);
        }
    }
    if !unused.is_empty() {
        let mut names: Vec<&str> = unused.into_iter().collect();
        names.sort_unstable();
        return Err(ODataError::model(format!(
            "unknown properties in selection: {}",
            names.join(", ")
        )));
    }
    if complete {
        Ok(Vec::new())
    } else {
        Ok(rules)
    }
}

/// Select rules common to every item of a complex collection
///
/// All non-null items must imply the same rules; anything else cannot
/// be expressed as a single selection.
fn subselect_intersect(item_type: &TypeRef, items: &[ValueSeed]) -> Result<Vec<Vec<String>>> {
    let mut agreed: Option<Vec<Vec<String>>> = None;
    for seed in items {
        let rules = match seed {
            ValueSeed::Null => continue,
            ValueSeed::Map(m) => {
                let mut rules = subselect(item_type, m)?;
                rules.sort();
                rules
            }
            _ => {
                return Err(ODataError::model(
                    "expected objects in a complex collection",
                ));
            }
        };
        match &agreed {
            None => agreed = Some(rules),
            Some(prev) if *prev == rules => {}
            Some(_) => {
                return Err(ODataError::model(
                    "incompatible selections in collection value",
                ));
            }
        }
    }
    Ok(agreed.unwrap_or_default())
}
