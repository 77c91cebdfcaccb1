//! Query options on composite values
//!
//! Composite values carry a shared options handle.  Values created as
//! items of a container inherit the container's handle; the first
//! mutation through a value forks the options so siblings are not
//! affected.  Option paths are resolved against the value's applicable
//! entity type and descend through nested expand rules, so a path like
//! `Friends/Trips/Name` edits the options three levels down.

use crate::value::{Value, ValueBody};
use odata_ast::Expression;
use odata_diagnostics::{ODataError, Result};
use odata_names::{Path, PathQualifier, QualifiedName, path_from_str, path_to_str};
use odata_query::{ExpandOptions, OrderbyItem, SharedExpandOptions};
use odata_types::{TypeRef, split_path};
use std::rc::Rc;

impl Value {
    /// The options handle currently in effect, if any
    pub fn options(&self) -> Option<SharedExpandOptions> {
        self.cell().composite().and_then(|c| c.options.clone())
    }

    /// Share an owner's options handle with this value
    ///
    /// The handle stays marked inherited until a mutation forks it; an
    /// inherited handle may be replaced by a later inherit, a forked
    /// one may not.  `type_cast` narrows the value to the type named by
    /// the expand rule that produced it.
    pub(crate) fn inherit_options(
        &self,
        options: &SharedExpandOptions,
        type_cast: Option<&QualifiedName>,
    ) -> Result<()> {
        {
            let mut cell = self.cell_mut();
            let composite = cell
                .composite_mut()
                .ok_or_else(|| ODataError::model("value does not carry query options"))?;
            if composite.options.is_some() && !composite.inherited {
                return Err(ODataError::model("options are already owned"));
            }
            composite.options = Some(Rc::clone(options));
            composite.inherited = true;
        }
        self.clear_cache()?;
        if let Some(qname) = type_cast {
            let service = self
                .service()
                .ok_or_else(|| ODataError::path("type cast requires a bound value"))?;
            let target = service.model().qualified_type(qname)?;
            self.type_cast_for_load(&target)?;
        }
        Ok(())
    }

    /// The owned options handle, forking an inherited one first
    pub(crate) fn fork_options(&self) -> Result<SharedExpandOptions> {
        {
            let mut cell = self.cell_mut();
            if let Some(composite) = cell.composite_mut() {
                let fork = match &composite.options {
                    Some(options) if !composite.inherited => return Ok(Rc::clone(options)),
                    Some(options) => options.borrow().clone().into_shared(),
                    None => ExpandOptions::new().into_shared(),
                };
                composite.options = Some(Rc::clone(&fork));
                composite.inherited = false;
                return Ok(fork);
            }
        }
        Err(ODataError::model(format!(
            "{self} does not carry query options"
        )))
    }

    /// The entity (or complex) type option paths resolve against
    fn applicable_type(&self) -> Result<TypeRef> {
        let cell = self.cell();
        match &cell.body {
            ValueBody::Complex(_) | ValueBody::Entity(_) => Ok(cell.type_def.clone()),
            ValueBody::Collection(b) => Ok(b.item_type.clone()),
            ValueBody::EntitySet(b) => Ok(b.item_type.clone()),
            ValueBody::Singleton(b) => Ok(b.item_type.clone()),
            ValueBody::Primitive(_) | ValueBody::Enumeration(_) => Err(ODataError::model(
                format!("{self} does not carry query options"),
            )),
        }
    }

    fn split_option_path(&self, path: &str, navigation: bool) -> Result<Vec<Path>> {
        let parsed = path_from_str(path)?;
        let applicable = self.applicable_type()?;
        let service = self.service();
        let model = service.as_deref().map(|s| s.model());
        split_path(&applicable, &parsed, model, navigation)
    }

    /// Walk nested expand rules down a split path
    ///
    /// Each part addresses one navigation step; with `create` set,
    /// missing rules are added along the way.  The walk starts from the
    /// forked (owned) root options so mutations through the result
    /// never leak into siblings.
    fn descend_options(
        &self,
        parts: &[Path],
        create: bool,
    ) -> Result<Option<SharedExpandOptions>> {
        let mut current = self.fork_options()?;
        for part in parts {
            let key = path_to_str(part);
            let existing = current.borrow().get_expand_item(&key)?;
            let item = match existing {
                Some(item) => item,
                None if create => {
                    current.borrow_mut().add_expand_path(&key)?;
                    current
                        .borrow()
                        .get_expand_item(&key)?
                        .ok_or_else(|| ODataError::path(format!("cannot expand {key}")))?
                }
                None => return Ok(None),
            };
            let next = Rc::clone(&item.options);
            current = next;
        }
        Ok(Some(current))
    }

    fn resolve_xpath(&self, path: &str) -> Result<SharedExpandOptions> {
        let parts = self.split_option_path(path, true)?;
        self.descend_options(&parts, true)?
            .ok_or_else(|| ODataError::path(format!("cannot resolve {path}")))
    }

    /// The options a collection-shaping mutator applies to: either the
    /// navigation path given, or this value itself when it is a
    /// collection
    fn shaping_target(&self, xpath: Option<&str>) -> Result<SharedExpandOptions> {
        match xpath {
            Some(path) => self.resolve_xpath(path),
            None => {
                if !self.is_collection() {
                    return Err(ODataError::model(
                        "collection options require a collection value or a navigation path",
                    ));
                }
                self.fork_options()
            }
        }
    }

    /// Add a select rule for a structural property path
    ///
    /// The path may traverse navigation properties; the rule lands in
    /// the options of the deepest expand rule, which is created if
    /// missing.
    pub fn select(&self, path: &str) -> Result<()> {
        let applicable = self.applicable_type()?;
        if !applicable.is_entity() {
            return Err(ODataError::model(format!(
                "select applies to entity values, not {applicable}"
            )));
        }
        let mut parts = self.split_option_path(path, false)?;
        let leaf = parts
            .pop()
            .ok_or_else(|| ODataError::path("empty select path"))?;
        let target = self
            .descend_options(&parts, true)?
            .ok_or_else(|| ODataError::path(format!("cannot resolve {path}")))?;
        target.borrow_mut().add_select_path(&path_to_str(&leaf))?;
        self.clear_cache()
    }

    /// Add an expand rule for a navigation property path
    pub fn expand(&self, path: &str, qualifier: Option<PathQualifier>) -> Result<()> {
        let mut parts = self.split_option_path(path, true)?;
        let leaf = parts
            .pop()
            .ok_or_else(|| ODataError::path("empty expand path"))?;
        let target = self
            .descend_options(&parts, true)?
            .ok_or_else(|| ODataError::path(format!("cannot resolve {path}")))?;
        let leaf = match qualifier {
            Some(q) => format!("{}/{q}", path_to_str(&leaf)),
            None => path_to_str(&leaf),
        };
        target.borrow_mut().add_expand_path(&leaf)?;
        self.clear_cache()
    }

    /// Remove the expand rule for a navigation property path
    ///
    /// Collapsing a path that was never expanded is a no-op.
    pub fn collapse(&self, path: &str) -> Result<()> {
        let mut parts = self.split_option_path(path, true)?;
        let leaf = parts
            .pop()
            .ok_or_else(|| ODataError::path("empty expand path"))?;
        if let Some(target) = self.descend_options(&parts, false)? {
            target.borrow_mut().remove_expand_path(&path_to_str(&leaf))?;
        }
        self.clear_cache()
    }

    /// Restore default selection, dropping all select rules
    ///
    /// With `xpath` the rules inside that navigation path are dropped
    /// instead of this value's own.
    pub fn select_default(&self, xpath: Option<&str>) -> Result<()> {
        let target = match xpath {
            Some(path) => self.resolve_xpath(path)?,
            None => self.fork_options()?,
        };
        target.borrow_mut().clear_select();
        self.clear_cache()
    }

    /// Set (or clear) the `$filter` option
    pub fn set_filter(&self, filter: Option<Expression>, xpath: Option<&str>) -> Result<()> {
        let target = self.shaping_target(xpath)?;
        target.borrow_mut().set_filter(filter);
        self.clear_cache()
    }

    /// Set (or clear) the `$search` option
    pub fn set_search(&self, search: Option<Expression>, xpath: Option<&str>) -> Result<()> {
        let target = self.shaping_target(xpath)?;
        target.borrow_mut().set_search(search);
        self.clear_cache()
    }

    /// Set the `$orderby` option; an empty list clears it
    pub fn set_orderby(&self, orderby: Vec<OrderbyItem>, xpath: Option<&str>) -> Result<()> {
        let target = self.shaping_target(xpath)?;
        target.borrow_mut().set_orderby(orderby);
        self.clear_cache()
    }

    /// Set `$top` and `$skip` together; a zero skip clears `$skip`
    pub fn set_page(&self, top: Option<u64>, skip: u64, xpath: Option<&str>) -> Result<()> {
        let target = self.shaping_target(xpath)?;
        {
            let mut options = target.borrow_mut();
            options.set_top(top);
            options.set_skip(if skip == 0 { None } else { Some(skip) });
        }
        self.clear_cache()
    }

    /// The page size (`$top`) currently in effect
    pub fn get_page_size(&self) -> Option<u64> {
        self.options().and_then(|o| o.borrow().top())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_names::QualifiedName;
    use odata_types::{TypeDef, TypeRef, edm};
    use pretty_assertions::assert_eq;

    fn qn(s: &str) -> QualifiedName {
        s.parse().unwrap()
    }

    fn trip_type() -> TypeRef {
        TypeDef::entity(qn("Schema.Trip"))
            .key_property("TripId", &edm().int32)
            .property("Name", &edm().string)
            .property("Budget", &edm().single)
            .build()
            .unwrap()
    }

    fn person_type(trip: &TypeRef) -> TypeRef {
        TypeDef::entity(qn("Schema.Person"))
            .key_property("UserName", &edm().string)
            .property("FirstName", &edm().string)
            .property("LastName", &edm().string)
            .contained_navigation("Trips", trip, true)
            .build()
            .unwrap()
    }

    fn options_str(value: &Value) -> String {
        value.options().unwrap().borrow().to_str_list().join(";")
    }

    #[test]
    fn select_builds_rules_on_the_owned_options() {
        let person = person_type(&trip_type());
        let v = Value::new(&person);
        v.select("FirstName").unwrap();
        v.select("LastName").unwrap();
        assert_eq!(options_str(&v), "$select=FirstName,LastName");
    }

    #[test]
    fn select_through_navigation_nests_the_rule() {
        let person = person_type(&trip_type());
        let v = Value::new(&person);
        v.select("Trips/Name").unwrap();
        assert_eq!(options_str(&v), "$expand=Trips($select=Name)");
        // a second path reuses the created rule
        v.select("Trips/Budget").unwrap();
        assert_eq!(options_str(&v), "$expand=Trips($select=Name,Budget)");
    }

    #[test]
    fn select_rejects_unknown_properties() {
        let person = person_type(&trip_type());
        let v = Value::new(&person);
        assert!(v.select("MiddleName").is_err());
    }

    #[test]
    fn expand_and_collapse() {
        let person = person_type(&trip_type());
        let v = Value::new(&person);
        v.expand("Trips", None).unwrap();
        assert_eq!(options_str(&v), "$expand=Trips");
        v.collapse("Trips").unwrap();
        assert_eq!(options_str(&v), "");
        // collapsing again is harmless
        v.collapse("Trips").unwrap();
    }

    #[test]
    fn expand_with_a_qualifier() {
        let person = person_type(&trip_type());
        let v = Value::new(&person);
        v.expand("Trips", Some(PathQualifier::Count)).unwrap();
        assert_eq!(options_str(&v), "$expand=Trips/$count");
    }

    #[test]
    fn expand_requires_a_navigation_path() {
        let person = person_type(&trip_type());
        let v = Value::new(&person);
        assert!(v.expand("FirstName", None).is_err());
    }

    #[test]
    fn select_default_drops_nested_rules() {
        let person = person_type(&trip_type());
        let v = Value::new(&person);
        v.select("Trips/Name").unwrap();
        v.select_default(Some("Trips")).unwrap();
        assert_eq!(options_str(&v), "$expand=Trips");
    }

    #[test]
    fn page_options_on_a_collection() {
        let trips = TypeDef::collection_of(&trip_type());
        let v = Value::new(&trips);
        v.set_page(Some(5), 10, None).unwrap();
        assert_eq!(options_str(&v), "$skip=10;$top=5");
        assert_eq!(v.get_page_size(), Some(5));
        v.set_page(Some(5), 0, None).unwrap();
        assert_eq!(options_str(&v), "$top=5");
    }

    #[test]
    fn shaping_options_on_an_entity_need_a_path() {
        let person = person_type(&trip_type());
        let v = Value::new(&person);
        assert!(v.set_page(Some(5), 0, None).is_err());
        v.set_page(Some(5), 0, Some("Trips")).unwrap();
        assert_eq!(options_str(&v), "$expand=Trips($top=5)");
    }

    #[test]
    fn mutation_forks_inherited_options() {
        let person = person_type(&trip_type());
        let set_type = TypeDef::entity_set_of(&person);
        let set = Value::new(&set_type);
        set.select("FirstName").unwrap();
        let shared = set.options().unwrap();
        let item = set.new_item().unwrap();
        // the item starts on the container's handle
        assert!(Rc::ptr_eq(&item.options().unwrap(), &shared));
        item.select("LastName").unwrap();
        let forked = item.options().unwrap();
        assert!(!Rc::ptr_eq(&forked, &shared));
        assert_eq!(options_str(&set), "$select=FirstName");
        assert_eq!(options_str(&item), "$select=FirstName,LastName");
    }
}
