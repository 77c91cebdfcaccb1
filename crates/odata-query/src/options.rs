//! Option sets
//!
//! [`EntityOptions`] holds select/expand rules and the memoized
//! per-property lookups derived from them.  [`CollectionOptions`] adds
//! the collection-shaping options, [`ExpandOptions`] adds `$levels`
//! and [`SystemQueryOptions`] the client-level extras.  The extension
//! structs deref to their base so the rule API is available at every
//! level.
//!
//! Every mutation of the rule lists invalidates the memo caches;
//! lookups take `&self` and memoize through interior mutability.

use crate::{ExpandItem, NavMatch, PropertyName, SelectItem, SelectMatch, trim_expand_path};
use odata_ast::Expression;
use odata_diagnostics::Result;
use odata_names::{PathQualifier, QualifiedName, path_from_str};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// Shared handle to an options set
///
/// Sibling values bound to the same collection or entity set share one
/// options instance; owners fork before mutating.
pub type SharedExpandOptions = Rc<RefCell<ExpandOptions>>;

type CacheKey = (Option<QualifiedName>, String);

/// An expanded navigation property: the matching rule plus the type
/// cast and path qualifier it carries
pub type ExpandedMatch = (ExpandItem, Option<QualifiedName>, Option<PathQualifier>);

/// Select and expand rules with memoized property lookups
#[derive(Debug)]
pub struct EntityOptions {
    select: Vec<SelectItem>,
    expand: Vec<ExpandItem>,
    /// Whether structural properties are selected in the absence of
    /// select rules; true for entities, false for derived complex
    /// sub-options
    select_default: bool,
    selected_cache: RefCell<HashMap<CacheKey, bool>>,
    complex_cache: RefCell<HashMap<CacheKey, Option<SharedExpandOptions>>>,
    nav_cache: RefCell<HashMap<CacheKey, Option<ExpandedMatch>>>,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityOptions {
    pub fn new() -> Self {
        Self {
            select: Vec::new(),
            expand: Vec::new(),
            select_default: true,
            selected_cache: RefCell::new(HashMap::new()),
            complex_cache: RefCell::new(HashMap::new()),
            nav_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn select_items(&self) -> &[SelectItem] {
        &self.select
    }

    pub fn expand_items(&self) -> &[ExpandItem] {
        &self.expand
    }

    pub fn select_default(&self) -> bool {
        self.select_default
    }

    pub fn set_select_default(&mut self, select_default: bool) {
        self.select_default = select_default;
    }

    /// True when no select or expand rules are in effect
    pub fn is_default(&self) -> bool {
        self.select.is_empty() && self.expand.is_empty()
    }

    fn clear_caches(&mut self) {
        self.selected_cache.get_mut().clear();
        self.complex_cache.get_mut().clear();
        self.nav_cache.get_mut().clear();
    }

    /// Parse and add a select rule
    pub fn add_select_path(&mut self, path: &str) -> Result<()> {
        self.add_select_item(path.parse()?);
        Ok(())
    }

    /// Add a select rule; duplicates are ignored
    pub fn add_select_item(&mut self, item: SelectItem) {
        if self.select.contains(&item) {
            return;
        }
        self.clear_caches();
        self.select.push(item);
    }

    /// Remove a select rule; the path must match exactly, including
    /// any type cast
    pub fn remove_select_path(&mut self, path: &str) -> Result<()> {
        let item: SelectItem = path.parse()?;
        self.clear_caches();
        self.select.retain(|rule| rule != &item);
        Ok(())
    }

    pub fn clear_select(&mut self) {
        self.clear_caches();
        self.select.clear();
    }

    /// Parse and add an expand rule, replacing any rule with the same
    /// trimmed path
    pub fn add_expand_path(&mut self, path: &str) -> Result<()> {
        self.add_expand_item(path.parse()?);
        Ok(())
    }

    /// Add an expand rule
    ///
    /// Qualifiers and trailing type casts are ignored for uniqueness:
    /// `Friends/Schema.TypeX`, `Friends` and `Friends/$count` replace
    /// one another.
    pub fn add_expand_item(&mut self, item: ExpandItem) {
        self.clear_caches();
        let trimmed = item.trimmed_path().to_vec();
        self.expand.retain(|rule| rule.trimmed_path() != trimmed);
        self.expand.push(item);
    }

    /// Remove an expand rule by path, ignoring qualifiers and trailing
    /// casts
    pub fn remove_expand_path(&mut self, path: &str) -> Result<()> {
        let path = path_from_str(path)?;
        let trimmed = trim_expand_path(&path).to_vec();
        self.clear_caches();
        self.expand.retain(|rule| rule.trimmed_path() != trimmed);
        Ok(())
    }

    /// The current rule for a bare navigation path, if any
    pub fn get_expand_item(&self, path: &str) -> Result<Option<ExpandItem>> {
        let path = path_from_str(path)?;
        Ok(self
            .expand
            .iter()
            .find(|rule| rule.trimmed_path() == path.as_slice())
            .cloned())
    }

    pub fn clear_expand(&mut self) {
        self.clear_caches();
        self.expand.clear();
    }

    /// Whether a simple structural property or operation is selected
    ///
    /// With no select rules in effect the select default applies.
    pub fn selected(
        &self,
        type_cast: Option<&QualifiedName>,
        name: PropertyName<'_>,
    ) -> Result<bool> {
        if self.select.is_empty() {
            return Ok(self.select_default);
        }
        let key = (type_cast.cloned(), property_key(name));
        if let Some(hit) = self.selected_cache.borrow().get(&key) {
            return Ok(*hit);
        }
        let mut result = false;
        for rule in &self.select {
            if rule.match_simple(type_cast, name, false)?.is_match() {
                result = true;
                break;
            }
        }
        self.selected_cache.borrow_mut().insert(key, result);
        Ok(result)
    }

    /// Whether a navigation property is selected (for inclusion as a
    /// reference)
    ///
    /// Navigation properties are never selected by default.
    pub fn nav_selected(&self, type_cast: Option<&QualifiedName>, name: &str) -> Result<bool> {
        if self.select.is_empty() {
            return Ok(false);
        }
        let key = (type_cast.cloned(), name.to_string());
        if let Some(hit) = self.selected_cache.borrow().get(&key) {
            return Ok(*hit);
        }
        let mut result = false;
        for rule in &self.select {
            if rule
                .match_simple(type_cast, PropertyName::Simple(name), true)?
                .is_match()
            {
                result = true;
                break;
            }
        }
        self.selected_cache.borrow_mut().insert(key, result);
        Ok(result)
    }

    /// Derives the options that apply inside a complex property
    ///
    /// Factors the property name out of the select and expand rules.
    /// A rule `Complex/Rating` contributes the select rule `Rating`; a
    /// whole-property selection contributes `*`.  Expand rules that
    /// traverse the property propagate as expand rules even when no
    /// select rule matches.  Returns `None` when the property is not
    /// visible at all.  Structural selection inside the derived
    /// options defaults to off: complex values have no address of
    /// their own.
    ///
    /// Results are memoized; repeated calls return the same shared
    /// instance.
    pub fn complex_selected(
        &self,
        type_cast: Option<&QualifiedName>,
        name: &str,
    ) -> Result<Option<SharedExpandOptions>> {
        let key = (type_cast.cloned(), name.to_string());
        if let Some(hit) = self.complex_cache.borrow().get(&key) {
            return Ok(hit.clone());
        }
        let mut options = ExpandOptions::new();
        options.set_select_default(false);
        let mut selected = false;
        if self.select.is_empty() {
            selected = self.select_default;
            if selected {
                options.add_select_item(SelectItem::Wildcard);
            }
        } else {
            for rule in &self.select {
                match rule.match_complex(type_cast, name)? {
                    SelectMatch::NoMatch => {}
                    SelectMatch::Full => {
                        selected = true;
                        options.add_select_item(SelectItem::Wildcard);
                    }
                    SelectMatch::Partial(item) => {
                        selected = true;
                        options.add_select_item(item);
                    }
                }
            }
        }
        // expand rules can make the property visible even when it is
        // not selected
        for rule in &self.expand {
            if let Some(item) = rule.match_complex(type_cast, name)? {
                options.add_expand_item(item);
            }
        }
        let result = if !selected && options.expand_items().is_empty() {
            None
        } else {
            Some(Rc::new(RefCell::new(options)))
        };
        self.complex_cache.borrow_mut().insert(key, result.clone());
        Ok(result)
    }

    /// The expand rule applying to a navigation property, if any
    ///
    /// A named match takes precedence over a wildcard match.
    pub fn expanded(
        &self,
        type_cast: Option<&QualifiedName>,
        name: &str,
    ) -> Result<Option<ExpandedMatch>> {
        if self.expand.is_empty() {
            return Ok(None);
        }
        let key = (type_cast.cloned(), name.to_string());
        if let Some(hit) = self.nav_cache.borrow().get(&key) {
            return Ok(hit.clone());
        }
        let mut result = None;
        for rule in &self.expand {
            let (m, cast, qualifier) = rule.match_navigation(type_cast, name)?;
            match m {
                NavMatch::None => {}
                NavMatch::Wildcard => result = Some((rule.clone(), cast, qualifier)),
                NavMatch::Named => {
                    result = Some((rule.clone(), cast, qualifier));
                    break;
                }
            }
        }
        self.nav_cache.borrow_mut().insert(key, result.clone());
        Ok(result)
    }

    fn format_items(&self, out: &mut Vec<String>) {
        if !self.select.is_empty() {
            let items: Vec<String> = self.select.iter().map(ToString::to_string).collect();
            out.push(format!("$select={}", items.join(",")));
        }
        if !self.expand.is_empty() {
            let items: Vec<String> = self.expand.iter().map(ToString::to_string).collect();
            out.push(format!("$expand={}", items.join(",")));
        }
    }
}

impl Clone for EntityOptions {
    /// Forks the rules; expand rules are deep-cloned so the fork owns
    /// its nested options.  Memo caches are not copied.
    fn clone(&self) -> Self {
        Self {
            select: self.select.clone(),
            expand: self.expand.iter().map(ExpandItem::deep_clone).collect(),
            select_default: self.select_default,
            selected_cache: RefCell::new(HashMap::new()),
            complex_cache: RefCell::new(HashMap::new()),
            nav_cache: RefCell::new(HashMap::new()),
        }
    }
}

impl fmt::Display for EntityOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.format_items(&mut out);
        write!(f, "{}", out.join(";"))
    }
}

fn property_key(name: PropertyName<'_>) -> String {
    match name {
        PropertyName::Simple(s) => s.to_string(),
        PropertyName::Operation(q) => q.to_string(),
    }
}

/// One `$orderby` item: an expression with a direction
#[derive(Debug, Clone)]
pub struct OrderbyItem {
    pub expr: Expression,
    pub descending: bool,
}

impl OrderbyItem {
    pub fn asc(expr: Expression) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    pub fn desc(expr: Expression) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

impl fmt::Display for OrderbyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.descending {
            write!(f, " desc")?;
        }
        Ok(())
    }
}

/// Query options applicable to collections
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    entity: EntityOptions,
    skip: Option<u64>,
    top: Option<u64>,
    count: Option<bool>,
    filter: Option<Expression>,
    search: Option<Expression>,
    orderby: Vec<OrderbyItem>,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionOptions {
    pub fn new() -> Self {
        Self {
            entity: EntityOptions::new(),
            skip: None,
            top: None,
            count: None,
            filter: None,
            search: None,
            orderby: Vec::new(),
        }
    }

    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn set_skip(&mut self, skip: Option<u64>) {
        self.skip = skip;
    }

    pub fn top(&self) -> Option<u64> {
        self.top
    }

    pub fn set_top(&mut self, top: Option<u64>) {
        self.top = top;
    }

    pub fn count(&self) -> Option<bool> {
        self.count
    }

    pub fn set_count(&mut self, count: Option<bool>) {
        self.count = count;
    }

    pub fn filter(&self) -> Option<&Expression> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<Expression>) {
        self.filter = filter;
    }

    pub fn search(&self) -> Option<&Expression> {
        self.search.as_ref()
    }

    pub fn set_search(&mut self, search: Option<Expression>) {
        self.search = search;
    }

    pub fn orderby(&self) -> &[OrderbyItem] {
        &self.orderby
    }

    pub fn set_orderby(&mut self, orderby: Vec<OrderbyItem>) {
        self.orderby = orderby;
    }

    pub fn is_default(&self) -> bool {
        self.entity.is_default()
            && self.skip.is_none()
            && self.top.is_none()
            && self.count != Some(true)
            && self.filter.is_none()
            && self.search.is_none()
            && self.orderby.is_empty()
    }

    fn format_items(&self, out: &mut Vec<String>) {
        if let Some(skip) = self.skip {
            out.push(format!("$skip={skip}"));
        }
        if let Some(top) = self.top {
            out.push(format!("$top={top}"));
        }
        if self.count == Some(true) {
            out.push("$count=true".to_string());
        }
        if let Some(filter) = &self.filter {
            out.push(format!("$filter={filter}"));
        }
        if let Some(search) = &self.search {
            out.push(format!("$search={search}"));
        }
        if !self.orderby.is_empty() {
            let items: Vec<String> = self.orderby.iter().map(ToString::to_string).collect();
            out.push(format!("$orderby={}", items.join(",")));
        }
        self.entity.format_items(out);
    }

    /// One string per option in effect, `$option=value` form
    pub fn to_str_list(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.format_items(&mut out);
        out
    }
}

impl Deref for CollectionOptions {
    type Target = EntityOptions;

    fn deref(&self) -> &EntityOptions {
        &self.entity
    }
}

impl DerefMut for CollectionOptions {
    fn deref_mut(&mut self) -> &mut EntityOptions {
        &mut self.entity
    }
}

impl fmt::Display for CollectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str_list().join(";"))
    }
}

/// Query options applicable inside an `$expand`
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    collection: CollectionOptions,
    /// `$levels`; negative means `max`
    levels: Option<i64>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpandOptions {
    pub fn new() -> Self {
        Self {
            collection: CollectionOptions::new(),
            levels: None,
        }
    }

    pub fn levels(&self) -> Option<i64> {
        self.levels
    }

    /// Set `$levels`; values below −1 are clamped to −1 (max)
    pub fn set_levels(&mut self, levels: Option<i64>) {
        self.levels = levels.map(|l| l.max(-1));
    }

    pub fn is_default(&self) -> bool {
        self.collection.is_default() && self.levels.is_none()
    }

    /// One string per option in effect, `$option=value` form
    pub fn to_str_list(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collection.format_items(&mut out);
        if let Some(levels) = self.levels {
            if levels < 0 {
                out.push("$levels=max".to_string());
            } else {
                out.push(format!("$levels={levels}"));
            }
        }
        out
    }

    /// Wrap a fork of these options in a fresh shared handle
    pub fn into_shared(self) -> SharedExpandOptions {
        Rc::new(RefCell::new(self))
    }
}

impl Deref for ExpandOptions {
    type Target = CollectionOptions;

    fn deref(&self) -> &CollectionOptions {
        &self.collection
    }
}

impl DerefMut for ExpandOptions {
    fn deref_mut(&mut self) -> &mut CollectionOptions {
        &mut self.collection
    }
}

impl fmt::Display for ExpandOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str_list().join(";"))
    }
}

/// All system query options, including the client-level extras that
/// never nest inside an `$expand`
#[derive(Debug, Clone)]
pub struct SystemQueryOptions {
    collection: CollectionOptions,
    id: Option<String>,
    format: Option<String>,
    skiptoken: Option<String>,
}

impl Default for SystemQueryOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemQueryOptions {
    pub fn new() -> Self {
        Self {
            collection: CollectionOptions::new(),
            id: None,
            format: None,
            skiptoken: None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn set_format(&mut self, format: Option<String>) {
        self.format = format;
    }

    pub fn skiptoken(&self) -> Option<&str> {
        self.skiptoken.as_deref()
    }

    pub fn set_skiptoken(&mut self, skiptoken: Option<String>) {
        self.skiptoken = skiptoken;
    }
}

impl Deref for SystemQueryOptions {
    type Target = CollectionOptions;

    fn deref(&self) -> &CollectionOptions {
        &self.collection
    }
}

impl DerefMut for SystemQueryOptions {
    fn deref_mut(&mut self) -> &mut CollectionOptions {
        &mut self.collection
    }
}
