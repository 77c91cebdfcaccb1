//! Entity keys
//!
//! An entity key is a hashable scalar (or tuple of named scalars for
//! composite keys) extracted from the key properties of an entity.
//! Keys index entity-set caches and render into key predicates and
//! `$filter` expressions.

use crate::{PrimitiveKind, PropertyDef, TypeRef};
use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use odata_ast::{BinaryOp, Expression, Literal, MemberSegment};
use odata_diagnostics::{ODataError, Result};
use rust_decimal::Decimal;
use std::fmt;

/// A single key property value
///
/// Only the hashable primitive types usable in keys are represented;
/// in particular there is no floating point variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScalar {
    Boolean(bool),
    Int64(i64),
    Decimal(Decimal),
    String(String),
    Guid(String),
    Date(NaiveDate),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl KeyScalar {
    /// The literal form of this scalar
    pub fn to_literal(&self) -> Literal {
        match self {
            Self::Boolean(b) => Literal::Boolean(*b),
            Self::Int64(i) => Literal::Int64(*i),
            Self::Decimal(d) => Literal::Decimal(*d),
            Self::String(s) => Literal::String(s.clone()),
            Self::Guid(g) => Literal::Guid(g.clone()),
            Self::Date(d) => Literal::Date(*d),
            Self::DateTimeOffset(dt) => Literal::DateTimeOffset(*dt),
        }
    }

    /// True if this scalar is acceptable for a key property of the
    /// given primitive kind
    pub fn matches_kind(&self, kind: PrimitiveKind) -> bool {
        match self {
            Self::Boolean(_) => kind == PrimitiveKind::Boolean,
            Self::Int64(_) => kind.is_integral(),
            Self::Decimal(_) => kind == PrimitiveKind::Decimal,
            Self::String(_) => kind == PrimitiveKind::String,
            Self::Guid(_) => kind == PrimitiveKind::Guid,
            Self::Date(_) => kind == PrimitiveKind::Date,
            Self::DateTimeOffset(_) => kind == PrimitiveKind::DateTimeOffset,
        }
    }
}

impl fmt::Display for KeyScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_literal())
    }
}

impl From<bool> for KeyScalar {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for KeyScalar {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<i32> for KeyScalar {
    fn from(i: i32) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<&str> for KeyScalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for KeyScalar {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl TryFrom<Literal> for KeyScalar {
    type Error = ODataError;

    fn try_from(lit: Literal) -> Result<Self> {
        match lit {
            Literal::Boolean(b) => Ok(Self::Boolean(b)),
            Literal::Int64(i) => Ok(Self::Int64(i)),
            Literal::Decimal(d) => Ok(Self::Decimal(d)),
            Literal::String(s) => Ok(Self::String(s)),
            Literal::Guid(g) => Ok(Self::Guid(g)),
            Literal::Date(d) => Ok(Self::Date(d)),
            Literal::DateTimeOffset(dt) => Ok(Self::DateTimeOffset(dt)),
            other => Err(ODataError::model(format!(
                "literal is not a valid key value: {other}"
            ))),
        }
    }
}

/// The key of one entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// Single-property key
    Single(KeyScalar),
    /// Composite key: alias/value pairs in key declaration order
    Composite(Vec<(String, KeyScalar)>),
}

impl EntityKey {
    /// The text of a key predicate, without the surrounding parens
    pub fn to_predicate(&self) -> String {
        match self {
            Self::Single(scalar) => scalar.to_string(),
            Self::Composite(pairs) => {
                let mut out = String::new();
                for (i, (alias, scalar)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(alias);
                    out.push('=');
                    out.push_str(&scalar.to_string());
                }
                out
            }
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_predicate())
    }
}

/// Resolves each key property of an entity type to its primitive type
///
/// Returns alias to type, in key declaration order, resolving aliased
/// key paths through complex properties.
pub fn key_type_map(entity: &TypeRef) -> Result<IndexMap<String, TypeRef>> {
    let mut result = IndexMap::new();
    for kp in entity.key()? {
        let mut current = entity.clone();
        let mut resolved: Option<TypeRef> = None;
        for (i, name) in kp.path.iter().enumerate() {
            match current.property(name) {
                Some(PropertyDef::Structural(p)) if p.type_ref.is_complex() => {
                    current = p.type_ref.clone();
                }
                Some(PropertyDef::Structural(p)) if i + 1 == kp.path.len() => {
                    resolved = Some(p.type_ref.clone());
                }
                _ => {
                    return Err(ODataError::model(format!(
                        "bad key property path: {}",
                        kp.path.join("/")
                    )));
                }
            }
        }
        let type_ref = resolved.ok_or_else(|| {
            ODataError::model(format!("key property {} ends at a complex type", kp.alias))
        })?;
        if result.insert(kp.alias.clone(), type_ref).is_some() {
            return Err(ODataError::duplicate_name(kp.alias.clone()));
        }
    }
    Ok(result)
}

/// Assembles an [`EntityKey`] from named scalar values
///
/// Values are matched to the entity's key properties by alias; a
/// missing value is an error.  Extra values are ignored.
pub fn key_from_map(
    entity: &TypeRef,
    values: &IndexMap<String, KeyScalar>,
) -> Result<EntityKey> {
    let key = entity.key()?;
    if key.len() == 1 {
        let scalar = values.get(&key[0].alias).ok_or(ODataError::MissingKey)?;
        return Ok(EntityKey::Single(scalar.clone()));
    }
    let mut pairs = Vec::with_capacity(key.len());
    for kp in key {
        let scalar = values.get(&kp.alias).ok_or(ODataError::MissingKey)?;
        pairs.push((kp.alias.clone(), scalar.clone()));
    }
    Ok(EntityKey::Composite(pairs))
}

/// Builds the `$filter` expression selecting one entity by key
///
/// Each key property contributes a `path eq value` comparison; the
/// comparisons are joined with `and`.
pub fn key_expression(entity: &TypeRef, key: &EntityKey) -> Result<Expression> {
    let key_props = entity.key()?;
    let mut comparisons: Vec<Expression> = Vec::with_capacity(key_props.len());
    match key {
        EntityKey::Single(scalar) => {
            let kp = key_props
                .first()
                .filter(|_| key_props.len() == 1)
                .ok_or(ODataError::MissingKey)?;
            comparisons.push(key_comparison(kp.path.as_slice(), scalar));
        }
        EntityKey::Composite(pairs) => {
            for kp in key_props {
                let scalar = pairs
                    .iter()
                    .find(|(alias, _)| alias == &kp.alias)
                    .map(|(_, s)| s)
                    .ok_or(ODataError::MissingKey)?;
                comparisons.push(key_comparison(kp.path.as_slice(), scalar));
            }
        }
    }
    let mut iter = comparisons.into_iter();
    let first = iter.next().ok_or(ODataError::MissingKey)?;
    Ok(iter.fold(first, |acc, next| acc.binary(BinaryOp::And, next)))
}

fn key_comparison(path: &[String], scalar: &KeyScalar) -> Expression {
    let segments = path
        .iter()
        .map(|name| MemberSegment::Identifier(name.clone()))
        .collect();
    Expression::Member(segments).binary(BinaryOp::Eq, Expression::Literal(scalar.to_literal()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyProperty, TypeDef, edm};
    use pretty_assertions::assert_eq;

    fn product_type() -> TypeRef {
        TypeDef::entity("Schema.Product".parse().unwrap())
            .key_property("ID", &edm().int32)
            .property("Name", &edm().string)
            .build()
            .unwrap()
    }

    fn order_line_type() -> TypeRef {
        TypeDef::entity("Schema.OrderLine".parse().unwrap())
            .required_property("OrderID", &edm().int32)
            .required_property("LineNo", &edm().int32)
            .key(vec![
                KeyProperty::new("OrderID"),
                KeyProperty::new("LineNo"),
            ])
            .build()
            .unwrap()
    }

    #[test]
    fn single_key_predicate() {
        let key = EntityKey::Single(KeyScalar::from("kristakemp"));
        assert_eq!(key.to_predicate(), "'kristakemp'");
        let key = EntityKey::Single(KeyScalar::from(42i64));
        assert_eq!(key.to_predicate(), "42");
    }

    #[test]
    fn composite_key_predicate() {
        let key = EntityKey::Composite(vec![
            ("OrderID".to_string(), KeyScalar::from(5i64)),
            ("LineNo".to_string(), KeyScalar::from(2i64)),
        ]);
        assert_eq!(key.to_predicate(), "OrderID=5,LineNo=2");
    }

    #[test]
    fn key_type_map_resolves_aliases() {
        let product = product_type();
        let map = key_type_map(&product).unwrap();
        assert_eq!(map.len(), 1);
        assert!(std::sync::Arc::ptr_eq(&map["ID"], &edm().int32));
    }

    #[test]
    fn key_from_map_requires_every_alias() {
        let line = order_line_type();
        let mut values = IndexMap::new();
        values.insert("OrderID".to_string(), KeyScalar::from(5i64));
        assert!(matches!(
            key_from_map(&line, &values),
            Err(ODataError::MissingKey)
        ));
        values.insert("LineNo".to_string(), KeyScalar::from(2i64));
        let key = key_from_map(&line, &values).unwrap();
        assert_eq!(key.to_predicate(), "OrderID=5,LineNo=2");
    }

    #[test]
    fn key_expression_joins_with_and() {
        let line = order_line_type();
        let key = EntityKey::Composite(vec![
            ("OrderID".to_string(), KeyScalar::from(5i64)),
            ("LineNo".to_string(), KeyScalar::from(2i64)),
        ]);
        let expr = key_expression(&line, &key).unwrap();
        assert_eq!(expr.to_string(), "OrderID eq 5 and LineNo eq 2");
    }

    #[test]
    fn key_expression_single() {
        let product = product_type();
        let key = EntityKey::Single(KeyScalar::from(42i64));
        let expr = key_expression(&product, &key).unwrap();
        assert_eq!(expr.to_string(), "ID eq 42");
    }

    #[test]
    fn literal_conversion_rejects_non_key_literals() {
        assert!(KeyScalar::try_from(Literal::Null).is_err());
        assert!(KeyScalar::try_from(Literal::Double(1.5)).is_err());
    }
}
