//! Expression evaluation over live values

use crate::logic::{Numeric, as_decimal, bool_and, bool_not, bool_or, compare, equal};
use crate::resolve::{edm_type, literal_type};
use crate::visitor::{ExpressionVisitor, walk};
use chrono::{Datelike, Timelike};
use indexmap::IndexMap;
use odata_ast::{BinaryOp, Expression, Literal, MemberSegment, Method, UnaryOp};
use odata_data::{DataService, Value, ValueSeed, open};
use odata_diagnostics::{ODataError, Result};
use odata_names::{Path, PathQualifier, PathSegment, QualifiedName};
use odata_types::{
    Annotation, EntityModel, KeyScalar, ModelElement, TypeDef, TypeKind, edm, key_from_map,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

/// Evaluates common expressions against a context value
///
/// The context value is `$it`; when it is bound to a service, names
/// that do not resolve as properties fall back to the container's
/// entity sets and singletons, which makes `$root`-style references in
/// filters work.  Evaluation is client side only: bound operations
/// resolve in the model but cannot be invoked.
pub struct Evaluator<'a> {
    it: Value,
    service: Option<Rc<dyn DataService>>,
    model: Option<&'a EntityModel>,
    variables: HashMap<String, Value>,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator with `context` as the implicit variable
    pub fn new(context: &Value) -> Self {
        Self {
            it: context.clone(),
            service: context.service(),
            model: None,
            variables: HashMap::new(),
        }
    }

    /// Use `service` for container roots and qualified-name lookup
    ///
    /// Unbound context values carry no service; this supplies one.
    pub fn with_service(mut self, service: &Rc<dyn DataService>) -> Self {
        self.service = Some(Rc::clone(service));
        self
    }

    /// Resolve qualified names against `model` ahead of the service
    pub fn with_model(mut self, model: &'a EntityModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Evaluate one expression tree to a value
    pub fn evaluate(&mut self, expr: &Expression) -> Result<Value> {
        walk(self, expr)
    }

    fn resolve_element(&self, qname: &QualifiedName) -> Option<ModelElement> {
        if qname.namespace == "Edm" {
            return edm_type(&qname.name).map(|t| ModelElement::Type(t.clone()));
        }
        if let Some(element) = self.model.and_then(|m| m.qualified_get(qname)) {
            return Some(element.clone());
        }
        let service = self.service.as_ref()?;
        service.model().qualified_get(qname).cloned()
    }

    fn literal_result(&self, lit: Literal) -> Result<Value> {
        match &lit {
            Literal::Null => Ok(Value::new(&edm().primitive_type)),
            Literal::Enum(e) => {
                let enum_type = match self.resolve_element(&e.qname) {
                    Some(ModelElement::Type(t)) => t,
                    _ => {
                        return Err(ODataError::model(format!(
                            "no such enumeration type: {}",
                            e.qname
                        )));
                    }
                };
                let value = Value::new(&enum_type);
                value.set_value(ValueSeed::Literal(lit.clone()))?;
                Ok(value)
            }
            _ => {
                let type_ref = literal_type(&lit)
                    .ok_or_else(|| ODataError::expression(format!("untypeable literal: {lit}")))?;
                let value = Value::new(type_ref);
                value.set_value(ValueSeed::Literal(lit))?;
                Ok(value)
            }
        }
    }

    fn container_root(&self, name: &str) -> Result<Option<Value>> {
        let Some(service) = &self.service else {
            return Ok(None);
        };
        let Some(container) = service.model().container().cloned() else {
            return Ok(None);
        };
        if container.entity_set(name).is_some() || container.singleton(name).is_some() {
            return open(service, name).map(Some);
        }
        Ok(None)
    }

    fn step(&mut self, current: Value, segment: &MemberSegment, first: bool) -> Result<Value> {
        match segment {
            MemberSegment::Identifier(name) => self.step_identifier(current, name, first),
            MemberSegment::Cast(qname) => self.step_cast(current, qname),
            MemberSegment::Term(term_ref) => current
                .get_annotation(term_ref)?
                .ok_or_else(|| ODataError::path(format!("no applied annotation {term_ref}"))),
            MemberSegment::Count => count_value(&current),
            MemberSegment::Args(args) => self.step_args(current, args),
            MemberSegment::Any { var, predicate } => {
                self.lambda(current, var.as_deref(), predicate.as_deref(), false)
            }
            MemberSegment::All { var, predicate } => {
                self.lambda(current, Some(var), Some(predicate), true)
            }
        }
    }

    fn step_identifier(&mut self, current: Value, name: &str, first: bool) -> Result<Value> {
        let current = deref_singleton(current)?;
        if current.is_structured() {
            if !current.is_null() {
                if let Some(value) = current.try_property(name)? {
                    return Ok(value);
                }
            }
            if first {
                if let Some(root) = self.container_root(name)? {
                    return Ok(root);
                }
            }
            Err(ODataError::path(format!(
                "no such property: {name} on {current}"
            )))
        } else if first {
            self.container_root(name)?
                .ok_or_else(|| ODataError::path(format!("no such property: {name}")))
        } else {
            Err(ODataError::expression(format!(
                "cannot traverse {name} from a {current}"
            )))
        }
    }

    fn step_cast(&mut self, current: Value, qname: &QualifiedName) -> Result<Value> {
        match self.resolve_element(qname) {
            Some(ModelElement::Type(target)) => Ok(current.cast(&target)),
            Some(ModelElement::Function(overloads)) => Err(ODataError::expression(format!(
                "bound operation {} cannot be evaluated client side",
                overloads.qname
            ))),
            Some(ModelElement::Term(_)) => Err(ODataError::expression(format!(
                "term {qname} must be addressed as @{qname}"
            ))),
            None => Err(ODataError::model(format!("no such type: {qname}"))),
        }
    }

    fn step_args(&mut self, current: Value, args: &[Expression]) -> Result<Value> {
        let item_type = current
            .item_type()
            .ok_or_else(|| ODataError::expression(format!("key predicate applied to a {current}")))?;
        let key = item_type.key()?;
        let mut values: IndexMap<String, KeyScalar> = IndexMap::new();
        for arg in args {
            let (alias, expr) = match arg {
                Expression::Bind { name, value } => (name.clone(), value.as_ref()),
                expr => {
                    // positional form: a single value for a single-
                    // property key
                    if key.len() != 1 || args.len() != 1 {
                        return Err(ODataError::expression(
                            "composite keys require named key values",
                        ));
                    }
                    (key[0].alias.clone(), expr)
                }
            };
            let value = walk(self, expr)?;
            let lit = value.get_value().ok_or(ODataError::MissingKey)?;
            values.insert(alias, KeyScalar::try_from(lit)?);
        }
        let entity_key = key_from_map(&item_type, &values)?;
        current.get(&entity_key)
    }

    fn lambda(
        &mut self,
        current: Value,
        var: Option<&str>,
        predicate: Option<&Expression>,
        all: bool,
    ) -> Result<Value> {
        let items = collection_items(&current)?;
        let (Some(var), Some(predicate)) = (var, predicate) else {
            // parameterless any(): non-emptiness
            return boolean_result(Some(!items.is_empty()));
        };
        let saved = self.variables.remove(var);
        let mut acc = Some(all);
        let mut failure = None;
        for item in items {
            self.variables.insert(var.to_string(), item);
            match walk(self, predicate).and_then(|v| boolean_operand(&v)) {
                Ok(p) => {
                    acc = if all { bool_and(acc, p) } else { bool_or(acc, p) };
                    if acc == Some(!all) {
                        break;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.variables.remove(var);
        if let Some(saved) = saved {
            self.variables.insert(var.to_string(), saved);
        }
        match failure {
            Some(e) => Err(e),
            None => boolean_result(acc),
        }
    }

    fn arithmetic(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
        let (l, r) = (primitive_operand(left)?, primitive_operand(right)?);
        let (Some(l), Some(r)) = (l, r) else {
            return Ok(Value::new(&edm().primitive_type));
        };
        let (Some(a), Some(b)) = (Numeric::from_literal(&l), Numeric::from_literal(&r)) else {
            return Err(ODataError::expression(format!(
                "cannot apply {} to {l} and {r}",
                op.keyword()
            )));
        };
        let literal = match (&a, &b) {
            (Numeric::Double(_), _) | (_, Numeric::Double(_)) => {
                Literal::Double(apply_double(op, a.as_double(), b.as_double())?)
            }
            (Numeric::Decimal(_), _) | (_, Numeric::Decimal(_)) => {
                Literal::Decimal(apply_decimal(op, as_decimal(&a), as_decimal(&b))?)
            }
            (Numeric::Int64(x), Numeric::Int64(y)) => Literal::Int64(apply_int64(op, *x, *y)?),
        };
        self.literal_result(literal)
    }
}

impl ExpressionVisitor for Evaluator<'_> {
    type Judgment = Value;

    fn literal(&mut self, lit: &Literal) -> Result<Value> {
        self.literal_result(lit.clone())
    }

    fn it(&mut self) -> Result<Value> {
        Ok(self.it.clone())
    }

    fn variable(&mut self, name: &str) -> Result<Value> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| ODataError::expression(format!("unknown variable: {name}")))
    }

    fn member(&mut self, segments: &[MemberSegment]) -> Result<Value> {
        let mut current = self.it.clone();
        let mut first = true;
        let mut iter = segments.iter();
        if let Some(MemberSegment::Identifier(name)) = segments.first() {
            // lambda variables shadow properties of the context
            if let Some(bound) = self.variables.get(name.as_str()) {
                current = bound.clone();
                first = false;
                iter.next();
            }
        }
        for segment in iter {
            current = self.step(current, segment, first)?;
            first = false;
        }
        Ok(current)
    }

    fn path_value(&mut self, path: &Path) -> Result<Value> {
        let mut current = self.it.clone();
        let mut first = true;
        for segment in path.iter() {
            current = match segment {
                PathSegment::Identifier(name) => self.step_identifier(current, name, first)?,
                PathSegment::Qualified(qname) => self.step_cast(current, qname)?,
                PathSegment::Term(term_ref) => current.get_annotation(term_ref)?.ok_or_else(
                    || ODataError::path(format!("no applied annotation {term_ref}")),
                )?,
                PathSegment::Qualifier(PathQualifier::Count) => count_value(&current)?,
                PathSegment::Qualifier(PathQualifier::Ref) | PathSegment::Wildcard => {
                    return Err(ODataError::expression(
                        "unsupported path segment in an expression",
                    ));
                }
            };
            first = false;
        }
        Ok(current)
    }

    fn unary(&mut self, op: UnaryOp, operand: Value) -> Result<Value> {
        match op {
            UnaryOp::Not => boolean_result(bool_not(boolean_operand(&operand)?)),
            UnaryOp::Negate => {
                let Some(lit) = primitive_operand(&operand)? else {
                    return Ok(Value::new(&edm().primitive_type));
                };
                let negated = match lit {
                    Literal::Int64(i) => Literal::Int64(-i),
                    Literal::Decimal(d) => Literal::Decimal(-d),
                    Literal::Double(d) => Literal::Double(-d),
                    Literal::Duration(d) => Literal::Duration(-d),
                    other => {
                        return Err(ODataError::expression(format!("cannot negate {other}")));
                    }
                };
                self.literal_result(negated)
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value> {
        match op {
            BinaryOp::And => boolean_result(bool_and(
                boolean_operand(&left)?,
                boolean_operand(&right)?,
            )),
            BinaryOp::Or => boolean_result(bool_or(
                boolean_operand(&left)?,
                boolean_operand(&right)?,
            )),
            BinaryOp::Eq | BinaryOp::Ne => {
                let (l, r) = (primitive_operand(&left)?, primitive_operand(&right)?);
                let eq = equal(l.as_ref(), r.as_ref())?;
                boolean_result(Some(if op == BinaryOp::Eq { eq } else { !eq }))
            }
            BinaryOp::Lt | BinaryOp::Gt => {
                let (l, r) = (primitive_operand(&left)?, primitive_operand(&right)?);
                let outcome = match (l, r) {
                    (Some(a), Some(b)) => compare(&a, &b)?.map(|o| {
                        if op == BinaryOp::Lt {
                            o == Ordering::Less
                        } else {
                            o == Ordering::Greater
                        }
                    }),
                    // null is not ordered
                    _ => None,
                };
                boolean_result(outcome)
            }
            BinaryOp::Le | BinaryOp::Ge => {
                let (l, r) = (primitive_operand(&left)?, primitive_operand(&right)?);
                let outcome = match (&l, &r) {
                    // null le null and null ge null hold; a single null
                    // is unordered
                    (None, None) => Some(true),
                    (None, Some(_)) | (Some(_), None) => None,
                    (Some(a), Some(b)) => compare(a, b)?.map(|o| {
                        if op == BinaryOp::Le {
                            o != Ordering::Greater
                        } else {
                            o != Ordering::Less
                        }
                    }),
                };
                boolean_result(outcome)
            }
            BinaryOp::Has => {
                let (l, r) = (primitive_operand(&left)?, primitive_operand(&right)?);
                match (l, r) {
                    (Some(Literal::Enum(flags)), Some(Literal::Enum(wanted))) => {
                        let has = flags.qname == wanted.qname
                            && wanted.members.iter().all(|m| flags.members.contains(m));
                        boolean_result(Some(has))
                    }
                    (None, _) | (_, None) => boolean_result(None),
                    _ => Err(ODataError::expression("has requires enumeration operands")),
                }
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                self.arithmetic(op, &left, &right)
            }
        }
    }

    fn call(&mut self, method: Method, args: Vec<Value>) -> Result<Value> {
        // null propagates through the canonical functions
        let mut literals = Vec::with_capacity(args.len());
        for arg in &args {
            match primitive_operand(arg)? {
                Some(lit) => literals.push(lit),
                None => return Ok(Value::new(&edm().primitive_type)),
            }
        }
        self.literal_result(apply_method(method, &literals)?)
    }

    fn cast(&mut self, type_name: &QualifiedName, operand: Option<Value>) -> Result<Value> {
        let target = match self.resolve_element(type_name) {
            Some(ModelElement::Type(t)) => t,
            _ => return Err(ODataError::model(format!("no such type: {type_name}"))),
        };
        let operand = operand.unwrap_or_else(|| self.it.clone());
        Ok(operand.cast(&target))
    }

    fn is_of(&mut self, type_name: &QualifiedName, operand: Option<Value>) -> Result<Value> {
        let target = match self.resolve_element(type_name) {
            Some(ModelElement::Type(t)) => t,
            _ => return Err(ODataError::model(format!("no such type: {type_name}"))),
        };
        let operand = operand.unwrap_or_else(|| self.it.clone());
        boolean_result(Some(operand.type_def().is_derived_from(&target)))
    }

    fn condition(
        &mut self,
        test: &Expression,
        then: &Expression,
        otherwise: Option<&Expression>,
    ) -> Result<Value> {
        let test = boolean_operand(&walk(self, test)?)?;
        if test == Some(true) {
            walk(self, then)
        } else if let Some(otherwise) = otherwise {
            // a null test selects the else branch
            walk(self, otherwise)
        } else {
            Err(ODataError::expression(
                "the two-argument if is only valid inside a collection constructor",
            ))
        }
    }

    fn collection(&mut self, items: &[Expression]) -> Result<Value> {
        let mut values = Vec::new();
        for item in items {
            if let Expression::If {
                test,
                then,
                otherwise: None,
            } = item
            {
                // conditional member: absent unless the test holds
                if boolean_operand(&walk(self, test)?)? == Some(true) {
                    values.push(walk(self, then)?);
                }
                continue;
            }
            values.push(walk(self, item)?);
        }
        let item_type = values
            .iter()
            .map(Value::type_def)
            .reduce(|a, b| {
                TypeDef::common_ancestor(&a, &b).unwrap_or_else(|| edm().primitive_type.clone())
            })
            .unwrap_or_else(|| edm().primitive_type.clone());
        if item_type.is_abstract() && values.iter().any(|v| !v.is_null()) {
            return Err(ODataError::expression("collection items have no common type"));
        }
        let collection = Value::new(&TypeDef::collection_of(&item_type));
        for value in &values {
            collection.push(value)?;
        }
        Ok(collection)
    }

    fn record(&mut self, fields: &[(String, Expression)]) -> Result<Value> {
        let record_type = TypeDef::complex(QualifiedName::new("Edm", "Untyped"))
            .open_type()
            .build()?;
        let value = Value::new(&record_type);
        value.set_defaults()?;
        for (name, field) in fields {
            let judged = walk(self, field)?;
            let copy = Value::new(&judged.type_def());
            copy.assign(&judged)?;
            value.set_dynamic(name, &copy)?;
        }
        Ok(value)
    }
}

/// Evaluate an annotation's expression with the annotated value as
/// context
///
/// Constant expressions and defaulted terms are handled by the data
/// layer; this is the dynamic path.
pub fn evaluate_annotation(annotation: &Annotation, context: &Value) -> Result<Value> {
    let expression = annotation.expression.as_deref().ok_or_else(|| {
        ODataError::expression(format!(
            "annotation {} has no expression",
            annotation.term.qname
        ))
    })?;
    Evaluator::new(context).evaluate(expression)
}

/// Install [`evaluate_annotation`] as the dynamic annotation evaluator
pub fn register_annotation_evaluator() {
    odata_data::install_annotation_evaluator(evaluate_annotation);
}

fn deref_singleton(current: Value) -> Result<Value> {
    if current.item_type().is_some() && !current.is_collection() {
        current.entity()
    } else {
        Ok(current)
    }
}

fn collection_items(value: &Value) -> Result<Vec<Value>> {
    let type_def = value.type_def();
    match type_def.kind() {
        TypeKind::Collection { .. } => value.items(),
        TypeKind::EntitySet { .. } => value.iter_entities()?.collect(),
        _ => Err(ODataError::expression(format!("{value} is not a collection"))),
    }
}

fn count_value(value: &Value) -> Result<Value> {
    let len = i64::try_from(value.len()?)
        .map_err(|_| ODataError::expression("collection too large to count"))?;
    let result = Value::new(&edm().int64);
    result.set_value(ValueSeed::Literal(Literal::Int64(len)))?;
    Ok(result)
}

fn boolean_result(b: Option<bool>) -> Result<Value> {
    let value = Value::new(&edm().boolean);
    if let Some(b) = b {
        value.set_value(ValueSeed::Literal(Literal::Boolean(b)))?;
    }
    Ok(value)
}

/// The literal held by a primitive or enumeration value; `None` for
/// null
fn primitive_operand(value: &Value) -> Result<Option<Literal>> {
    match value.get_value() {
        Some(lit) => Ok(Some(lit)),
        None if value.is_null() => Ok(None),
        None => Err(ODataError::expression(format!(
            "expected a primitive value, got a {value}"
        ))),
    }
}

fn boolean_operand(value: &Value) -> Result<Option<bool>> {
    match primitive_operand(value)? {
        Some(Literal::Boolean(b)) => Ok(Some(b)),
        Some(lit) => Err(ODataError::expression(format!("expected a boolean, got {lit}"))),
        None => Ok(None),
    }
}

fn apply_double(op: BinaryOp, x: f64, y: f64) -> Result<f64> {
    Ok(match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::Mod => x % y,
        _ => return Err(ODataError::expression("not an arithmetic operator")),
    })
}

fn apply_decimal(op: BinaryOp, x: Decimal, y: Decimal) -> Result<Decimal> {
    let outcome = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => x.checked_div(y),
        BinaryOp::Mod => x.checked_rem(y),
        _ => return Err(ODataError::expression("not an arithmetic operator")),
    };
    outcome.ok_or_else(|| {
        ODataError::expression("decimal arithmetic overflowed or divided by zero")
    })
}

fn apply_int64(op: BinaryOp, x: i64, y: i64) -> Result<i64> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && y == 0 {
        return Err(ODataError::expression("division by zero"));
    }
    let outcome = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => x.checked_div(y),
        BinaryOp::Mod => x.checked_rem(y),
        _ => return Err(ODataError::expression("not an arithmetic operator")),
    };
    outcome.ok_or_else(|| ODataError::expression("integer arithmetic overflowed"))
}

fn one_string(args: &[Literal]) -> Option<&str> {
    match args {
        [Literal::String(s)] => Some(s),
        _ => None,
    }
}

fn two_strings(args: &[Literal]) -> Option<(&str, &str)> {
    match args {
        [Literal::String(a), Literal::String(b)] => Some((a, b)),
        _ => None,
    }
}

fn char_substring(s: &str, start: i64, length: Option<i64>) -> String {
    let start = usize::try_from(start.max(0)).unwrap_or(0);
    let chars = s.chars().skip(start);
    match length {
        Some(len) => chars.take(usize::try_from(len.max(0)).unwrap_or(0)).collect(),
        None => chars.collect(),
    }
}

fn apply_method(method: Method, args: &[Literal]) -> Result<Literal> {
    let wrong = || ODataError::expression(format!("bad arguments for {}()", method.keyword()));
    Ok(match method {
        Method::Contains => {
            let (a, b) = two_strings(args).ok_or_else(wrong)?;
            Literal::Boolean(a.contains(b))
        }
        Method::StartsWith => {
            let (a, b) = two_strings(args).ok_or_else(wrong)?;
            Literal::Boolean(a.starts_with(b))
        }
        Method::EndsWith => {
            let (a, b) = two_strings(args).ok_or_else(wrong)?;
            Literal::Boolean(a.ends_with(b))
        }
        Method::Length => {
            let s = one_string(args).ok_or_else(wrong)?;
            Literal::Int64(s.chars().count() as i64)
        }
        Method::IndexOf => {
            let (a, b) = two_strings(args).ok_or_else(wrong)?;
            match a.find(b) {
                Some(byte) => Literal::Int64(a[..byte].chars().count() as i64),
                None => Literal::Int64(-1),
            }
        }
        Method::Substring => match args {
            [Literal::String(s), Literal::Int64(start)] => {
                Literal::String(char_substring(s, *start, None))
            }
            [Literal::String(s), Literal::Int64(start), Literal::Int64(len)] => {
                Literal::String(char_substring(s, *start, Some(*len)))
            }
            _ => return Err(wrong()),
        },
        Method::ToLower => Literal::String(one_string(args).ok_or_else(wrong)?.to_lowercase()),
        Method::ToUpper => Literal::String(one_string(args).ok_or_else(wrong)?.to_uppercase()),
        Method::Trim => Literal::String(one_string(args).ok_or_else(wrong)?.trim().to_string()),
        Method::Concat => {
            let (a, b) = two_strings(args).ok_or_else(wrong)?;
            Literal::String(format!("{a}{b}"))
        }
        Method::Year => match args {
            [Literal::Date(d)] => Literal::Int64(i64::from(d.year())),
            [Literal::DateTimeOffset(dt)] => Literal::Int64(i64::from(dt.year())),
            _ => return Err(wrong()),
        },
        Method::Month => match args {
            [Literal::Date(d)] => Literal::Int64(i64::from(d.month())),
            [Literal::DateTimeOffset(dt)] => Literal::Int64(i64::from(dt.month())),
            _ => return Err(wrong()),
        },
        Method::Day => match args {
            [Literal::Date(d)] => Literal::Int64(i64::from(d.day())),
            [Literal::DateTimeOffset(dt)] => Literal::Int64(i64::from(dt.day())),
            _ => return Err(wrong()),
        },
        Method::Hour => match args {
            [Literal::TimeOfDay(t)] => Literal::Int64(i64::from(t.hour())),
            [Literal::DateTimeOffset(dt)] => Literal::Int64(i64::from(dt.hour())),
            _ => return Err(wrong()),
        },
        Method::Minute => match args {
            [Literal::TimeOfDay(t)] => Literal::Int64(i64::from(t.minute())),
            [Literal::DateTimeOffset(dt)] => Literal::Int64(i64::from(dt.minute())),
            _ => return Err(wrong()),
        },
        Method::Second => match args {
            [Literal::TimeOfDay(t)] => Literal::Int64(i64::from(t.second())),
            [Literal::DateTimeOffset(dt)] => Literal::Int64(i64::from(dt.second())),
            _ => return Err(wrong()),
        },
        Method::FractionalSeconds => {
            let nanos = match args {
                [Literal::TimeOfDay(t)] => t.nanosecond(),
                [Literal::DateTimeOffset(dt)] => dt.nanosecond(),
                _ => return Err(wrong()),
            };
            // leap seconds fold back into the final second
            Literal::Decimal(Decimal::new(i64::from(nanos % 1_000_000_000), 9))
        }
        Method::TotalSeconds => match args {
            [Literal::Duration(d)] => Literal::Decimal(*d),
            _ => return Err(wrong()),
        },
        Method::Date => match args {
            [Literal::DateTimeOffset(dt)] => Literal::Date(dt.date_naive()),
            _ => return Err(wrong()),
        },
        Method::Time => match args {
            [Literal::DateTimeOffset(dt)] => Literal::TimeOfDay(dt.time()),
            _ => return Err(wrong()),
        },
        Method::TotalOffsetMinutes => match args {
            [Literal::DateTimeOffset(dt)] => {
                Literal::Int64(i64::from(dt.offset().local_minus_utc() / 60))
            }
            _ => return Err(wrong()),
        },
        Method::MinDateTime => {
            Literal::DateTimeOffset(chrono::DateTime::<chrono::Utc>::MIN_UTC.fixed_offset())
        }
        Method::MaxDateTime => {
            Literal::DateTimeOffset(chrono::DateTime::<chrono::Utc>::MAX_UTC.fixed_offset())
        }
        Method::Now => Literal::DateTimeOffset(chrono::Utc::now().fixed_offset()),
        Method::Round => match args {
            [Literal::Int64(i)] => Literal::Int64(*i),
            [Literal::Decimal(d)] => Literal::Decimal(
                d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
            ),
            [Literal::Double(d)] => Literal::Double(d.round()),
            _ => return Err(wrong()),
        },
        Method::Floor => match args {
            [Literal::Int64(i)] => Literal::Int64(*i),
            [Literal::Decimal(d)] => Literal::Decimal(d.floor()),
            [Literal::Double(d)] => Literal::Double(d.floor()),
            _ => return Err(wrong()),
        },
        Method::Ceiling => match args {
            [Literal::Int64(i)] => Literal::Int64(*i),
            [Literal::Decimal(d)] => Literal::Decimal(d.ceil()),
            [Literal::Double(d)] => Literal::Double(d.ceil()),
            _ => return Err(wrong()),
        },
    })
}
