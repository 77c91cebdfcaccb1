//! Static type checking of common expressions
//!
//! The checker judges every sub-expression with the type it would
//! evaluate to, without touching values or a service.  It is what a
//! client runs over a `$filter` before sending it: operator operands
//! must be compatible, member chains must resolve in the model and
//! bound operation calls must match a declared overload.

use crate::resolve::{edm_type, literal_type};
use crate::visitor::{ExpressionVisitor, walk};
use odata_ast::{BinaryOp, Expression, Literal, MemberSegment, Method, UnaryOp};
use odata_diagnostics::{ODataError, Result};
use odata_names::{Path, PathQualifier, PathSegment, QualifiedName};
use odata_types::{
    EntityModel, FunctionOverloads, ModelElement, PrimitiveKind, PropertyDef, TypeDef, TypeKind,
    TypeRef, edm, key_type_map,
};
use std::collections::HashMap;
use std::sync::Arc;

/// A partially traversed member chain
enum Step {
    /// An ordinary value of the given type
    Type(TypeRef),
    /// A bound operation awaiting its argument list
    Operation(Arc<FunctionOverloads>, Option<TypeRef>),
}

/// Type-checks expressions against an implicit variable type
pub struct TypeChecker<'a> {
    model: Option<&'a EntityModel>,
    it: TypeRef,
    variables: HashMap<String, TypeRef>,
}

impl<'a> TypeChecker<'a> {
    /// Create a checker with `it` as the implicit variable's type
    pub fn new(it: &TypeRef) -> Self {
        Self {
            model: None,
            it: it.clone(),
            variables: HashMap::new(),
        }
    }

    /// Resolve qualified names and container roots against `model`
    pub fn with_model(mut self, model: &'a EntityModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Check one expression tree, returning its type
    pub fn check(&mut self, expr: &Expression) -> Result<TypeRef> {
        walk(self, expr)
    }

    fn resolve_element(&self, qname: &QualifiedName) -> Option<ModelElement> {
        if qname.namespace == "Edm" {
            return edm_type(&qname.name).map(|t| ModelElement::Type(t.clone()));
        }
        self.model?.qualified_get(qname).cloned()
    }

    fn container_root(&self, name: &str) -> Option<TypeRef> {
        let container = self.model?.container()?;
        if let Some(decl) = container.entity_set(name) {
            return Some(decl.set_type.clone());
        }
        container.singleton(name).map(|decl| decl.singleton_type.clone())
    }

    fn step(&mut self, current: Step, segment: &MemberSegment, first: bool) -> Result<Step> {
        if let MemberSegment::Args(args) = segment {
            return self.step_args(current, args);
        }
        let t = match current {
            Step::Type(t) => t,
            step => return Err(operation_needs_args(&step)),
        };
        match segment {
            MemberSegment::Identifier(name) => self.property_type(&t, name, first).map(Step::Type),
            MemberSegment::Cast(qname) => {
                match self.resolve_element(qname) {
                    Some(ModelElement::Type(target)) => {
                        self.cast_type(&t, target).map(Step::Type)
                    }
                    Some(ModelElement::Function(overloads)) => {
                        let binding = deref_singleton_type(&t);
                        Ok(Step::Operation(overloads, Some(binding)))
                    }
                    Some(ModelElement::Term(_)) => Err(ODataError::expression(format!(
                        "term {qname} must be addressed as @{qname}"
                    ))),
                    None => Err(ODataError::model(format!("no such type: {qname}"))),
                }
            }
            MemberSegment::Term(term_ref) => {
                let model = self
                    .model
                    .ok_or_else(|| ODataError::model("term cast requires a model context"))?;
                let term = model.term(&term_ref.name)?;
                Ok(Step::Type(term.type_ref.clone()))
            }
            MemberSegment::Count => {
                if !t.is_collection_like() {
                    return Err(ODataError::expression(format!("$count applied to {t}")));
                }
                Ok(Step::Type(edm().int64.clone()))
            }
            MemberSegment::Args(_) => unreachable!("argument lists are handled above"),
            MemberSegment::Any { var, predicate } => self
                .lambda(&t, var.as_deref(), predicate.as_deref())
                .map(Step::Type),
            MemberSegment::All { var, predicate } => {
                self.lambda(&t, Some(var), Some(predicate)).map(Step::Type)
            }
        }
    }

    fn property_type(&self, t: &TypeRef, name: &str, first: bool) -> Result<TypeRef> {
        let t = deref_singleton_type(t);
        if t.is_structured() {
            match t.property(name) {
                Some(PropertyDef::Structural(p)) => {
                    return Ok(if p.collection {
                        TypeDef::collection_of(&p.type_ref)
                    } else {
                        p.type_ref.clone()
                    });
                }
                Some(PropertyDef::Navigation(np)) => {
                    return Ok(if np.collection {
                        TypeDef::entity_set_of(&np.entity_type)
                    } else if np.contains_target {
                        np.entity_type.clone()
                    } else {
                        TypeDef::singleton_of(&np.entity_type)
                    });
                }
                None => {}
            }
        }
        if first {
            if let Some(root) = self.container_root(name) {
                return Ok(root);
            }
        }
        Err(ODataError::path(format!("no such property: {name} on {t}")))
    }

    fn cast_type(&self, current: &TypeRef, target: TypeRef) -> Result<TypeRef> {
        let check = |item: &TypeRef| -> Result<()> {
            if target.is_derived_from(item) || item.is_derived_from(&target) {
                Ok(())
            } else {
                Err(ODataError::path(format!(
                    "incompatible type cast: {target} on {item}"
                )))
            }
        };
        match current.kind() {
            TypeKind::EntitySet { item_type } => {
                check(item_type)?;
                Ok(TypeDef::entity_set_of(&target))
            }
            TypeKind::Collection { item_type } => {
                check(item_type)?;
                Ok(TypeDef::collection_of(&target))
            }
            TypeKind::Singleton { item_type } => {
                check(item_type)?;
                Ok(TypeDef::singleton_of(&target))
            }
            _ => {
                check(current)?;
                Ok(target)
            }
        }
    }

    fn step_args(&mut self, current: Step, args: &[Expression]) -> Result<Step> {
        match current {
            Step::Type(t) => {
                let TypeKind::EntitySet { item_type } = t.kind() else {
                    return Err(ODataError::expression(format!(
                        "key predicate applied to {t}"
                    )));
                };
                let key_types = key_type_map(item_type)?;
                for arg in args {
                    let (alias, expr) = match arg {
                        Expression::Bind { name, value } => (name.as_str(), value.as_ref()),
                        expr => {
                            if key_types.len() != 1 || args.len() != 1 {
                                return Err(ODataError::expression(
                                    "composite keys require named key values",
                                ));
                            }
                            let (alias, _) = key_types.first().ok_or(ODataError::MissingKey)?;
                            (alias.as_str(), expr)
                        }
                    };
                    let expected = key_types
                        .get(alias)
                        .ok_or_else(|| ODataError::path(format!("no such key property: {alias}")))?;
                    let judged = walk(self, expr)?;
                    if !comparable(expected, &judged) {
                        return Err(ODataError::expression(format!(
                            "key {alias} expects {expected}, got {judged}"
                        )));
                    }
                }
                Ok(Step::Type(item_type.clone()))
            }
            Step::Operation(overloads, binding) => {
                let mut names: Vec<&str> = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        Expression::Bind { name, .. } => names.push(name.as_str()),
                        _ => {
                            return Err(ODataError::expression(
                                "operation arguments must be named",
                            ));
                        }
                    }
                }
                let overload = overloads
                    .resolve(binding.as_ref(), &names)
                    .ok_or_else(|| {
                        ODataError::model(format!(
                            "no matching overload of {} for ({})",
                            overloads.qname,
                            names.join(",")
                        ))
                    })?;
                for arg in args {
                    if let Expression::Bind { name, value } = arg {
                        let judged = walk(self, value)?;
                        if let Some(param) = overload.param(name) {
                            if !assignable(&param.type_ref, &judged) {
                                return Err(ODataError::expression(format!(
                                    "parameter {name} of {} expects {}, got {judged}",
                                    overloads.qname, param.type_ref
                                )));
                            }
                        }
                    }
                }
                let return_type = overload.return_type.clone().ok_or_else(|| {
                    ODataError::expression(format!("{} returns nothing", overloads.qname))
                })?;
                Ok(Step::Type(if overload.return_collection {
                    if return_type.is_entity() {
                        TypeDef::entity_set_of(&return_type)
                    } else {
                        TypeDef::collection_of(&return_type)
                    }
                } else {
                    return_type
                }))
            }
        }
    }

    fn lambda(
        &mut self,
        t: &TypeRef,
        var: Option<&str>,
        predicate: Option<&Expression>,
    ) -> Result<TypeRef> {
        let item_type = match t.kind() {
            TypeKind::Collection { item_type } | TypeKind::EntitySet { item_type } => {
                item_type.clone()
            }
            _ => {
                return Err(ODataError::expression(format!(
                    "lambda operator applied to {t}"
                )));
            }
        };
        let (Some(var), Some(predicate)) = (var, predicate) else {
            return Ok(edm().boolean.clone());
        };
        let saved = self.variables.insert(var.to_string(), item_type);
        let outcome = walk(self, predicate).and_then(|judged| require_boolean(&judged));
        match saved {
            Some(saved) => {
                self.variables.insert(var.to_string(), saved);
            }
            None => {
                self.variables.remove(var);
            }
        }
        outcome?;
        Ok(edm().boolean.clone())
    }
}

impl ExpressionVisitor for TypeChecker<'_> {
    type Judgment = TypeRef;

    fn literal(&mut self, lit: &Literal) -> Result<TypeRef> {
        match lit {
            Literal::Null => Ok(edm().primitive_type.clone()),
            Literal::Enum(e) => match self.resolve_element(&e.qname) {
                Some(ModelElement::Type(t)) if t.is_enumeration() => Ok(t),
                _ => Err(ODataError::model(format!(
                    "no such enumeration type: {}",
                    e.qname
                ))),
            },
            other => literal_type(other)
                .cloned()
                .ok_or_else(|| ODataError::expression(format!("untypeable literal: {other}"))),
        }
    }

    fn it(&mut self) -> Result<TypeRef> {
        Ok(self.it.clone())
    }

    fn variable(&mut self, name: &str) -> Result<TypeRef> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| ODataError::expression(format!("unknown variable: {name}")))
    }

    fn member(&mut self, segments: &[MemberSegment]) -> Result<TypeRef> {
        let mut current = Step::Type(self.it.clone());
        let mut first = true;
        let mut iter = segments.iter();
        if let Some(MemberSegment::Identifier(name)) = segments.first() {
            if let Some(bound) = self.variables.get(name.as_str()) {
                current = Step::Type(bound.clone());
                first = false;
                iter.next();
            }
        }
        for segment in iter {
            current = self.step(current, segment, first)?;
            first = false;
        }
        match current {
            Step::Type(t) => Ok(t),
            step @ Step::Operation(..) => Err(operation_needs_args(&step)),
        }
    }

    fn path_value(&mut self, path: &Path) -> Result<TypeRef> {
        let mut current = Step::Type(self.it.clone());
        let mut first = true;
        for segment in path.iter() {
            let member = match segment {
                PathSegment::Identifier(name) => MemberSegment::Identifier(name.clone()),
                PathSegment::Qualified(qname) => MemberSegment::Cast(qname.clone()),
                PathSegment::Term(term_ref) => MemberSegment::Term(term_ref.clone()),
                PathSegment::Qualifier(PathQualifier::Count) => MemberSegment::Count,
                PathSegment::Qualifier(PathQualifier::Ref) | PathSegment::Wildcard => {
                    return Err(ODataError::expression(
                        "unsupported path segment in an expression",
                    ));
                }
            };
            current = self.step(current, &member, first)?;
            first = false;
        }
        match current {
            Step::Type(t) => Ok(t),
            step @ Step::Operation(..) => Err(operation_needs_args(&step)),
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: TypeRef) -> Result<TypeRef> {
        match op {
            UnaryOp::Not => {
                require_boolean(&operand)?;
                Ok(edm().boolean.clone())
            }
            UnaryOp::Negate => {
                if is_numeric(&operand)
                    || is_nullish(&operand)
                    || operand.primitive_kind() == Some(PrimitiveKind::Duration)
                {
                    Ok(operand)
                } else {
                    Err(ODataError::expression(format!("cannot negate {operand}")))
                }
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: TypeRef, right: TypeRef) -> Result<TypeRef> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                require_boolean(&left)?;
                require_boolean(&right)?;
                Ok(edm().boolean.clone())
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                if !comparable(&left, &right) {
                    return Err(ODataError::expression(format!(
                        "cannot compare {left} with {right}"
                    )));
                }
                Ok(edm().boolean.clone())
            }
            BinaryOp::Has => {
                let enums = (left.is_enumeration() && Arc::ptr_eq(&left, &right))
                    || is_nullish(&left)
                    || is_nullish(&right);
                if !enums {
                    return Err(ODataError::expression(
                        "has requires operands of one enumeration type",
                    ));
                }
                Ok(edm().boolean.clone())
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let numeric = |t: &TypeRef| is_numeric(t) || is_nullish(t);
                if !numeric(&left) || !numeric(&right) {
                    return Err(ODataError::expression(format!(
                        "cannot apply {} to {left} and {right}",
                        op.keyword()
                    )));
                }
                Ok(promote(&left, &right))
            }
        }
    }

    fn call(&mut self, method: Method, args: Vec<TypeRef>) -> Result<TypeRef> {
        let arity_ok = match method {
            Method::Contains
            | Method::StartsWith
            | Method::EndsWith
            | Method::IndexOf
            | Method::Concat => args.len() == 2,
            Method::Substring => args.len() == 2 || args.len() == 3,
            Method::MinDateTime | Method::MaxDateTime | Method::Now => args.is_empty(),
            _ => args.len() == 1,
        };
        if !arity_ok {
            return Err(ODataError::expression(format!(
                "wrong number of arguments for {}()",
                method.keyword()
            )));
        }
        let e = edm();
        Ok(match method {
            Method::Contains | Method::StartsWith | Method::EndsWith => e.boolean.clone(),
            Method::Length
            | Method::IndexOf
            | Method::Year
            | Method::Month
            | Method::Day
            | Method::Hour
            | Method::Minute
            | Method::Second
            | Method::TotalOffsetMinutes => e.int64.clone(),
            Method::Substring
            | Method::ToLower
            | Method::ToUpper
            | Method::Trim
            | Method::Concat => e.string.clone(),
            Method::FractionalSeconds | Method::TotalSeconds => e.decimal.clone(),
            Method::Date => e.date.clone(),
            Method::Time => e.time_of_day.clone(),
            Method::MinDateTime | Method::MaxDateTime | Method::Now => {
                e.date_time_offset.clone()
            }
            Method::Round | Method::Floor | Method::Ceiling => {
                if !is_numeric(&args[0]) && !is_nullish(&args[0]) {
                    return Err(ODataError::expression(format!(
                        "{}() expects a numeric argument",
                        method.keyword()
                    )));
                }
                args[0].clone()
            }
        })
    }

    fn cast(&mut self, type_name: &QualifiedName, operand: Option<TypeRef>) -> Result<TypeRef> {
        let target = match self.resolve_element(type_name) {
            Some(ModelElement::Type(t)) => t,
            _ => return Err(ODataError::model(format!("no such type: {type_name}"))),
        };
        let _ = operand.unwrap_or_else(|| self.it.clone());
        // a failed cast evaluates to a typed null, so the judgment is
        // the target type regardless of the operand
        Ok(target)
    }

    fn is_of(&mut self, type_name: &QualifiedName, operand: Option<TypeRef>) -> Result<TypeRef> {
        match self.resolve_element(type_name) {
            Some(ModelElement::Type(_)) => {}
            _ => return Err(ODataError::model(format!("no such type: {type_name}"))),
        }
        let _ = operand;
        Ok(edm().boolean.clone())
    }

    fn condition(
        &mut self,
        test: &Expression,
        then: &Expression,
        otherwise: Option<&Expression>,
    ) -> Result<TypeRef> {
        let judged = walk(self, test)?;
        require_boolean(&judged)?;
        let then = walk(self, then)?;
        let Some(otherwise) = otherwise else {
            return Err(ODataError::expression(
                "the two-argument if is only valid inside a collection constructor",
            ));
        };
        let otherwise = walk(self, otherwise)?;
        branch_type(then, otherwise)
    }

    fn collection(&mut self, items: &[Expression]) -> Result<TypeRef> {
        let mut item_type: Option<TypeRef> = None;
        for item in items {
            let judged = if let Expression::If {
                test,
                then,
                otherwise: None,
            } = item
            {
                let test = walk(self, test)?;
                require_boolean(&test)?;
                walk(self, then)?
            } else {
                walk(self, item)?
            };
            item_type = Some(match item_type {
                None => judged,
                Some(existing) => branch_type(existing, judged)?,
            });
        }
        let item_type = item_type.unwrap_or_else(|| edm().primitive_type.clone());
        Ok(TypeDef::collection_of(&item_type))
    }

    fn record(&mut self, fields: &[(String, Expression)]) -> Result<TypeRef> {
        for (_, field) in fields {
            walk(self, field)?;
        }
        TypeDef::complex(QualifiedName::new("Edm", "Untyped"))
            .open_type()
            .build()
    }
}

fn operation_needs_args(step: &Step) -> ODataError {
    match step {
        Step::Operation(overloads, _) => ODataError::expression(format!(
            "operation {} needs an argument list",
            overloads.qname
        )),
        Step::Type(t) => ODataError::expression(format!("unexpected segment after {t}")),
    }
}

fn deref_singleton_type(t: &TypeRef) -> TypeRef {
    match t.kind() {
        TypeKind::Singleton { item_type } => item_type.clone(),
        _ => t.clone(),
    }
}

fn is_nullish(t: &TypeRef) -> bool {
    t.primitive_kind() == Some(PrimitiveKind::PrimitiveType)
}

fn is_numeric(t: &TypeRef) -> bool {
    matches!(
        t.primitive_kind(),
        Some(
            PrimitiveKind::Byte
                | PrimitiveKind::SByte
                | PrimitiveKind::Int16
                | PrimitiveKind::Int32
                | PrimitiveKind::Int64
                | PrimitiveKind::Decimal
                | PrimitiveKind::Double
                | PrimitiveKind::Single
        )
    )
}

fn require_boolean(t: &TypeRef) -> Result<()> {
    if t.primitive_kind() == Some(PrimitiveKind::Boolean) || is_nullish(t) {
        Ok(())
    } else {
        Err(ODataError::expression(format!("expected a boolean, got {t}")))
    }
}

fn comparable(a: &TypeRef, b: &TypeRef) -> bool {
    if is_nullish(a) || is_nullish(b) {
        return true;
    }
    if is_numeric(a) && is_numeric(b) {
        return true;
    }
    match (a.primitive_kind(), b.primitive_kind()) {
        (Some(x), Some(y)) => x == y,
        _ => a.is_enumeration() && b.is_enumeration() && Arc::ptr_eq(a, b),
    }
}

/// A parameter accepts an argument of its own type, a derived type or
/// a null
fn assignable(expected: &TypeRef, actual: &TypeRef) -> bool {
    is_nullish(actual) || actual.is_derived_from(expected) || comparable(expected, actual)
}

fn promote(a: &TypeRef, b: &TypeRef) -> TypeRef {
    let e = edm();
    if is_nullish(a) || is_nullish(b) {
        return e.primitive_type.clone();
    }
    let rank = |t: &TypeRef| match t.primitive_kind() {
        Some(PrimitiveKind::Double | PrimitiveKind::Single) => 2,
        Some(PrimitiveKind::Decimal) => 1,
        _ => 0,
    };
    match rank(a).max(rank(b)) {
        2 => e.double.clone(),
        1 => e.decimal.clone(),
        _ => e.int64.clone(),
    }
}

fn branch_type(a: TypeRef, b: TypeRef) -> Result<TypeRef> {
    if is_nullish(&a) {
        return Ok(b);
    }
    if is_nullish(&b) {
        return Ok(a);
    }
    if is_numeric(&a) && is_numeric(&b) {
        return Ok(promote(&a, &b));
    }
    TypeDef::common_ancestor(&a, &b).ok_or_else(|| {
        ODataError::expression(format!("incompatible branch types: {a} and {b}"))
    })
}
