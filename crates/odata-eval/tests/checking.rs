//! Static checking of filter and annotation expressions
//!
//! The checker runs against the model alone: operator compatibility,
//! member resolution through properties, container roots and bound
//! operation overloads, and key-predicate validation.

use odata_ast::{BinaryOp, Expression, MemberSegment, Method};
use odata_eval::TypeChecker;
use odata_types::{
    EntityContainer, EntityModel, EntitySetDecl, FunctionDef, FunctionOverloads, Parameter,
    SingletonDecl, Term, TypeDef, TypeRef, edm,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Sample {
    model: EntityModel,
    person: TypeRef,
    trip: TypeRef,
}

fn sample_model() -> Sample {
    let address = TypeDef::complex("Sample.Address".parse().unwrap())
        .property("City", &edm().string)
        .build()
        .unwrap();
    let trip = TypeDef::entity("Sample.Trip".parse().unwrap())
        .key_property("TripId", &edm().int64)
        .property("Name", &edm().string)
        .property("Budget", &edm().decimal)
        .build()
        .unwrap();
    let person = TypeDef::entity("Sample.Person".parse().unwrap())
        .key_property("UserName", &edm().string)
        .property("FirstName", &edm().string)
        .property("Age", &edm().int64)
        .property("Address", &address)
        .collection_property("Emails", &edm().string)
        .collection_navigation("Trips", &trip)
        .build()
        .unwrap();
    let mut model = EntityModel::new();
    model.declare_type(address).unwrap();
    model.declare_type(trip.clone()).unwrap();
    model.declare_type(person.clone()).unwrap();
    model
        .declare_term(Term::new("Sample.Nickname".parse().unwrap(), &edm().string))
        .unwrap();
    model
        .declare_function(FunctionOverloads::new(
            "Sample.TopTrips".parse().unwrap(),
            vec![FunctionDef {
                binding: Some(person.clone()),
                params: vec![Parameter {
                    name: "count".to_string(),
                    type_ref: edm().int64.clone(),
                    collection: false,
                    nullable: false,
                }],
                return_type: Some(trip.clone()),
                return_collection: true,
                is_action: false,
            }],
        ))
        .unwrap();
    let mut container = EntityContainer::new("Service");
    container
        .declare_entity_set(EntitySetDecl::new("People", &person))
        .unwrap();
    container
        .declare_singleton(SingletonDecl::new("Me", &person))
        .unwrap();
    model.set_container(container);
    Sample { model, person, trip }
}

fn check(sample: &Sample, expr: &Expression) -> odata_diagnostics::Result<TypeRef> {
    TypeChecker::new(&sample.person)
        .with_model(&sample.model)
        .check(expr)
}

fn ident(name: &str) -> MemberSegment {
    MemberSegment::Identifier(name.to_string())
}

// === Operators ===

#[test]
fn filters_type_to_boolean() {
    let sample = sample_model();
    let expr = Expression::property("Age")
        .binary(BinaryOp::Ge, Expression::int64(4))
        .binary(
            BinaryOp::And,
            Expression::property("FirstName").binary(BinaryOp::Ne, Expression::null()),
        );
    let judged = check(&sample, &expr).unwrap();
    assert!(Arc::ptr_eq(&judged, &edm().boolean));
}

#[test]
fn incompatible_operands_are_rejected() {
    let sample = sample_model();
    let expr = Expression::property("FirstName").binary(BinaryOp::Add, Expression::int64(1));
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("cannot apply add"));

    let expr = Expression::property("FirstName").binary(BinaryOp::Gt, Expression::int64(1));
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("cannot compare"));
}

#[test]
fn arithmetic_promotes_at_the_type_level() {
    let sample = sample_model();
    let expr = Expression::property("Age").binary(BinaryOp::Add, Expression::int64(1));
    let judged = check(&sample, &expr).unwrap();
    assert!(Arc::ptr_eq(&judged, &edm().int64));

    let budget = Expression::Member(vec![
        ident("Trips"),
        MemberSegment::Args(vec![Expression::int64(1)]),
        ident("Budget"),
    ]);
    let expr = budget.binary(BinaryOp::Mul, Expression::int64(2));
    let judged = check(&sample, &expr).unwrap();
    assert!(Arc::ptr_eq(&judged, &edm().decimal));
}

// === Member chains ===

#[test]
fn member_chains_resolve_in_the_model() {
    let sample = sample_model();
    let expr = Expression::Member(vec![ident("Address"), ident("City")]);
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().string));

    let expr = Expression::Member(vec![ident("Emails"), MemberSegment::Count]);
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().int64));

    let expr = Expression::Member(vec![ident("Missing")]);
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("no such property"));
}

#[test]
fn container_roots_resolve_for_leading_names() {
    let sample = sample_model();
    let expr = Expression::Member(vec![
        ident("People"),
        MemberSegment::Args(vec![Expression::string("aria")]),
        ident("FirstName"),
    ]);
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().string));

    // singletons dereference implicitly
    let expr = Expression::Member(vec![ident("Me"), ident("Age")]);
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().int64));
}

#[test]
fn key_predicates_are_validated() {
    let sample = sample_model();
    let expr = Expression::Member(vec![
        ident("Trips"),
        MemberSegment::Args(vec![Expression::Bind {
            name: "Name".to_string(),
            value: Box::new(Expression::string("x")),
        }]),
    ]);
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("no such key property"));

    let expr = Expression::Member(vec![
        ident("Trips"),
        MemberSegment::Args(vec![Expression::string("wrong kind")]),
    ]);
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("expects"));

    let expr = Expression::Member(vec![
        ident("Trips"),
        MemberSegment::Args(vec![Expression::int64(1)]),
    ]);
    assert_eq!(
        check(&sample, &expr).unwrap().qname(),
        sample.trip.qname()
    );
}

#[test]
fn bound_overloads_resolve_and_type() {
    let sample = sample_model();
    let expr = Expression::Member(vec![
        MemberSegment::Cast("Sample.TopTrips".parse().unwrap()),
        MemberSegment::Args(vec![Expression::Bind {
            name: "count".to_string(),
            value: Box::new(Expression::int64(3)),
        }]),
        MemberSegment::Count,
    ]);
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().int64));

    let expr = Expression::Member(vec![
        MemberSegment::Cast("Sample.TopTrips".parse().unwrap()),
        MemberSegment::Args(vec![Expression::Bind {
            name: "limit".to_string(),
            value: Box::new(Expression::int64(3)),
        }]),
    ]);
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("no matching overload"));

    // an operation reference without arguments is incomplete
    let expr = Expression::Member(vec![MemberSegment::Cast("Sample.TopTrips".parse().unwrap())]);
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("argument list"));
}

#[test]
fn term_casts_take_the_term_type() {
    let sample = sample_model();
    let expr = Expression::Member(vec![MemberSegment::Term(
        "@Sample.Nickname".parse().unwrap(),
    )]);
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().string));
}

// === Lambdas, conditionals, constructors ===

#[test]
fn lambda_predicates_must_be_boolean() {
    let sample = sample_model();
    let expr = Expression::Member(vec![
        ident("Emails"),
        MemberSegment::Any {
            var: Some("e".to_string()),
            predicate: Some(Box::new(Expression::Call {
                method: Method::Contains,
                args: vec![
                    Expression::Member(vec![ident("e")]),
                    Expression::string("@"),
                ],
            })),
        },
    ]);
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().boolean));

    let expr = Expression::Member(vec![
        ident("Emails"),
        MemberSegment::Any {
            var: Some("e".to_string()),
            predicate: Some(Box::new(Expression::Member(vec![ident("e")]))),
        },
    ]);
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("expected a boolean"));
}

#[test]
fn conditional_branches_need_a_common_type() {
    let sample = sample_model();
    let expr = Expression::If {
        test: Box::new(Expression::boolean(true)),
        then: Box::new(Expression::int64(1)),
        otherwise: Some(Box::new(Expression::literal(odata_ast::Literal::Decimal(
            rust_decimal::Decimal::ONE,
        )))),
    };
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().decimal));

    let expr = Expression::If {
        test: Box::new(Expression::boolean(true)),
        then: Box::new(Expression::string("a")),
        otherwise: Some(Box::new(Expression::int64(1))),
    };
    let err = check(&sample, &expr).unwrap_err();
    assert!(err.to_string().contains("incompatible branch types"));
}

#[test]
fn cast_and_isof_judgments() {
    let sample = sample_model();
    let expr = Expression::Cast {
        type_name: "Edm.Int64".parse().unwrap(),
        operand: Some(Box::new(Expression::property("Age"))),
    };
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().int64));

    let expr = Expression::IsOf {
        type_name: "Sample.Trip".parse().unwrap(),
        operand: None,
    };
    assert!(Arc::ptr_eq(&check(&sample, &expr).unwrap(), &edm().boolean));
}
