//! Expression evaluation against an in-memory entity
//!
//! Covers the evaluator's operator semantics and member traversal:
//! - three-valued and/or/not, null-total eq/ne, null-aware orderings
//! - numeric promotion and the canonical functions
//! - property chains, key predicates, lambdas, cast/isof
//! - dynamic annotation evaluation through the registered hook

use indexmap::IndexMap;
use odata_ast::{BinaryOp, Expression, Literal, MemberSegment, Method, UnaryOp};
use odata_data::{Value, ValueSeed};
use odata_eval::{Evaluator, register_annotation_evaluator};
use odata_names::TermRef;
use odata_types::{Annotation, EntityModel, Term, TypeDef, TypeRef, edm};
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

struct Sample {
    model: EntityModel,
    person: TypeRef,
    trip: TypeRef,
    employee: TypeRef,
}

fn sample_model() -> Sample {
    let address = TypeDef::complex("Sample.Address".parse().unwrap())
        .property("City", &edm().string)
        .property("Postcode", &edm().string)
        .build()
        .unwrap();
    let trip = TypeDef::entity("Sample.Trip".parse().unwrap())
        .key_property("TripId", &edm().int64)
        .property("Name", &edm().string)
        .property("Budget", &edm().decimal)
        .build()
        .unwrap();
    let display_name = Term::new("Sample.DisplayName".parse().unwrap(), &edm().string);
    let person = TypeDef::entity("Sample.Person".parse().unwrap())
        .key_property("UserName", &edm().string)
        .property("FirstName", &edm().string)
        .property("Age", &edm().int64)
        .property("Address", &address)
        .collection_property("Emails", &edm().string)
        .collection_navigation("Trips", &trip)
        .annotate(Annotation::new(
            display_name.clone(),
            Expression::property("FirstName"),
        ))
        .unwrap()
        .build()
        .unwrap();
    let employee = TypeDef::entity("Sample.Employee".parse().unwrap())
        .base(&person)
        .property("Cost", &edm().decimal)
        .build()
        .unwrap();
    let mut model = EntityModel::new();
    model.declare_type(address).unwrap();
    model.declare_type(trip.clone()).unwrap();
    model.declare_type(person.clone()).unwrap();
    model.declare_type(employee.clone()).unwrap();
    model.declare_term(display_name).unwrap();
    Sample {
        model,
        person,
        trip,
        employee,
    }
}

fn sample_person(sample: &Sample) -> Value {
    let value = Value::new(&sample.person);
    value.expand("Trips", None).unwrap();
    value
        .set_value(ValueSeed::Map(IndexMap::from_iter([
            ("UserName".to_string(), ValueSeed::from("aria")),
            ("FirstName".to_string(), ValueSeed::from("Aria")),
            ("Age".to_string(), ValueSeed::from(34i64)),
            (
                "Address".to_string(),
                ValueSeed::Map(IndexMap::from_iter([
                    ("City".to_string(), ValueSeed::from("Lisbon")),
                    ("Postcode".to_string(), ValueSeed::from("1000-001")),
                ])),
            ),
            (
                "Emails".to_string(),
                ValueSeed::List(vec![
                    ValueSeed::from("aria@example.org"),
                    ValueSeed::from("a@work.example"),
                ]),
            ),
        ])))
        .unwrap();
    let trips = value.property("Trips").unwrap();
    for (id, name, budget) in [(1i64, "Sunrise", "100.5"), (2, "Sunset", "80")] {
        let trip = Value::new(&sample.trip);
        trip.set_value(ValueSeed::Map(IndexMap::from_iter([
            ("TripId".to_string(), ValueSeed::from(id)),
            ("Name".to_string(), ValueSeed::from(name)),
            (
                "Budget".to_string(),
                ValueSeed::Literal(Literal::Decimal(budget.parse().unwrap())),
            ),
        ])))
        .unwrap();
        trips.insert(&trip).unwrap();
    }
    value
}

fn eval_on(it: &Value, expr: &Expression) -> Value {
    Evaluator::new(it).evaluate(expr).unwrap()
}

fn eval(expr: &Expression) -> Value {
    eval_on(&Value::new(&edm().boolean), expr)
}

fn truth(value: &Value) -> Option<bool> {
    match value.get_value() {
        Some(Literal::Boolean(b)) => Some(b),
        None => None,
        Some(other) => panic!("expected a boolean, got {other}"),
    }
}

// === Three-valued logic ===

#[rstest]
#[case(Literal::Boolean(true), Literal::Boolean(true), Some(true))]
#[case(Literal::Boolean(true), Literal::Boolean(false), Some(false))]
#[case(Literal::Null, Literal::Boolean(false), Some(false))]
#[case(Literal::Null, Literal::Boolean(true), None)]
#[case(Literal::Null, Literal::Null, None)]
fn conjunction_over_null(
    #[case] left: Literal,
    #[case] right: Literal,
    #[case] expected: Option<bool>,
) {
    let expr = Expression::literal(left).binary(BinaryOp::And, Expression::literal(right));
    assert_eq!(truth(&eval(&expr)), expected);
}

#[rstest]
#[case(Literal::Boolean(false), Literal::Boolean(false), Some(false))]
#[case(Literal::Null, Literal::Boolean(true), Some(true))]
#[case(Literal::Null, Literal::Boolean(false), None)]
#[case(Literal::Null, Literal::Null, None)]
fn disjunction_over_null(
    #[case] left: Literal,
    #[case] right: Literal,
    #[case] expected: Option<bool>,
) {
    let expr = Expression::literal(left).binary(BinaryOp::Or, Expression::literal(right));
    assert_eq!(truth(&eval(&expr)), expected);
}

#[test]
fn negation_preserves_null() {
    let expr = Expression::Unary {
        op: UnaryOp::Not,
        operand: Box::new(Expression::null()),
    };
    assert_eq!(truth(&eval(&expr)), None);
    let expr = Expression::Unary {
        op: UnaryOp::Not,
        operand: Box::new(Expression::boolean(false)),
    };
    assert_eq!(truth(&eval(&expr)), Some(true));
}

// === Comparisons ===

#[rstest]
#[case(BinaryOp::Eq, Literal::Null, Literal::Null, Some(true))]
#[case(BinaryOp::Eq, Literal::Null, Literal::Int64(4), Some(false))]
#[case(BinaryOp::Ne, Literal::Null, Literal::Null, Some(false))]
#[case(BinaryOp::Ne, Literal::Null, Literal::Int64(4), Some(true))]
fn equality_is_total_over_null(
    #[case] op: BinaryOp,
    #[case] left: Literal,
    #[case] right: Literal,
    #[case] expected: Option<bool>,
) {
    let expr = Expression::literal(left).binary(op, Expression::literal(right));
    assert_eq!(truth(&eval(&expr)), expected);
}

#[rstest]
#[case(BinaryOp::Gt, Literal::Int64(2), Literal::Int64(1), Some(true))]
#[case(BinaryOp::Gt, Literal::Null, Literal::Int64(1), None)]
#[case(BinaryOp::Lt, Literal::Int64(1), Literal::Null, None)]
#[case(BinaryOp::Ge, Literal::Null, Literal::Int64(1), None)]
#[case(BinaryOp::Le, Literal::Int64(5), Literal::Null, None)]
// two nulls satisfy the non-strict orderings
#[case(BinaryOp::Le, Literal::Null, Literal::Null, Some(true))]
#[case(BinaryOp::Ge, Literal::Null, Literal::Null, Some(true))]
fn ordering_propagates_null(
    #[case] op: BinaryOp,
    #[case] left: Literal,
    #[case] right: Literal,
    #[case] expected: Option<bool>,
) {
    let expr = Expression::literal(left).binary(op, Expression::literal(right));
    assert_eq!(truth(&eval(&expr)), expected);
}

#[test]
fn numbers_compare_across_representations() {
    let five_decimal = Expression::literal(Literal::Decimal(Decimal::new(50, 1)));
    let expr = Expression::int64(5).binary(BinaryOp::Eq, five_decimal);
    assert_eq!(truth(&eval(&expr)), Some(true));
    let expr = Expression::int64(5).binary(BinaryOp::Lt, Expression::literal(Literal::Double(5.5)));
    assert_eq!(truth(&eval(&expr)), Some(true));
}

// === Arithmetic ===

#[test]
fn arithmetic_promotes_through_the_ladder() {
    let expr = Expression::int64(2).binary(BinaryOp::Add, Expression::int64(3));
    assert_eq!(eval(&expr).get_value(), Some(Literal::Int64(5)));
    let expr = Expression::int64(2).binary(
        BinaryOp::Mul,
        Expression::literal(Literal::Decimal(Decimal::new(25, 1))),
    );
    assert_eq!(
        eval(&expr).get_value(),
        Some(Literal::Decimal(Decimal::new(50, 1)))
    );
    let expr = Expression::int64(7).binary(BinaryOp::Div, Expression::literal(Literal::Double(2.0)));
    assert_eq!(eval(&expr).get_value(), Some(Literal::Double(3.5)));
    let expr = Expression::int64(5).binary(BinaryOp::Mod, Expression::int64(3));
    assert_eq!(eval(&expr).get_value(), Some(Literal::Int64(2)));
}

#[test]
fn integer_division_by_zero_fails() {
    let expr = Expression::int64(1).binary(BinaryOp::Div, Expression::int64(0));
    let err = Evaluator::new(&Value::new(&edm().boolean))
        .evaluate(&expr)
        .unwrap_err();
    assert!(err.to_string().contains("division by zero"));
}

#[test]
fn arithmetic_with_null_is_null() {
    let expr = Expression::null().binary(BinaryOp::Add, Expression::int64(3));
    let result = eval(&expr);
    assert!(result.is_null());
}

// === Canonical functions ===

fn call(method: Method, args: Vec<Expression>) -> Expression {
    Expression::Call { method, args }
}

#[test]
fn string_functions() {
    let expr = call(
        Method::Contains,
        vec![Expression::string("OData"), Expression::string("Dat")],
    );
    assert_eq!(truth(&eval(&expr)), Some(true));
    let expr = call(Method::ToLower, vec![Expression::string("OData")]);
    assert_eq!(
        eval(&expr).get_value(),
        Some(Literal::String("odata".to_string()))
    );
    let expr = call(
        Method::Concat,
        vec![Expression::string("a"), Expression::string("b")],
    );
    assert_eq!(
        eval(&expr).get_value(),
        Some(Literal::String("ab".to_string()))
    );
    let expr = call(Method::Length, vec![Expression::string("héllo")]);
    assert_eq!(eval(&expr).get_value(), Some(Literal::Int64(5)));
    let expr = call(
        Method::Substring,
        vec![
            Expression::string("abcdef"),
            Expression::int64(1),
            Expression::int64(3),
        ],
    );
    assert_eq!(
        eval(&expr).get_value(),
        Some(Literal::String("bcd".to_string()))
    );
    let expr = call(
        Method::IndexOf,
        vec![Expression::string("abc"), Expression::string("z")],
    );
    assert_eq!(eval(&expr).get_value(), Some(Literal::Int64(-1)));
}

#[test]
fn date_functions() {
    let date = Literal::Date("2026-08-25".parse().unwrap());
    let expr = call(Method::Year, vec![Expression::literal(date.clone())]);
    assert_eq!(eval(&expr).get_value(), Some(Literal::Int64(2026)));
    let expr = call(Method::Day, vec![Expression::literal(date)]);
    assert_eq!(eval(&expr).get_value(), Some(Literal::Int64(25)));
    let time = Literal::TimeOfDay("07:59:59".parse().unwrap());
    let expr = call(Method::Hour, vec![Expression::literal(time)]);
    assert_eq!(eval(&expr).get_value(), Some(Literal::Int64(7)));
}

#[test]
fn null_propagates_through_functions() {
    let expr = call(Method::ToLower, vec![Expression::null()]);
    assert!(eval(&expr).is_null());
}

#[test]
fn rounding_functions() {
    let expr = call(
        Method::Round,
        vec![Expression::literal(Literal::Decimal(Decimal::new(25, 1)))],
    );
    assert_eq!(
        eval(&expr).get_value(),
        Some(Literal::Decimal(Decimal::from(3)))
    );
    let expr = call(
        Method::Floor,
        vec![Expression::literal(Literal::Double(-1.5))],
    );
    assert_eq!(eval(&expr).get_value(), Some(Literal::Double(-2.0)));
}

// === Member traversal ===

#[test]
fn member_chain_reads_nested_properties() {
    let sample = sample_model();
    let person = sample_person(&sample);
    let expr = Expression::Member(vec![
        MemberSegment::Identifier("Address".to_string()),
        MemberSegment::Identifier("City".to_string()),
    ]);
    assert_eq!(
        eval_on(&person, &expr).get_value(),
        Some(Literal::String("Lisbon".to_string()))
    );
}

#[test]
fn key_predicate_selects_a_navigation_item() {
    let sample = sample_model();
    let person = sample_person(&sample);
    let expr = Expression::Member(vec![
        MemberSegment::Identifier("Trips".to_string()),
        MemberSegment::Args(vec![Expression::int64(2)]),
        MemberSegment::Identifier("Name".to_string()),
    ]);
    assert_eq!(
        eval_on(&person, &expr).get_value(),
        Some(Literal::String("Sunset".to_string()))
    );
}

#[test]
fn named_key_predicate() {
    let sample = sample_model();
    let person = sample_person(&sample);
    let expr = Expression::Member(vec![
        MemberSegment::Identifier("Trips".to_string()),
        MemberSegment::Args(vec![Expression::Bind {
            name: "TripId".to_string(),
            value: Box::new(Expression::int64(1)),
        }]),
        MemberSegment::Identifier("Budget".to_string()),
    ]);
    assert_eq!(
        eval_on(&person, &expr).get_value(),
        Some(Literal::Decimal(Decimal::new(1005, 1)))
    );
}

#[test]
fn count_segment() {
    let sample = sample_model();
    let person = sample_person(&sample);
    let expr = Expression::Member(vec![
        MemberSegment::Identifier("Emails".to_string()),
        MemberSegment::Count,
    ]);
    assert_eq!(eval_on(&person, &expr).get_value(), Some(Literal::Int64(2)));
}

#[test]
fn any_and_all_lambdas() {
    let sample = sample_model();
    let person = sample_person(&sample);
    let contains_at = Expression::Call {
        method: Method::Contains,
        args: vec![
            Expression::Member(vec![MemberSegment::Identifier("e".to_string())]),
            Expression::string("@"),
        ],
    };
    let expr = Expression::Member(vec![
        MemberSegment::Identifier("Emails".to_string()),
        MemberSegment::Any {
            var: Some("e".to_string()),
            predicate: Some(Box::new(contains_at.clone())),
        },
    ]);
    assert_eq!(truth(&eval_on(&person, &expr)), Some(true));

    let ends_org = Expression::Call {
        method: Method::EndsWith,
        args: vec![
            Expression::Member(vec![MemberSegment::Identifier("e".to_string())]),
            Expression::string(".org"),
        ],
    };
    let expr = Expression::Member(vec![
        MemberSegment::Identifier("Emails".to_string()),
        MemberSegment::All {
            var: "e".to_string(),
            predicate: Box::new(ends_org),
        },
    ]);
    assert_eq!(truth(&eval_on(&person, &expr)), Some(false));

    // parameterless any() is non-emptiness
    let expr = Expression::Member(vec![
        MemberSegment::Identifier("Emails".to_string()),
        MemberSegment::Any {
            var: None,
            predicate: None,
        },
    ]);
    assert_eq!(truth(&eval_on(&person, &expr)), Some(true));
}

// === Casts ===

#[test]
fn isof_judges_the_value_type() {
    let sample = sample_model();
    let person = sample_person(&sample);
    let expr = Expression::IsOf {
        type_name: "Sample.Person".parse().unwrap(),
        operand: None,
    };
    let result = Evaluator::new(&person)
        .with_model(&sample.model)
        .evaluate(&expr)
        .unwrap();
    assert_eq!(truth(&result), Some(true));

    let expr = Expression::IsOf {
        type_name: "Edm.String".parse().unwrap(),
        operand: Some(Box::new(Expression::property("FirstName"))),
    };
    assert_eq!(truth(&eval_on(&person, &expr)), Some(true));
}

#[test]
fn failed_cast_yields_a_typed_null() {
    let sample = sample_model();
    let person = sample_person(&sample);
    let expr = Expression::Cast {
        type_name: "Sample.Employee".parse().unwrap(),
        operand: None,
    };
    let result = Evaluator::new(&person)
        .with_model(&sample.model)
        .evaluate(&expr)
        .unwrap();
    assert!(result.is_null());
    assert!(result.type_def().is_derived_from(&sample.employee));
}

// === Conditionals and constructors ===

#[test]
fn null_test_selects_the_else_branch() {
    let expr = Expression::If {
        test: Box::new(Expression::null()),
        then: Box::new(Expression::int64(1)),
        otherwise: Some(Box::new(Expression::int64(2))),
    };
    assert_eq!(eval(&expr).get_value(), Some(Literal::Int64(2)));
}

#[test]
fn conditional_members_drop_out_of_collections() {
    let expr = Expression::Collection(vec![
        Expression::int64(1),
        Expression::If {
            test: Box::new(Expression::boolean(false)),
            then: Box::new(Expression::int64(2)),
            otherwise: None,
        },
        Expression::int64(3),
    ]);
    let result = eval(&expr);
    assert_eq!(result.len().unwrap(), 2);
    assert_eq!(result.item(0).unwrap().get_value(), Some(Literal::Int64(1)));
    assert_eq!(result.item(1).unwrap().get_value(), Some(Literal::Int64(3)));
}

#[test]
fn record_constructor_builds_an_open_value() {
    let expr = Expression::Record(vec![
        ("Label".to_string(), Expression::string("x")),
        ("Rank".to_string(), Expression::int64(7)),
    ]);
    let result = eval(&expr);
    assert_eq!(
        result.property("Label").unwrap().get_value(),
        Some(Literal::String("x".to_string()))
    );
    assert_eq!(
        result.property("Rank").unwrap().get_value(),
        Some(Literal::Int64(7))
    );
}

// === Annotations ===

#[test]
fn dynamic_annotations_evaluate_through_the_hook() {
    register_annotation_evaluator();
    let sample = sample_model();
    let person = sample_person(&sample);
    let term_ref: TermRef = "@Sample.DisplayName".parse().unwrap();
    let value = person.get_annotation(&term_ref).unwrap().unwrap();
    assert_eq!(value.get_value(), Some(Literal::String("Aria".to_string())));
    assert!(value.frozen());
}
