//! Three-valued boolean logic and literal comparison
//!
//! Comparisons follow the OData operator semantics: `eq` and `ne` are
//! total over null, the ordering operators propagate it, except that
//! two nulls satisfy `le` and `ge`.  Numeric operands compare after
//! promotion through the integer-decimal-double ladder.

use odata_ast::Literal;
use odata_diagnostics::{ODataError, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

/// Three-valued conjunction: false absorbs null
pub fn bool_and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

/// Three-valued disjunction: true absorbs null
pub fn bool_or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

/// Three-valued negation: null stays null
pub fn bool_not(a: Option<bool>) -> Option<bool> {
    a.map(|b| !b)
}

/// A numeric literal lifted onto the promotion ladder
pub(crate) enum Numeric {
    Int64(i64),
    Decimal(Decimal),
    Double(f64),
}

impl Numeric {
    pub(crate) fn from_literal(lit: &Literal) -> Option<Self> {
        match lit {
            Literal::Int64(i) => Some(Self::Int64(*i)),
            Literal::Decimal(d) => Some(Self::Decimal(*d)),
            Literal::Double(d) => Some(Self::Double(*d)),
            _ => None,
        }
    }

    pub(crate) fn as_double(&self) -> f64 {
        match self {
            Self::Int64(i) => *i as f64,
            Self::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            Self::Double(d) => *d,
        }
    }
}

/// Compare two non-null literals of comparable kinds
///
/// Returns `None` only for unordered doubles (NaN operands).  Literals
/// of incomparable kinds are an expression error.
pub(crate) fn compare(left: &Literal, right: &Literal) -> Result<Option<Ordering>> {
    if let (Some(a), Some(b)) = (Numeric::from_literal(left), Numeric::from_literal(right)) {
        return Ok(compare_numeric(&a, &b));
    }
    let ordering = match (left, right) {
        (Literal::Boolean(a), Literal::Boolean(b)) => a.cmp(b),
        (Literal::String(a), Literal::String(b)) => a.cmp(b),
        (Literal::Guid(a), Literal::Guid(b)) => a.cmp(b),
        (Literal::Date(a), Literal::Date(b)) => a.cmp(b),
        (Literal::DateTimeOffset(a), Literal::DateTimeOffset(b)) => a.cmp(b),
        (Literal::TimeOfDay(a), Literal::TimeOfDay(b)) => a.cmp(b),
        (Literal::Duration(a), Literal::Duration(b)) => a.cmp(b),
        (Literal::Binary(a), Literal::Binary(b)) => a.cmp(b),
        (Literal::Enum(a), Literal::Enum(b)) if a.qname == b.qname => {
            if a.members == b.members {
                Ordering::Equal
            } else {
                return Err(ODataError::expression(format!(
                    "enumeration values of {} are not ordered",
                    a.qname
                )));
            }
        }
        _ => {
            return Err(ODataError::expression(format!(
                "cannot compare {left} with {right}"
            )));
        }
    };
    Ok(Some(ordering))
}

fn compare_numeric(a: &Numeric, b: &Numeric) -> Option<Ordering> {
    match (a, b) {
        (Numeric::Int64(a), Numeric::Int64(b)) => Some(a.cmp(b)),
        (Numeric::Double(_), _) | (_, Numeric::Double(_)) => {
            a.as_double().partial_cmp(&b.as_double())
        }
        _ => Some(as_decimal(a).cmp(&as_decimal(b))),
    }
}

pub(crate) fn as_decimal(n: &Numeric) -> Decimal {
    match n {
        Numeric::Int64(i) => Decimal::from(*i),
        Numeric::Decimal(d) => *d,
        // unreachable on the decimal path; doubles compare as doubles
        Numeric::Double(d) => Decimal::try_from(*d).unwrap_or_default(),
    }
}

/// Equality over possibly-null operands: two nulls are equal, a null
/// and a value are not
pub(crate) fn equal(left: Option<&Literal>, right: Option<&Literal>) -> Result<bool> {
    match (left, right) {
        (None, None) => Ok(true),
        (None, Some(_)) | (Some(_), None) => Ok(false),
        (Some(Literal::Enum(a)), Some(Literal::Enum(b))) => Ok(a.qname == b.qname
            && a.members.iter().all(|m| b.members.contains(m))
            && b.members.iter().all(|m| a.members.contains(m))),
        (Some(a), Some(b)) => Ok(compare(a, b)? == Some(Ordering::Equal)),
    }
}
