//! Name resolution shared by the evaluator and the checker

use odata_ast::Literal;
use odata_types::{TypeRef, edm};

/// Look up an `Edm` namespace type by its unqualified name
pub(crate) fn edm_type(name: &str) -> Option<&'static TypeRef> {
    let e = edm();
    Some(match name {
        "PrimitiveType" => &e.primitive_type,
        "Binary" => &e.binary,
        "Boolean" => &e.boolean,
        "Byte" => &e.byte,
        "Date" => &e.date,
        "DateTimeOffset" => &e.date_time_offset,
        "Decimal" => &e.decimal,
        "Double" => &e.double,
        "Duration" => &e.duration,
        "Guid" => &e.guid,
        "Int16" => &e.int16,
        "Int32" => &e.int32,
        "Int64" => &e.int64,
        "SByte" => &e.sbyte,
        "Single" => &e.single,
        "Stream" => &e.stream,
        "String" => &e.string,
        "TimeOfDay" => &e.time_of_day,
        "ComplexType" => &e.complex_type,
        "EntityType" => &e.entity_type,
        _ => return None,
    })
}

/// The Edm type a non-null, non-enumeration literal carries
pub(crate) fn literal_type(lit: &Literal) -> Option<&'static TypeRef> {
    let e = edm();
    Some(match lit {
        Literal::Boolean(_) => &e.boolean,
        Literal::Int64(_) => &e.int64,
        Literal::Decimal(_) => &e.decimal,
        Literal::Double(_) => &e.double,
        Literal::String(_) => &e.string,
        Literal::Guid(_) => &e.guid,
        Literal::Date(_) => &e.date,
        Literal::DateTimeOffset(_) => &e.date_time_offset,
        Literal::TimeOfDay(_) => &e.time_of_day,
        Literal::Duration(_) => &e.duration,
        Literal::Binary(_) => &e.binary,
        Literal::Null | Literal::Enum(_) => return None,
    })
}
