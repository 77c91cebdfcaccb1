//! The built-in Edm namespace
//!
//! One shared instance of each Edm type, created lazily.  All concrete
//! primitive types are derived from the abstract `Edm.PrimitiveType`;
//! complex and entity types built with the type builders default to
//! `Edm.ComplexType` and `Edm.EntityType` as their base.

use crate::{PrimitiveKind, TypeDef, TypeRef};
use once_cell::sync::Lazy;

/// The shared Edm type instances
#[derive(Debug)]
pub struct Edm {
    /// Abstract base of all primitive types
    pub primitive_type: TypeRef,
    pub binary: TypeRef,
    pub boolean: TypeRef,
    pub byte: TypeRef,
    pub date: TypeRef,
    pub date_time_offset: TypeRef,
    pub decimal: TypeRef,
    pub double: TypeRef,
    pub duration: TypeRef,
    pub guid: TypeRef,
    pub int16: TypeRef,
    pub int32: TypeRef,
    pub int64: TypeRef,
    pub sbyte: TypeRef,
    pub single: TypeRef,
    pub stream: TypeRef,
    pub string: TypeRef,
    pub time_of_day: TypeRef,
    /// Abstract base of all complex types
    pub complex_type: TypeRef,
    /// Abstract base of all entity types
    pub entity_type: TypeRef,
}

static EDM: Lazy<Edm> = Lazy::new(|| {
    let primitive_type = TypeDef::primitive(PrimitiveKind::PrimitiveType, None);
    let derived = |kind| TypeDef::primitive(kind, Some(primitive_type.clone()));
    Edm {
        binary: derived(PrimitiveKind::Binary),
        boolean: derived(PrimitiveKind::Boolean),
        byte: derived(PrimitiveKind::Byte),
        date: derived(PrimitiveKind::Date),
        date_time_offset: derived(PrimitiveKind::DateTimeOffset),
        decimal: derived(PrimitiveKind::Decimal),
        double: derived(PrimitiveKind::Double),
        duration: derived(PrimitiveKind::Duration),
        guid: derived(PrimitiveKind::Guid),
        int16: derived(PrimitiveKind::Int16),
        int32: derived(PrimitiveKind::Int32),
        int64: derived(PrimitiveKind::Int64),
        sbyte: derived(PrimitiveKind::SByte),
        single: derived(PrimitiveKind::Single),
        stream: derived(PrimitiveKind::Stream),
        string: derived(PrimitiveKind::String),
        time_of_day: derived(PrimitiveKind::TimeOfDay),
        complex_type: TypeDef::structured_base("ComplexType", false),
        entity_type: TypeDef::structured_base("EntityType", true),
        primitive_type,
    }
});

/// Access the shared Edm namespace
pub fn edm() -> &'static Edm {
    &EDM
}

impl Edm {
    /// The shared instance for a primitive kind
    pub fn primitive(&self, kind: PrimitiveKind) -> &TypeRef {
        match kind {
            PrimitiveKind::PrimitiveType => &self.primitive_type,
            PrimitiveKind::Binary => &self.binary,
            PrimitiveKind::Boolean => &self.boolean,
            PrimitiveKind::Byte => &self.byte,
            PrimitiveKind::Date => &self.date,
            PrimitiveKind::DateTimeOffset => &self.date_time_offset,
            PrimitiveKind::Decimal => &self.decimal,
            PrimitiveKind::Double => &self.double,
            PrimitiveKind::Duration => &self.duration,
            PrimitiveKind::Guid => &self.guid,
            PrimitiveKind::Int16 => &self.int16,
            PrimitiveKind::Int32 => &self.int32,
            PrimitiveKind::Int64 => &self.int64,
            PrimitiveKind::SByte => &self.sbyte,
            PrimitiveKind::Single => &self.single,
            PrimitiveKind::Stream => &self.stream,
            PrimitiveKind::String => &self.string,
            PrimitiveKind::TimeOfDay => &self.time_of_day,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn primitive_instances_are_shared() {
        assert!(Arc::ptr_eq(
            edm().primitive(PrimitiveKind::Int32),
            &edm().int32
        ));
    }

    #[test]
    fn abstract_bases_are_abstract() {
        assert!(edm().primitive_type.is_abstract());
        assert!(edm().complex_type.is_abstract());
        assert!(edm().entity_type.is_abstract());
        assert!(!edm().string.is_abstract());
    }
}
