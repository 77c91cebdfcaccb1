//! Primitive type kinds of the Edm namespace

use std::fmt;

/// The primitive types of the Edm namespace
///
/// `PrimitiveType` is the abstract base of all the others; every
/// concrete primitive type is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// The abstract base type `Edm.PrimitiveType`
    PrimitiveType,
    Binary,
    Boolean,
    Byte,
    Date,
    DateTimeOffset,
    Decimal,
    Double,
    Duration,
    Guid,
    Int16,
    Int32,
    Int64,
    SByte,
    Single,
    Stream,
    String,
    TimeOfDay,
}

impl PrimitiveKind {
    /// The unqualified type name within the Edm namespace
    pub fn name(self) -> &'static str {
        match self {
            Self::PrimitiveType => "PrimitiveType",
            Self::Binary => "Binary",
            Self::Boolean => "Boolean",
            Self::Byte => "Byte",
            Self::Date => "Date",
            Self::DateTimeOffset => "DateTimeOffset",
            Self::Decimal => "Decimal",
            Self::Double => "Double",
            Self::Duration => "Duration",
            Self::Guid => "Guid",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::SByte => "SByte",
            Self::Single => "Single",
            Self::Stream => "Stream",
            Self::String => "String",
            Self::TimeOfDay => "TimeOfDay",
        }
    }

    /// True for whole-number types
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::SByte | Self::Int16 | Self::Int32 | Self::Int64
        )
    }

    /// True for binary floating point types
    pub fn is_floating(self) -> bool {
        matches!(self, Self::Single | Self::Double)
    }

    /// True for any numeric type, including `Decimal`
    pub fn is_numeric(self) -> bool {
        self.is_integral() || self.is_floating() || self == Self::Decimal
    }

    /// True for the types usable in entity keys
    pub fn is_key_type(self) -> bool {
        matches!(
            self,
            Self::Boolean
                | Self::Byte
                | Self::SByte
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Decimal
                | Self::Date
                | Self::DateTimeOffset
                | Self::Guid
                | Self::String
        )
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Edm.{}", self.name())
    }
}
