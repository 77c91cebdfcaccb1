//! Literal values appearing in expressions

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use odata_names::QualifiedName;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// A literal expression value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// The `null` literal
    Null,
    /// Boolean literal
    Boolean(bool),
    /// Integer literal (widest representation)
    Int64(i64),
    /// Decimal literal
    Decimal(Decimal),
    /// Floating point literal
    Double(f64),
    /// String literal
    String(String),
    /// Guid literal
    Guid(String),
    /// Date literal
    Date(NaiveDate),
    /// Date and time with timezone offset
    DateTimeOffset(DateTime<FixedOffset>),
    /// Time of day
    TimeOfDay(NaiveTime),
    /// Duration in seconds
    Duration(Decimal),
    /// Binary literal
    Binary(Vec<u8>),
    /// Enumeration literal, e.g. `Schema.Color'Red,Blue'`
    Enum(EnumLiteral),
}

impl Literal {
    /// True for the `null` literal
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// An enumeration literal: a qualified type name plus one or more
/// member names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumLiteral {
    /// The enumeration type
    pub qname: QualifiedName,
    /// The selected members; more than one for flag enumerations
    pub members: SmallVec<[String; 1]>,
}

impl fmt::Display for EnumLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'{}'", self.qname, self.members.join(","))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Guid(g) => write!(f, "{g}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTimeOffset(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::TimeOfDay(t) => write!(f, "{t}"),
            Self::Duration(d) => write!(f, "duration'PT{d}S'"),
            Self::Binary(b) => {
                write!(f, "binary'")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                write!(f, "'")
            }
            Self::Enum(e) => write!(f, "{e}"),
        }
    }
}
