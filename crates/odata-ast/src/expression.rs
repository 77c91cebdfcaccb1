//! Expression tree definitions

use crate::Literal;
use odata_names::{Path, QualifiedName, TermRef, path_to_str};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operators of the expression language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Has,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Operator precedence, higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Has => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div | Self::Mod => 5,
        }
    }

    /// The keyword used in query-option text
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Has => "has",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Mod => "mod",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// Canonical functions callable in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Contains,
    StartsWith,
    EndsWith,
    Length,
    IndexOf,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    FractionalSeconds,
    TotalSeconds,
    Date,
    Time,
    TotalOffsetMinutes,
    MinDateTime,
    MaxDateTime,
    Now,
    Round,
    Floor,
    Ceiling,
}

impl Method {
    /// The function name used in query-option text
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Length => "length",
            Self::IndexOf => "indexof",
            Self::Substring => "substring",
            Self::ToLower => "tolower",
            Self::ToUpper => "toupper",
            Self::Trim => "trim",
            Self::Concat => "concat",
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::FractionalSeconds => "fractionalseconds",
            Self::TotalSeconds => "totalseconds",
            Self::Date => "date",
            Self::Time => "time",
            Self::TotalOffsetMinutes => "totaloffsetminutes",
            Self::MinDateTime => "mindatetime",
            Self::MaxDateTime => "maxdatetime",
            Self::Now => "now",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceiling => "ceiling",
        }
    }
}

/// One segment of a member (path traversal) expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberSegment {
    /// Property name
    Identifier(String),
    /// Type cast segment
    Cast(QualifiedName),
    /// Term cast segment (`@Ns.Term`)
    Term(TermRef),
    /// `$count`
    Count,
    /// Key predicate or function argument list; operands may be
    /// `Expression::Bind` for named arguments
    Args(Vec<Expression>),
    /// `any(v: expr)`; the parameterless form has no variable
    Any {
        var: Option<String>,
        predicate: Option<Box<Expression>>,
    },
    /// `all(v: expr)`
    All {
        var: String,
        predicate: Box<Expression>,
    },
}

/// A node in the common expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// A literal value
    Literal(Literal),
    /// `$root`
    Root,
    /// `$it`, the implicit variable
    It,
    /// A lambda or parameter variable reference
    Variable(String),
    /// A member chain rooted at the implicit variable, e.g.
    /// `Address/Schema.UKAddress/Postcode`
    Member(Vec<MemberSegment>),
    /// An annotation `<Path>` value
    PathValue(Path),
    /// An annotation `<AnnotationPath>` value
    AnnotationPath(Path),
    /// An annotation `<NavigationPropertyPath>` value
    NavigationPath(Path),
    /// An annotation `<PropertyPath>` value
    PropertyPath(Path),
    /// A labeled element reference
    Reference(QualifiedName),
    /// Unary operator application
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    /// Binary operator application
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Canonical function call
    Call {
        method: Method,
        args: Vec<Expression>,
    },
    /// `cast(type)` / `cast(expr,type)`
    Cast {
        type_name: QualifiedName,
        operand: Option<Box<Expression>>,
    },
    /// `isof(type)` / `isof(expr,type)`
    IsOf {
        type_name: QualifiedName,
        operand: Option<Box<Expression>>,
    },
    /// Conditional; the two-argument form (no `otherwise`) is only
    /// valid inside collection constructors
    If {
        test: Box<Expression>,
        then: Box<Expression>,
        otherwise: Option<Box<Expression>>,
    },
    /// Collection constructor
    Collection(Vec<Expression>),
    /// Record constructor
    Record(Vec<(String, Expression)>),
    /// A named argument binding, used inside `MemberSegment::Args`
    Bind {
        name: String,
        value: Box<Expression>,
    },
}

impl Expression {
    /// Shorthand for a literal node
    pub fn literal(lit: Literal) -> Self {
        Self::Literal(lit)
    }

    /// Shorthand for a boolean literal
    pub fn boolean(b: bool) -> Self {
        Self::Literal(Literal::Boolean(b))
    }

    /// Shorthand for an integer literal
    pub fn int64(i: i64) -> Self {
        Self::Literal(Literal::Int64(i))
    }

    /// Shorthand for a string literal
    pub fn string(s: impl Into<String>) -> Self {
        Self::Literal(Literal::String(s.into()))
    }

    /// Shorthand for the null literal
    pub fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    /// Shorthand for a single-property member expression
    pub fn property(name: impl Into<String>) -> Self {
        Self::Member(vec![MemberSegment::Identifier(name.into())])
    }

    /// Combine with another expression using a binary operator
    pub fn binary(self, op: BinaryOp, right: Expression) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    fn fmt_operand(&self, parent: BinaryOp, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary { op, .. } if op.precedence() < parent.precedence() => {
                write!(f, "({self})")
            }
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Root => write!(f, "$root"),
            Self::It => write!(f, "$it"),
            Self::Variable(name) => write!(f, "{name}"),
            Self::Member(segments) => {
                for (i, seg) in segments.iter().enumerate() {
                    match seg {
                        MemberSegment::Identifier(name) => {
                            if i > 0 {
                                write!(f, "/")?;
                            }
                            write!(f, "{name}")?;
                        }
                        MemberSegment::Cast(qname) => {
                            if i > 0 {
                                write!(f, "/")?;
                            }
                            write!(f, "{qname}")?;
                        }
                        MemberSegment::Term(term) => {
                            if i > 0 {
                                write!(f, "/")?;
                            }
                            write!(f, "{term}")?;
                        }
                        MemberSegment::Count => {
                            if i > 0 {
                                write!(f, "/")?;
                            }
                            write!(f, "$count")?;
                        }
                        MemberSegment::Args(args) => {
                            write!(f, "(")?;
                            for (j, arg) in args.iter().enumerate() {
                                if j > 0 {
                                    write!(f, ",")?;
                                }
                                write!(f, "{arg}")?;
                            }
                            write!(f, ")")?;
                        }
                        MemberSegment::Any { var, predicate } => {
                            if i > 0 {
                                write!(f, "/")?;
                            }
                            match (var, predicate) {
                                (Some(v), Some(p)) => write!(f, "any({v}:{p})")?,
                                _ => write!(f, "any()")?,
                            }
                        }
                        MemberSegment::All { var, predicate } => {
                            if i > 0 {
                                write!(f, "/")?;
                            }
                            write!(f, "all({var}:{predicate})")?;
                        }
                    }
                }
                Ok(())
            }
            Self::PathValue(path)
            | Self::AnnotationPath(path)
            | Self::NavigationPath(path)
            | Self::PropertyPath(path) => write!(f, "{}", path_to_str(path)),
            Self::Reference(qname) => write!(f, "{qname}"),
            Self::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "not {operand}"),
                UnaryOp::Negate => write!(f, "-{operand}"),
            },
            Self::Binary { op, left, right } => {
                left.fmt_operand(*op, f)?;
                write!(f, " {} ", op.keyword())?;
                right.fmt_operand(*op, f)
            }
            Self::Call { method, args } => {
                write!(f, "{}(", method.keyword())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Cast { type_name, operand } => match operand {
                Some(expr) => write!(f, "cast({expr},{type_name})"),
                None => write!(f, "cast({type_name})"),
            },
            Self::IsOf { type_name, operand } => match operand {
                Some(expr) => write!(f, "isof({expr},{type_name})"),
                None => write!(f, "isof({type_name})"),
            },
            Self::If {
                test,
                then,
                otherwise,
            } => match otherwise {
                Some(other) => write!(f, "if({test},{then},{other})"),
                None => write!(f, "if({test},{then})"),
            },
            Self::Collection(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{name}\":{value}")?;
                }
                write!(f, "}}")
            }
            Self::Bind { name, value } => write!(f, "{name}={value}"),
        }
    }
}
