//! Client-side expression evaluation
//!
//! Two visitors share one walk over the common expression tree: the
//! [`TypeChecker`] judges each node with a type against the model and
//! the [`Evaluator`] judges it with a value against a live context.
//! Boolean operators follow OData's three-valued logic, `eq`/`ne` are
//! total over null and member chains traverse the same property, cast,
//! key-predicate and lambda segments the query layer renders.
//!
//! Call [`register_annotation_evaluator`] once to let values compute
//! their dynamic annotations through this crate.

mod check;
mod eval;
mod logic;
mod resolve;
mod visitor;

pub use check::TypeChecker;
pub use eval::{Evaluator, evaluate_annotation, register_annotation_evaluator};
pub use logic::{bool_and, bool_not, bool_or};
pub use visitor::{ExpressionVisitor, walk};
