//! Common expression AST
//!
//! This crate defines the pre-parsed expression tree shared by filters,
//! orderby clauses and computed annotations.  It is a pure data crate:
//! the tree is walked by the evaluator and type checker in `odata-eval`
//! and rendered back to query-option text by the `Display`
//! implementations here.

mod expression;
mod literal;

pub use expression::*;
pub use literal::*;
