//! Client-side OData object model
//!
//! This crate ties the member crates together:
//! - names and paths (`names`)
//! - the common expression tree (`ast`)
//! - the type system and entity model (`types`)
//! - select/expand and system query options (`query`)
//! - the value hierarchy and service contract (`data`)
//! - expression evaluation and checking (`eval`)
//!
//! # Example
//!
//! ```ignore
//! use odata::data::{Value, open};
//!
//! let people = open(&service, "People")?;
//! for entity in people.iter_entities()? {
//!     let entity = entity?;
//!     println!("{}", entity.property("UserName")?.get_value().unwrap());
//! }
//! ```

// Re-export all public APIs from internal crates
pub use odata_ast as ast;
pub use odata_data as data;
pub use odata_diagnostics as diagnostics;
pub use odata_eval as eval;
pub use odata_names as names;
pub use odata_query as query;
pub use odata_types as types;

// Convenience re-exports
pub use odata_ast::{Expression, Literal};
pub use odata_data::{DataService, Value, open};
pub use odata_diagnostics::{ODataError, Result};
pub use odata_types::{EntityKey, EntityModel, TypeDef, TypeRef};
