//! EDM type system
//!
//! Types are immutable once built and shared through [`TypeRef`]
//! (an `Arc`).  Type identity is pointer identity: two entity types
//! with the same name declared in different models are different
//! types.  The closed [`TypeKind`] union covers primitives,
//! enumerations, structured types and the three collection-like
//! kinds used by bound values (collection, entity set, singleton).

mod annotations;
mod edm;
mod key;
mod model;
mod primitive;
mod type_system;

pub use annotations::*;
pub use edm::*;
pub use key::*;
pub use model::*;
pub use primitive::*;
pub use type_system::*;
