//! The OData value hierarchy and client service contract
//!
//! This crate holds the data layer of the object model: typed values
//! built over the type system, the select/expand options that shape
//! them and the [`DataService`] trait a transport implements to back
//! bound values.
//!
//! Values are shared handles.  A transient value tree is built locally
//! and mutated freely; binding a value to a service turns it into a
//! cached window onto remote data that faults misses in on demand.

mod collection;
mod entity;
mod options;
mod service;
mod structured;
mod value;

pub use collection::ValueLoader;
pub use entity::EntityIter;
pub use service::{DataRequest, DataService, open};
pub use value::{
    AnnotationEvaluator, EntityBinding, Value, ValueSeed, WeakValue, install_annotation_evaluator,
};
