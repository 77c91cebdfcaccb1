//! Query options engine
//!
//! A state-free matching algebra over `$select` and `$expand` rules
//! plus the option sets that compose them.  [`SelectItem`] and
//! [`ExpandItem`] are immutable rules matched against property
//! descriptions; [`EntityOptions`] and its extensions hold rule lists
//! and memoize the derived per-property lookups that drive structured
//! value caches.
//!
//! Option sets are shared by reference between sibling values for
//! efficiency; [`SharedExpandOptions`] is the shared handle and the
//! value layer forks (deep-clones) before the first mutation of an
//! inherited set.

mod expand;
mod options;
mod select;

pub use expand::*;
pub use options::*;
pub use select::*;
