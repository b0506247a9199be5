//! Distributed numbering and ghost exchange.
//!
//! [`IndexMap`] is one rank's view of a globally-numbered, partitioned index
//! set; [`Scatterer`] moves values between owners and ghost holders over the
//! transport layer. Both are build-once-read-many and are shared via `Arc`
//! by the linear-algebra containers.

pub mod index_map;
pub mod scatterer;

pub use index_map::IndexMap;
pub use scatterer::Scatterer;
