//! # Component References
//!
//! Descriptors and the registry components use to locate their dependencies.

pub mod descriptor;
pub mod references;

pub use descriptor::Descriptor;
pub use references::{Referenceable, References, Registry};
