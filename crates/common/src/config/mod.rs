//! # Configuration
//!
//! Layered configuration loading and the configuration types shared by the
//! connection resolver and persistence components.

pub mod loader;
pub mod traits;
pub mod types;

pub use loader::*;
pub use traits::*;
pub use types::*;
