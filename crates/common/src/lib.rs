//! # Common
//!
//! Shared building blocks for persistence components.
//!
//! ## Key Features
//! - Error taxonomy with stable codes and correlation ids
//! - Layered configuration loading (defaults, TOML, environment)
//! - Component references resolved by descriptor
//! - Connection and credential resolution with discovery / credential stores
//! - Skip/take paging types
//! - Logging initialization
//!
//! ## Design Principles
//! - Trait-based capabilities so external services can be swapped or mocked
//! - Serde support for every configuration type
//! - Errors implement Send + Sync for async compatibility

pub mod config;
pub mod connect;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod refer;

pub use config::*;
pub use error::*;
pub use persistence::{DataPage, PagingParams};
pub use refer::{Descriptor, Referenceable, References};

/// Version of the common crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(VERSION.chars().any(|c| c.is_ascii_digit()));
    }
}
