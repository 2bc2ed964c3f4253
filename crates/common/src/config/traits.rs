//! # Configuration Traits
//!
//! Core traits for components that accept configuration.

use crate::config::PersistenceConfig;

/// Component that can be (re)configured
///
/// Calling `configure` again replaces the previous configuration.
pub trait Configurable {
    fn configure(&mut self, config: &PersistenceConfig);
}
