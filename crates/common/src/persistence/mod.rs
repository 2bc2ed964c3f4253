//! # Persistence Abstractions
//!
//! Paging types shared by persistence components.

pub mod pagination;

pub use pagination::*;
