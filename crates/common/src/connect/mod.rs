//! # Connection Resolution
//!
//! Embedded resolvers for connection endpoints and credentials, and the
//! discovery / credential-store capabilities they consult.

pub mod connection_resolver;
pub mod credential_resolver;
pub mod discovery;

pub use connection_resolver::ConnectionResolver;
pub use credential_resolver::CredentialResolver;
pub use discovery::{CredentialStore, Discovery, MemoryCredentialStore, MemoryDiscovery};
