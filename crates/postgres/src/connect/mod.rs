//! # Postgres Connections
//!
//! Resolution of connection settings and the pool-owning connection component.

pub mod connection;
pub mod factory;
pub mod resolver;

pub use connection::{ConnectionProvider, PostgresConnection};
pub use factory::PostgresConnectionFactory;
pub use resolver::{ComposedConfig, PostgresConnectionResolver};
