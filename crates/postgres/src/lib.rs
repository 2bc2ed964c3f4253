//! # Postgres Persistence
//!
//! Table-backed persistence on PostgreSQL.
//!
//! ## Components
//! - [`PostgresConnectionResolver`]: composes driver settings from configured,
//!   discovered and stored endpoints and credentials
//! - [`PostgresConnection`]: owns the `sqlx` pool
//! - [`PostgresPersistence`]: lifecycle, schema bootstrap and generic filtered
//!   queries for one table, specialized through a [`TableModel`]
//! - [`IdentifiablePostgresPersistence`]: id-keyed CRUD on top of the engine
//!
//! ```no_run
//! use common::config::PersistenceConfig;
//! use postgres_persistence::{PostgresPersistence, RowModel};
//!
//! # async fn run() -> Result<(), common::error::PersistenceError> {
//! let mut config = PersistenceConfig::default();
//! config.table = Some("dummies".to_string());
//!
//! let mut persistence = PostgresPersistence::new("dummies", RowModel::default());
//! persistence.configure(&config);
//! persistence.open(None).await?;
//! let total = persistence.get_count_by_filter(None, Some("\"key\" LIKE 'a%'")).await?;
//! persistence.close(None).await?;
//! # let _ = total;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connect;
pub mod error;
pub mod persistence;

pub use client::{Row, SqlClient};
pub use connect::{
    ComposedConfig, ConnectionProvider, PostgresConnection, PostgresConnectionFactory,
    PostgresConnectionResolver,
};
pub use persistence::{
    IdentifiableModel, IdentifiablePostgresPersistence, IndexOptions, PostgresPersistence,
    RowModel, SchemaBuilder, SerdeModel, TableModel,
};
