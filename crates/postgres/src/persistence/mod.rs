//! # Relational Persistence
//!
//! Generic table persistence built on the [`SqlClient`](crate::SqlClient) seam.

pub mod engine;
pub mod identifiable;
pub mod model;
pub mod query;
pub mod schema;

pub use engine::{PersistenceState, PostgresPersistence};
pub use identifiable::IdentifiablePostgresPersistence;
pub use model::{IdentifiableModel, RowModel, SerdeModel, TableModel};
pub use query::{
    generate_columns, generate_parameters, generate_set_parameters, generate_values,
    quote_identifier,
};
pub use schema::{IndexOptions, SchemaBuilder};
