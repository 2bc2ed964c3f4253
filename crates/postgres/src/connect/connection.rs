//! Postgres connection component
//!
//! Owns one `sqlx` pool. A connection can be shared by several persistence
//! components through `Arc<dyn ConnectionProvider>`; each of them then sees the
//! same pool, and only the owner is expected to close it.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::config::{Configurable, PersistenceConfig, PersistenceOptions};
use common::error::PersistenceError;
use common::refer::{Referenceable, References};

use crate::client::SqlClient;
use crate::connect::{ComposedConfig, PostgresConnectionResolver};
use crate::error::CONNECT_FAILED;

/// Lifecycle and client access of a database connection
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Open the connection; no-op when already open
    async fn open(&self, correlation_id: Option<&str>) -> Result<(), PersistenceError>;

    /// Close the connection; no-op when not open
    async fn close(&self, correlation_id: Option<&str>) -> Result<(), PersistenceError>;

    async fn is_open(&self) -> bool;

    /// Client handle, available only while open
    async fn client(&self) -> Option<Arc<dyn SqlClient>>;

    /// Name of the database the connection points at
    async fn database_name(&self) -> Option<String>;
}

struct OpenPool {
    pool: PgPool,
    database_name: Option<String>,
}

/// Connection to a PostgreSQL server
///
/// ### Configuration
///
/// - `connection(s)` / `credential(s)`: see [`PostgresConnectionResolver`]
/// - `options.max_pool_size`: maximum number of pooled connections (default: 2)
/// - `options.connect_timeout`: milliseconds to wait for a connection (default: 5000)
/// - `options.idle_timeout`: milliseconds before an idle connection is closed (default: 10000)
pub struct PostgresConnection {
    resolver: PostgresConnectionResolver,
    options: PersistenceOptions,
    state: RwLock<Option<OpenPool>>,
}

impl Default for PostgresConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresConnection {
    pub fn new() -> Self {
        Self {
            resolver: PostgresConnectionResolver::new(),
            options: PersistenceOptions::default(),
            state: RwLock::new(None),
        }
    }

    pub fn options(&self) -> &PersistenceOptions {
        &self.options
    }

    /// Driver options for composed settings
    ///
    /// The connection string is parsed first; discrete host, port and
    /// database only apply without one. Credentials always override.
    pub fn connect_options(
        correlation_id: Option<&str>,
        config: &ComposedConfig,
    ) -> Result<PgConnectOptions, PersistenceError> {
        let mut options = match config.connection_string.as_deref() {
            Some(uri) => PgConnectOptions::from_str(uri).map_err(|e| {
                PersistenceError::connection(
                    correlation_id,
                    CONNECT_FAILED,
                    "Connection string is not valid",
                    e,
                )
            })?,
            None => {
                let mut options = PgConnectOptions::new();
                if let Some(host) = config.host.as_deref() {
                    options = options.host(host);
                }
                if let Some(port) = config.port {
                    options = options.port(port);
                }
                if let Some(database) = config.database.as_deref() {
                    options = options.database(database);
                }
                options
            }
        };

        if let Some(user) = config.user.as_deref() {
            options = options.username(user);
        }
        if let Some(password) = config.password.as_deref() {
            options = options.password(password);
        }

        Ok(options)
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.options.max_pool_size)
            .acquire_timeout(self.options.connect_timeout())
            .idle_timeout(self.options.idle_timeout())
    }
}

#[async_trait]
impl ConnectionProvider for PostgresConnection {
    async fn open(&self, correlation_id: Option<&str>) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if state.is_some() {
            return Ok(());
        }

        let config = self.resolver.resolve(correlation_id).await?;
        let connect_options = Self::connect_options(correlation_id, &config)?;
        let database_name = connect_options.get_database().map(str::to_string);

        debug!(
            correlation_id = ?correlation_id,
            max_connections = self.options.max_pool_size,
            "Connecting to postgres"
        );

        let pool = self
            .pool_options()
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                PersistenceError::connection(
                    correlation_id,
                    CONNECT_FAILED,
                    "Connection to postgres failed",
                    e,
                )
            })?;

        info!(
            correlation_id = ?correlation_id,
            database = ?database_name,
            "Connected to postgres database"
        );

        *state = Some(OpenPool {
            pool,
            database_name,
        });
        Ok(())
    }

    async fn close(&self, correlation_id: Option<&str>) -> Result<(), PersistenceError> {
        let Some(open) = self.state.write().await.take() else {
            return Ok(());
        };

        open.pool.close().await;
        info!(
            correlation_id = ?correlation_id,
            database = ?open.database_name,
            "Disconnected from postgres database"
        );
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn client(&self) -> Option<Arc<dyn SqlClient>> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|open| Arc::new(open.pool.clone()) as Arc<dyn SqlClient>)
    }

    async fn database_name(&self) -> Option<String> {
        self.state
            .read()
            .await
            .as_ref()
            .and_then(|open| open.database_name.clone())
    }
}

impl Configurable for PostgresConnection {
    fn configure(&mut self, config: &PersistenceConfig) {
        self.resolver.configure(config);
        self.options = config.options.clone();
    }
}

impl Referenceable for PostgresConnection {
    fn set_references(&mut self, references: &References) {
        self.resolver.set_references(references);
    }
}
