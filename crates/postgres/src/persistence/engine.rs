//! Table-backed persistence engine
//!
//! [`PostgresPersistence`] owns the lifecycle of one table: it obtains a
//! connection (injected or created locally), bootstraps the schema the first
//! time the table is seen, and offers generic filtered queries. Concrete
//! tables plug in through a [`TableModel`].
//!
//! ### Configuration
//!
//! - `collection` / `table`: table name (`table` wins)
//! - `dependencies.connection`: locator of a shared connection
//!   (default: `*:connection:postgres:*:1.0`)
//! - `connection(s)` / `credential(s)`: used by a locally created connection
//! - `options.max_page_size`: maximum items per page (default: 100)
//! - `options.max_pool_size`, `options.connect_timeout`, `options.idle_timeout`

use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use common::config::{Configurable, PersistenceConfig, DEFAULT_CONNECTION_DEPENDENCY};
use common::error::{PersistenceError, PersistenceResult};
use common::persistence::{DataPage, PagingParams};
use common::refer::{Descriptor, Referenceable, References};

use crate::client::{Row, SqlClient};
use crate::connect::{ConnectionProvider, PostgresConnection};
use crate::error::{
    conversion_error, query_error, CONNECT_FAILED, NOT_OPENED, NO_CONNECTION, NO_TABLE_NAME,
};
use crate::persistence::query::{
    fragment, generate_columns, generate_parameters, generate_values, push_order_by, push_where,
    quote_identifier,
};
use crate::persistence::{SchemaBuilder, TableModel};

const TABLE_EXISTS_QUERY: &str = "SELECT to_regclass($1)::text AS to_regclass";

/// Lifecycle state of a persistence component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Persistence for one PostgreSQL table
pub struct PostgresPersistence<M: TableModel> {
    model: M,
    table_name: String,
    max_page_size: i64,
    config: Option<PersistenceConfig>,
    references: Option<References>,
    connection: Option<Arc<dyn ConnectionProvider>>,
    local_connection: bool,
    client: Option<Arc<dyn SqlClient>>,
    database_name: Option<String>,
    schema: SchemaBuilder,
    state: PersistenceState,
}

impl<M: TableModel> PostgresPersistence<M> {
    pub fn new(table_name: impl Into<String>, model: M) -> Self {
        let table_name = table_name.into();
        Self {
            model,
            schema: SchemaBuilder::new(table_name.clone()),
            table_name,
            max_page_size: 100,
            config: None,
            references: None,
            connection: None,
            local_connection: false,
            client: None,
            database_name: None,
            state: PersistenceState::Closed,
        }
    }

    /// Use a connection owned by someone else; it is never opened or closed here
    pub fn with_connection(mut self, connection: Arc<dyn ConnectionProvider>) -> Self {
        self.set_connection(connection, false);
        self
    }

    /// Replace the connection. An owned connection is opened and closed
    /// together with this component.
    pub fn set_connection(&mut self, connection: Arc<dyn ConnectionProvider>, owned: bool) {
        self.connection = Some(connection);
        self.local_connection = owned;
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn max_page_size(&self) -> i64 {
        self.max_page_size
    }

    pub fn state(&self) -> PersistenceState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == PersistenceState::Open
    }

    /// Whether the current connection was created (and is closed) by this component
    pub fn owns_connection(&self) -> bool {
        self.connection.is_some() && self.local_connection
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    /// Statements collected by the last open
    pub fn schema(&self) -> &SchemaBuilder {
        &self.schema
    }

    pub fn configure(&mut self, config: &PersistenceConfig) {
        self.max_page_size = config.options.max_page_size;
        if let Some(table_name) = config.table_name() {
            self.table_name = table_name.to_string();
        }
        self.config = Some(config.clone());
    }

    /// Find a shared connection by `dependencies.connection`, or create a local one
    pub fn set_references(&mut self, references: &References) {
        self.references = Some(references.clone());

        let dependency = self
            .config
            .as_ref()
            .map(|config| config.dependencies.connection.as_str())
            .unwrap_or(DEFAULT_CONNECTION_DEPENDENCY);

        let shared = match dependency.parse::<Descriptor>() {
            Ok(locator) => references.get_component::<PostgresConnection>(&locator),
            Err(e) => {
                warn!(
                    table = %self.table_name,
                    dependency = %dependency,
                    error = %e,
                    "Ignoring malformed connection dependency"
                );
                None
            }
        };

        match shared {
            Some(connection) => self.set_connection(connection, false),
            None => {
                let connection = Arc::new(self.create_connection());
                self.set_connection(connection, true);
            }
        }
    }

    pub fn unset_references(&mut self) {
        self.connection = None;
    }

    fn create_connection(&self) -> PostgresConnection {
        let mut connection = PostgresConnection::new();
        if let Some(config) = &self.config {
            connection.configure(config);
        }
        if let Some(references) = &self.references {
            connection.set_references(references);
        }
        connection
    }

    pub async fn open(&mut self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        if self.state == PersistenceState::Open {
            return Ok(());
        }

        self.state = PersistenceState::Opening;
        match self.open_connection(correlation_id).await {
            Ok(()) => {
                self.state = PersistenceState::Open;
                debug!(
                    correlation_id = ?correlation_id,
                    database = ?self.database_name,
                    table = %quote_identifier(&self.table_name),
                    "Connected to postgres database"
                );
                Ok(())
            }
            Err(e) => {
                self.state = PersistenceState::Closed;
                self.client = None;
                Err(e)
            }
        }
    }

    async fn open_connection(&mut self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        if self.connection.is_none() {
            let connection = Arc::new(self.create_connection());
            self.set_connection(connection, true);
        }

        let connection = self.connection.clone().ok_or_else(|| {
            PersistenceError::invalid_state(
                correlation_id,
                NO_CONNECTION,
                "PostgreSQL connection is missing",
            )
        })?;

        if self.local_connection {
            connection.open(correlation_id).await?;
        }

        let result = self.bootstrap(correlation_id, connection.as_ref()).await;
        if result.is_err() && self.local_connection {
            if let Err(e) = connection.close(correlation_id).await {
                warn!(
                    correlation_id = ?correlation_id,
                    error = %e,
                    "Failed to close connection after unsuccessful open"
                );
            }
        }
        result
    }

    async fn bootstrap(
        &mut self,
        correlation_id: Option<&str>,
        connection: &dyn ConnectionProvider,
    ) -> PersistenceResult<()> {
        let not_opened = || {
            PersistenceError::connection(
                correlation_id,
                CONNECT_FAILED,
                "PostgreSQL connection is not opened",
                "connection is closed",
            )
        };

        if !connection.is_open().await {
            return Err(not_opened());
        }
        let client = connection.client().await.ok_or_else(not_opened)?;
        self.database_name = connection.database_name().await;

        self.schema = SchemaBuilder::new(self.table_name.clone());
        self.model.define_schema(&mut self.schema);
        self.create_schema(correlation_id, client.as_ref()).await?;

        self.client = Some(client);
        Ok(())
    }

    /// Run schema statements unless the table already exists
    async fn create_schema(
        &self,
        correlation_id: Option<&str>,
        client: &dyn SqlClient,
    ) -> PersistenceResult<()> {
        if self.schema.is_empty() {
            return Ok(());
        }

        let rows = client
            .fetch(
                TABLE_EXISTS_QUERY,
                &[Value::String(quote_identifier(&self.table_name))],
            )
            .await
            .map_err(|e| query_error(correlation_id, &self.table_name, "checking table", e))?;

        let exists = rows
            .first()
            .and_then(|row| row.get("to_regclass"))
            .is_some_and(|value| !value.is_null());
        if exists {
            return Ok(());
        }

        debug!(
            correlation_id = ?correlation_id,
            table = %self.table_name,
            "Table does not exist. Creating database objects..."
        );

        for statement in self.schema.statements() {
            if let Err(e) = client.execute(statement, &[]).await {
                error!(
                    correlation_id = ?correlation_id,
                    table = %self.table_name,
                    statement = %statement,
                    error = %e,
                    "Failed to autocreate database object"
                );
                return Err(query_error(
                    correlation_id,
                    &self.table_name,
                    "creating database objects",
                    e,
                ));
            }
        }

        Ok(())
    }

    pub async fn close(&mut self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        if self.state != PersistenceState::Open {
            return Ok(());
        }

        let connection = self.connection.clone().ok_or_else(|| {
            PersistenceError::invalid_state(
                correlation_id,
                NO_CONNECTION,
                "PostgreSQL connection is missing",
            )
        })?;

        self.state = PersistenceState::Closing;
        if self.local_connection {
            if let Err(e) = connection.close(correlation_id).await {
                self.state = PersistenceState::Open;
                return Err(e);
            }
        }

        self.state = PersistenceState::Closed;
        self.client = None;
        Ok(())
    }

    /// Client of the open connection
    pub fn client(&self, correlation_id: Option<&str>) -> PersistenceResult<Arc<dyn SqlClient>> {
        match (&self.state, &self.client) {
            (PersistenceState::Open, Some(client)) => Ok(client.clone()),
            _ => Err(PersistenceError::invalid_state(
                correlation_id,
                NOT_OPENED,
                format!("Persistence for {} is not opened", self.table_name),
            )),
        }
    }

    /// Delete every row of the table
    pub async fn clear(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        if self.table_name.is_empty() {
            return Err(PersistenceError::operation(
                correlation_id,
                NO_TABLE_NAME,
                "Table name is not defined",
            ));
        }

        let client = self.client(correlation_id)?;
        let query = format!("DELETE FROM {}", quote_identifier(&self.table_name));
        client.execute(&query, &[]).await.map_err(|e| {
            PersistenceError::connection(
                correlation_id,
                CONNECT_FAILED,
                "Connection to postgres failed",
                e,
            )
        })?;
        Ok(())
    }

    pub(crate) fn to_item(
        &self,
        correlation_id: Option<&str>,
        row: Row,
    ) -> PersistenceResult<M::Item> {
        self.model
            .to_public(row)
            .map_err(|e| conversion_error(correlation_id, &self.table_name, e))
    }

    pub(crate) fn to_items(
        &self,
        correlation_id: Option<&str>,
        rows: Vec<Row>,
    ) -> PersistenceResult<Vec<M::Item>> {
        rows.into_iter()
            .map(|row| self.to_item(correlation_id, row))
            .collect()
    }

    pub(crate) fn to_row(
        &self,
        correlation_id: Option<&str>,
        item: &M::Item,
    ) -> PersistenceResult<Row> {
        self.model
            .from_public(item)
            .map_err(|e| conversion_error(correlation_id, &self.table_name, e))
    }

    async fn count(
        &self,
        correlation_id: Option<&str>,
        client: &dyn SqlClient,
        filter: Option<&str>,
    ) -> PersistenceResult<i64> {
        let mut query = format!(
            "SELECT COUNT(*) AS count FROM {}",
            quote_identifier(&self.table_name)
        );
        push_where(&mut query, filter);

        let rows = client
            .fetch(&query, &[])
            .await
            .map_err(|e| query_error(correlation_id, &self.table_name, "counting items", e))?;

        Ok(match rows.as_slice() {
            [row] => row.get("count").and_then(Value::as_i64).unwrap_or(0),
            _ => 0,
        })
    }

    /// One page of items matching a filter
    ///
    /// `filter`, `sort` and `select` are SQL fragments used verbatim.
    pub async fn get_page_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Option<&str>,
        paging: Option<&PagingParams>,
        sort: Option<&str>,
        select: Option<&str>,
    ) -> PersistenceResult<DataPage<M::Item>> {
        let client = self.client(correlation_id)?;

        let paging = paging.cloned().unwrap_or_default();
        let skip = paging.get_skip(-1);
        let take = paging.get_take(self.max_page_size);

        let mut query = format!(
            "SELECT {} FROM {}",
            fragment(select).unwrap_or("*"),
            quote_identifier(&self.table_name)
        );
        push_where(&mut query, filter);
        push_order_by(&mut query, sort);
        if skip >= 0 {
            query.push_str(&format!(" OFFSET {skip}"));
        }
        query.push_str(&format!(" LIMIT {take}"));

        let rows = client
            .fetch(&query, &[])
            .await
            .map_err(|e| query_error(correlation_id, &self.table_name, "reading page", e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name,
            count = rows.len(),
            "Retrieved page"
        );
        let items = self.to_items(correlation_id, rows)?;

        let total = if paging.total {
            Some(self.count(correlation_id, client.as_ref(), filter).await?)
        } else {
            None
        };

        Ok(DataPage::new(items, total))
    }

    pub async fn get_count_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Option<&str>,
    ) -> PersistenceResult<i64> {
        let client = self.client(correlation_id)?;
        let count = self.count(correlation_id, client.as_ref(), filter).await?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name,
            count,
            "Counted items"
        );
        Ok(count)
    }

    /// Every item matching a filter, without paging
    pub async fn get_list_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Option<&str>,
        sort: Option<&str>,
        select: Option<&str>,
    ) -> PersistenceResult<Vec<M::Item>> {
        let client = self.client(correlation_id)?;

        let mut query = format!(
            "SELECT {} FROM {}",
            fragment(select).unwrap_or("*"),
            quote_identifier(&self.table_name)
        );
        push_where(&mut query, filter);
        push_order_by(&mut query, sort);

        let rows = client
            .fetch(&query, &[])
            .await
            .map_err(|e| query_error(correlation_id, &self.table_name, "reading list", e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name,
            count = rows.len(),
            "Retrieved list"
        );
        self.to_items(correlation_id, rows)
    }

    /// A random item matching a filter
    ///
    /// Counts first and then reads at a random offset; rows written between
    /// the two queries can shift the result or make it come back empty.
    pub async fn get_one_random(
        &self,
        correlation_id: Option<&str>,
        filter: Option<&str>,
    ) -> PersistenceResult<Option<M::Item>> {
        let client = self.client(correlation_id)?;
        let count = self.count(correlation_id, client.as_ref(), filter).await?;
        let position = if count > 0 {
            rand::thread_rng().gen_range(0..count)
        } else {
            0
        };

        let mut query = format!("SELECT * FROM {}", quote_identifier(&self.table_name));
        push_where(&mut query, filter);
        query.push_str(&format!(" OFFSET {position} LIMIT 1"));

        let rows = client
            .fetch(&query, &[])
            .await
            .map_err(|e| query_error(correlation_id, &self.table_name, "reading random item", e))?;

        match rows.into_iter().next() {
            Some(row) => {
                trace!(
                    correlation_id = ?correlation_id,
                    table = %self.table_name,
                    "Retrieved random item"
                );
                self.to_item(correlation_id, row).map(Some)
            }
            None => {
                trace!(
                    correlation_id = ?correlation_id,
                    table = %self.table_name,
                    "Random item wasn't found"
                );
                Ok(None)
            }
        }
    }

    /// Insert an item and return it as stored
    ///
    /// An item that converts to an empty row is not written and yields `None`.
    pub async fn create(
        &self,
        correlation_id: Option<&str>,
        item: &M::Item,
    ) -> PersistenceResult<Option<M::Item>> {
        let client = self.client(correlation_id)?;
        let row = self.to_row(correlation_id, item)?;
        if row.is_empty() {
            return Ok(None);
        }

        let query = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quote_identifier(&self.table_name),
            generate_columns(row.keys()),
            generate_parameters(row.keys())
        );

        let rows = client
            .fetch(&query, &generate_values(&row))
            .await
            .map_err(|e| query_error(correlation_id, &self.table_name, "creating item", e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name,
            id = ?row.get("id"),
            "Created item"
        );

        rows.into_iter()
            .next()
            .map(|row| self.to_item(correlation_id, row))
            .transpose()
    }

    /// Delete items matching a filter and return how many were removed
    pub async fn delete_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Option<&str>,
    ) -> PersistenceResult<u64> {
        let client = self.client(correlation_id)?;

        let mut query = format!("DELETE FROM {}", quote_identifier(&self.table_name));
        push_where(&mut query, filter);

        let count = client
            .execute(&query, &[])
            .await
            .map_err(|e| query_error(correlation_id, &self.table_name, "deleting items", e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name,
            count,
            "Deleted items"
        );
        Ok(count)
    }
}

impl<M: TableModel> Configurable for PostgresPersistence<M> {
    fn configure(&mut self, config: &PersistenceConfig) {
        PostgresPersistence::configure(self, config);
    }
}

impl<M: TableModel> Referenceable for PostgresPersistence<M> {
    fn set_references(&mut self, references: &References) {
        PostgresPersistence::set_references(self, references);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::RowModel;
    use common::config::ConnectionParams;
    use common::error::ComponentError;

    #[test]
    fn test_configure_table_and_page_size() {
        let mut persistence = PostgresPersistence::new("dummies", RowModel::new());
        assert_eq!(persistence.table_name(), "dummies");
        assert_eq!(persistence.max_page_size(), 100);

        let mut config = PersistenceConfig {
            collection: Some("legacy".to_string()),
            ..Default::default()
        };
        config.options.max_page_size = 10;
        persistence.configure(&config);
        assert_eq!(persistence.table_name(), "legacy");
        assert_eq!(persistence.max_page_size(), 10);

        config.table = Some("modern".to_string());
        persistence.configure(&config);
        assert_eq!(persistence.table_name(), "modern");
    }

    #[tokio::test]
    async fn test_data_operations_require_open() {
        let persistence = PostgresPersistence::new("dummies", RowModel::new());
        assert_eq!(persistence.state(), PersistenceState::Closed);

        let err = persistence.get_count_by_filter(Some("1"), None).await.unwrap_err();
        assert_eq!(err.code(), NOT_OPENED);
        assert_eq!(err.correlation_id(), Some("1"));

        let err = persistence
            .get_page_by_filter(None, None, None, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), NOT_OPENED);
        assert_eq!(persistence.clear(None).await.unwrap_err().code(), NOT_OPENED);
    }

    #[tokio::test]
    async fn test_clear_without_table_name() {
        let persistence = PostgresPersistence::new("", RowModel::new());
        let err = persistence.clear(None).await.unwrap_err();
        assert_eq!(err.code(), NO_TABLE_NAME);
    }

    #[tokio::test]
    async fn test_set_references_creates_local_connection() {
        let mut persistence = PostgresPersistence::new("dummies", RowModel::new());
        persistence.set_references(&References::new());
        assert!(persistence.owns_connection());

        persistence.unset_references();
        assert!(!persistence.owns_connection());
    }

    #[tokio::test]
    async fn test_set_references_uses_shared_connection() {
        let mut references = References::new();
        references.put_component(
            Descriptor::new("app", "connection", "postgres", "default", "1.0"),
            Arc::new(PostgresConnection::new()),
        );

        let mut persistence = PostgresPersistence::new("dummies", RowModel::new());
        persistence.set_references(&references);
        assert!(!persistence.owns_connection());
    }

    #[tokio::test]
    async fn test_failed_open_returns_to_closed() {
        let mut persistence = PostgresPersistence::new("dummies", RowModel::new());
        persistence.configure(&PersistenceConfig {
            connection: Some(ConnectionParams::from_host("localhost", 5432, "")),
            ..Default::default()
        });

        let err = persistence.open(Some("open")).await.unwrap_err();
        assert_eq!(err.code(), "NO_DATABASE");
        assert_eq!(persistence.state(), PersistenceState::Closed);
        assert!(persistence.owns_connection());

        // Closing a component that never opened does nothing
        persistence.close(None).await.unwrap();
    }
}
