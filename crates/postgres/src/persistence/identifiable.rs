//! Id-keyed CRUD on top of [`PostgresPersistence`].
//!
//! Rows are keyed by an `"id"` column. Ids are always bound parameters.

use serde_json::Value;
use std::ops::{Deref, DerefMut};
use tracing::trace;

use common::error::PersistenceResult;

use crate::client::Row;
use crate::error::query_error;
use crate::persistence::query::{
    generate_columns, generate_parameters, generate_set_parameters, generate_values,
    placeholders, quote_identifier,
};
use crate::persistence::{IdentifiableModel, PostgresPersistence};

/// Persistence for tables whose items carry a unique `id`
///
/// Dereferences to the underlying [`PostgresPersistence`] for lifecycle and
/// filtered queries.
pub struct IdentifiablePostgresPersistence<M: IdentifiableModel> {
    inner: PostgresPersistence<M>,
}

impl<M: IdentifiableModel> Deref for IdentifiablePostgresPersistence<M> {
    type Target = PostgresPersistence<M>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<M: IdentifiableModel> DerefMut for IdentifiablePostgresPersistence<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<M: IdentifiableModel> IdentifiablePostgresPersistence<M> {
    pub fn new(table_name: impl Into<String>, model: M) -> Self {
        Self {
            inner: PostgresPersistence::new(table_name, model),
        }
    }

    fn table(&self) -> String {
        quote_identifier(self.inner.table_name())
    }

    fn first_item(
        &self,
        correlation_id: Option<&str>,
        rows: Vec<Row>,
    ) -> PersistenceResult<Option<M::Item>> {
        rows.into_iter()
            .next()
            .map(|row| self.inner.to_item(correlation_id, row))
            .transpose()
    }

    /// Items whose ids are in the list, in no particular order
    pub async fn get_list_by_ids(
        &self,
        correlation_id: Option<&str>,
        ids: &[String],
    ) -> PersistenceResult<Vec<M::Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.inner.client(correlation_id)?;

        let query = format!(
            "SELECT * FROM {} WHERE \"id\" IN ({})",
            self.table(),
            placeholders(1, ids.len())
        );
        let params: Vec<Value> = ids.iter().cloned().map(Value::String).collect();

        let rows = client
            .fetch(&query, &params)
            .await
            .map_err(|e| query_error(correlation_id, self.table_name(), "reading items by ids", e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name(),
            count = rows.len(),
            "Retrieved items by ids"
        );
        self.inner.to_items(correlation_id, rows)
    }

    pub async fn get_one_by_id(
        &self,
        correlation_id: Option<&str>,
        id: &str,
    ) -> PersistenceResult<Option<M::Item>> {
        let client = self.inner.client(correlation_id)?;
        let query = format!("SELECT * FROM {} WHERE \"id\"=$1", self.table());

        let rows = client
            .fetch(&query, &[Value::from(id)])
            .await
            .map_err(|e| query_error(correlation_id, self.table_name(), "reading item", e))?;

        let item = self.first_item(correlation_id, rows)?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name(),
            id = %id,
            found = item.is_some(),
            "Retrieved item by id"
        );
        Ok(item)
    }

    /// Insert an item, generating an id when it has none
    pub async fn create(
        &self,
        correlation_id: Option<&str>,
        item: M::Item,
    ) -> PersistenceResult<Option<M::Item>> {
        let item = self.ensure_id(item);
        self.inner.create(correlation_id, &item).await
    }

    /// Insert an item or replace the one with the same id
    pub async fn set(
        &self,
        correlation_id: Option<&str>,
        item: M::Item,
    ) -> PersistenceResult<Option<M::Item>> {
        let client = self.inner.client(correlation_id)?;
        let item = self.ensure_id(item);
        let row = self.inner.to_row(correlation_id, &item)?;
        if row.is_empty() {
            return Ok(None);
        }

        // A row holding only the id still touches it so RETURNING yields the row
        let mut updates = row
            .keys()
            .filter(|column| column.as_str() != "id")
            .map(|column| {
                let column = quote_identifier(column);
                format!("{column}=EXCLUDED.{column}")
            })
            .collect::<Vec<_>>();
        if updates.is_empty() {
            updates.push("\"id\"=EXCLUDED.\"id\"".to_string());
        }

        let query = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (\"id\") DO UPDATE SET {} RETURNING *",
            self.table(),
            generate_columns(row.keys()),
            generate_parameters(row.keys()),
            updates.join(",")
        );

        let rows = client
            .fetch(&query, &generate_values(&row))
            .await
            .map_err(|e| query_error(correlation_id, self.table_name(), "setting item", e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name(),
            id = ?self.model().id_of(&item),
            "Set item"
        );
        self.first_item(correlation_id, rows)
    }

    /// Replace every column of an existing item; `None` when it does not exist
    pub async fn update(
        &self,
        correlation_id: Option<&str>,
        item: M::Item,
    ) -> PersistenceResult<Option<M::Item>> {
        let Some(id) = self.model().id_of(&item) else {
            return Ok(None);
        };
        let row = self.inner.to_row(correlation_id, &item)?;
        self.update_row(correlation_id, &id, row, "updating item").await
    }

    /// Update only the given columns of an existing item
    pub async fn update_partially(
        &self,
        correlation_id: Option<&str>,
        id: &str,
        data: Row,
    ) -> PersistenceResult<Option<M::Item>> {
        self.update_row(correlation_id, id, data, "updating item partially")
            .await
    }

    async fn update_row(
        &self,
        correlation_id: Option<&str>,
        id: &str,
        row: Row,
        action: &str,
    ) -> PersistenceResult<Option<M::Item>> {
        let client = self.inner.client(correlation_id)?;
        let row: Row = row.into_iter().filter(|(column, _)| column != "id").collect();
        if row.is_empty() {
            return self.get_one_by_id(correlation_id, id).await;
        }

        let query = format!(
            "UPDATE {} SET {} WHERE \"id\"=${} RETURNING *",
            self.table(),
            generate_set_parameters(&row),
            row.len() + 1
        );
        let mut params = generate_values(&row);
        params.push(Value::from(id));

        let rows = client
            .fetch(&query, &params)
            .await
            .map_err(|e| query_error(correlation_id, self.table_name(), action, e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name(),
            id = %id,
            "Updated item"
        );
        self.first_item(correlation_id, rows)
    }

    /// Delete an item and return it as it was stored
    pub async fn delete_by_id(
        &self,
        correlation_id: Option<&str>,
        id: &str,
    ) -> PersistenceResult<Option<M::Item>> {
        let client = self.inner.client(correlation_id)?;
        let query = format!("DELETE FROM {} WHERE \"id\"=$1 RETURNING *", self.table());

        let rows = client
            .fetch(&query, &[Value::from(id)])
            .await
            .map_err(|e| query_error(correlation_id, self.table_name(), "deleting item", e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name(),
            id = %id,
            "Deleted item"
        );
        self.first_item(correlation_id, rows)
    }

    /// Delete every item whose id is in the list and return how many were removed
    pub async fn delete_by_ids(
        &self,
        correlation_id: Option<&str>,
        ids: &[String],
    ) -> PersistenceResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let client = self.inner.client(correlation_id)?;

        let query = format!(
            "DELETE FROM {} WHERE \"id\" IN ({})",
            self.table(),
            placeholders(1, ids.len())
        );
        let params: Vec<Value> = ids.iter().cloned().map(Value::String).collect();

        let count = client
            .execute(&query, &params)
            .await
            .map_err(|e| query_error(correlation_id, self.table_name(), "deleting items", e))?;
        trace!(
            correlation_id = ?correlation_id,
            table = %self.table_name(),
            count,
            "Deleted items by ids"
        );
        Ok(count)
    }

    fn ensure_id(&self, item: M::Item) -> M::Item {
        match self.model().id_of(&item) {
            Some(_) => item,
            None => self
                .model()
                .with_id(item, uuid::Uuid::new_v4().simple().to_string()),
        }
    }
}
