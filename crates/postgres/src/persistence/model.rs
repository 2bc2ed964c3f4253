//! Row conversion and schema hooks for one table.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

use common::error::BoxError;

use crate::client::Row;
use crate::persistence::SchemaBuilder;

/// Per-table specialization of the persistence engine
///
/// `from_public` returning an empty row means "nothing to write".
pub trait TableModel: Send + Sync {
    type Item: Send + Sync;

    /// Add the statements that create the table and its indexes
    fn define_schema(&self, _schema: &mut SchemaBuilder) {}

    fn to_public(&self, row: Row) -> Result<Self::Item, BoxError>;

    fn from_public(&self, item: &Self::Item) -> Result<Row, BoxError>;
}

/// Table model for items keyed by an `id` column
pub trait IdentifiableModel: TableModel {
    fn id_of(&self, item: &Self::Item) -> Option<String>;

    fn with_id(&self, item: Self::Item, id: String) -> Self::Item;
}

/// Untyped model: items are rows
#[derive(Debug, Clone, Default)]
pub struct RowModel {
    schema: Vec<String>,
}

impl RowModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model that replays the given DDL statements on first open
    pub fn with_schema<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: statements.into_iter().map(Into::into).collect(),
        }
    }
}

impl TableModel for RowModel {
    type Item = Row;

    fn define_schema(&self, schema: &mut SchemaBuilder) {
        for statement in &self.schema {
            schema.ensure_schema(statement.clone());
        }
    }

    fn to_public(&self, row: Row) -> Result<Row, BoxError> {
        Ok(row)
    }

    fn from_public(&self, item: &Row) -> Result<Row, BoxError> {
        Ok(item.clone())
    }
}

impl IdentifiableModel for RowModel {
    fn id_of(&self, item: &Row) -> Option<String> {
        match item.get("id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    fn with_id(&self, mut item: Row, id: String) -> Row {
        item.insert("id".to_string(), Value::String(id));
        item
    }
}

/// Typed model mapping struct fields to columns through serde
pub struct SerdeModel<T> {
    schema: Vec<String>,
    _item: PhantomData<fn() -> T>,
}

impl<T> Default for SerdeModel<T> {
    fn default() -> Self {
        Self {
            schema: Vec::new(),
            _item: PhantomData,
        }
    }
}

impl<T> SerdeModel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: statements.into_iter().map(Into::into).collect(),
            _item: PhantomData,
        }
    }
}

impl<T> TableModel for SerdeModel<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Item = T;

    fn define_schema(&self, schema: &mut SchemaBuilder) {
        for statement in &self.schema {
            schema.ensure_schema(statement.clone());
        }
    }

    fn to_public(&self, row: Row) -> Result<T, BoxError> {
        Ok(serde_json::from_value(Value::Object(row))?)
    }

    fn from_public(&self, item: &T) -> Result<Row, BoxError> {
        match serde_json::to_value(item)? {
            Value::Object(row) => Ok(row),
            Value::Null => Ok(Row::new()),
            other => Err(format!("expected an object, got {other}").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        id: String,
        key: String,
        content: Option<String>,
    }

    #[test]
    fn test_serde_model_round_trip_keeps_field_order() {
        let model = SerdeModel::<Dummy>::new();
        let dummy = Dummy {
            id: "1".to_string(),
            key: "Key 1".to_string(),
            content: None,
        };

        let row = model.from_public(&dummy).unwrap();
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["id", "key", "content"]);
        assert_eq!(row["content"], Value::Null);
        assert_eq!(model.to_public(row).unwrap(), dummy);
    }

    #[test]
    fn test_serde_model_rejects_bad_rows() {
        let model = SerdeModel::<Dummy>::new();
        let mut row = Row::new();
        row.insert("id".to_string(), json!(5));
        assert!(model.to_public(row).is_err());

        let scalar = SerdeModel::<u32>::new();
        assert!(scalar.from_public(&7).is_err());

        let optional = SerdeModel::<Option<Dummy>>::new();
        assert!(optional.from_public(&None).unwrap().is_empty());
    }

    #[test]
    fn test_models_contribute_schema() {
        let model = SerdeModel::<Dummy>::with_schema([
            "CREATE TABLE IF NOT EXISTS \"dummies\" (\"id\" TEXT PRIMARY KEY)",
        ]);
        let mut schema = SchemaBuilder::new("dummies");
        model.define_schema(&mut schema);
        assert_eq!(schema.statements().len(), 1);

        let mut schema = SchemaBuilder::new("rows");
        RowModel::new().define_schema(&mut schema);
        assert!(schema.is_empty());
    }

    #[test]
    fn test_row_model_ids() {
        let model = RowModel::new();
        let mut row = Row::new();
        assert_eq!(model.id_of(&row), None);

        row.insert("id".to_string(), json!(42));
        assert_eq!(model.id_of(&row).as_deref(), Some("42"));

        let row = model.with_id(row, "abc".to_string());
        assert_eq!(model.id_of(&row).as_deref(), Some("abc"));
    }
}
