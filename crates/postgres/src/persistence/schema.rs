//! Schema statements replayed when a table is first opened.

use crate::persistence::query::quote_identifier;

/// Index creation options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub unique: bool,

    /// Index method placed before the key list, for example `USING GIN`
    pub index_type: Option<String>,
}

impl IndexOptions {
    pub fn unique() -> Self {
        Self {
            unique: true,
            index_type: None,
        }
    }
}

/// Ordered DDL statements for one table
///
/// Rebuilt every time a persistence component opens; executed only when the
/// table does not exist yet, so every statement should be idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaBuilder {
    table_name: String,
    statements: Vec<String>,
}

impl SchemaBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            statements: Vec::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Append a raw statement
    pub fn ensure_schema(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Append an index definition; each key is `(expression, ascending)`
    pub fn ensure_index(&mut self, name: &str, keys: &[(&str, bool)], options: &IndexOptions) {
        let mut statement = String::from("CREATE");
        if options.unique {
            statement.push_str(" UNIQUE");
        }
        statement.push_str(&format!(
            " INDEX IF NOT EXISTS {} ON {}",
            quote_identifier(name),
            quote_identifier(&self.table_name)
        ));
        if let Some(index_type) = options.index_type.as_deref().filter(|t| !t.is_empty()) {
            statement.push(' ');
            statement.push_str(index_type);
        }

        let fields = keys
            .iter()
            .map(|(key, ascending)| {
                if *ascending {
                    key.to_string()
                } else {
                    format!("{key} DESC")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        statement.push_str(&format!(" ({fields})"));

        self.ensure_schema(statement);
    }

    /// Append a two-column `id` / `data` table definition
    pub fn ensure_table(&mut self, id_type: &str, data_type: &str) {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {} (\"id\" {id_type} PRIMARY KEY, \"data\" {data_type})",
            quote_identifier(&self.table_name)
        );
        self.ensure_schema(statement);
    }

    /// Drop every accumulated statement
    pub fn clear_schema(&mut self) {
        self.statements.clear();
    }
}
