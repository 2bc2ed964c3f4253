//! SQL text builders
//!
//! Only identifiers are quoted here. Filter, sort and select fragments are
//! caller-provided SQL and are spliced in verbatim, so they must never carry
//! untrusted input; values always travel as bound parameters.

use serde_json::Value;

use crate::client::Row;

/// Wrap an identifier in double quotes unless it is empty or already quoted
pub fn quote_identifier(value: &str) -> String {
    if value.is_empty() || value.starts_with('"') {
        value.to_string()
    } else {
        format!("\"{value}\"")
    }
}

/// `"col1","col2",...` for column names, or for the keys of a [`Row`]
pub fn generate_columns<I>(columns: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    columns
        .into_iter()
        .map(|column| quote_identifier(column.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// `$1,$2,...` with one placeholder per item
pub fn generate_parameters<I: IntoIterator>(values: I) -> String {
    placeholders(1, values.into_iter().count())
}

/// `"col1"=$1,"col2"=$2,...` for the columns of a row
pub fn generate_set_parameters(row: &Row) -> String {
    row.keys()
        .enumerate()
        .map(|(index, column)| format!("{}=${}", quote_identifier(column), index + 1))
        .collect::<Vec<_>>()
        .join(",")
}

/// Row values in column order, aligned with [`generate_columns`] and
/// [`generate_parameters`]
pub fn generate_values(row: &Row) -> Vec<Value> {
    row.values().cloned().collect()
}

/// `$start,...` with `count` placeholders
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|index| format!("${index}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Caller fragments with empty strings treated as absent
pub(crate) fn fragment(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn push_where(query: &mut String, filter: Option<&str>) {
    if let Some(filter) = fragment(filter) {
        query.push_str(" WHERE ");
        query.push_str(filter);
    }
}

pub(crate) fn push_order_by(query: &mut String, sort: Option<&str>) {
    if let Some(sort) = fragment(sort) {
        query.push_str(" ORDER BY ");
        query.push_str(sort);
    }
}
