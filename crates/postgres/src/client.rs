//! Driver seam
//!
//! Persistence components talk to the database only through [`SqlClient`]:
//! SQL text plus positional JSON parameters in, JSON rows out. The `sqlx`
//! Postgres pool implements it; tests substitute a mock.
//!
//! Parameters carry no type of their own. A parameterized statement is
//! prepared first and every JSON value is converted to the type the server
//! inferred for its placeholder, so `"7"` binds as `INT4` against an integer
//! column and as `TEXT` against a text one.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::{json, Value};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgRow, PgStatement, PgTypeInfo};
use sqlx::query::Query;
use sqlx::types::{Decimal, Json};
use sqlx::{
    Column, Either, Encode, Executor, PgPool, Postgres, Row as _, Statement, Type, TypeInfo,
};
use std::net::IpAddr;
use uuid::Uuid;

/// One database row, keyed by column name in select order
pub type Row = serde_json::Map<String, Value>;

/// Executes SQL text with bound parameters
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Run a statement that returns rows
    async fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, sqlx::Error>;

    /// Run a statement and return the number of affected rows
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl SqlClient for PgPool {
    async fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, sqlx::Error> {
        let rows = if params.is_empty() {
            sqlx::query(sql).fetch_all(self).await?
        } else {
            // The statement cache is per connection, so prepare and run on the same one
            let mut conn = self.acquire().await?;
            let statement = (&mut *conn).prepare(sql).await?;
            bind_all(&statement, params)?.fetch_all(&mut *conn).await?
        };
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, sqlx::Error> {
        let result = if params.is_empty() {
            sqlx::query(sql).execute(self).await?
        } else {
            let mut conn = self.acquire().await?;
            let statement = (&mut *conn).prepare(sql).await?;
            bind_all(&statement, params)?.execute(&mut *conn).await?
        };
        Ok(result.rows_affected())
    }
}

fn bind_all<'q>(
    statement: &'q PgStatement<'_>,
    params: &[Value],
) -> Result<Query<'q, Postgres, PgArguments>, sqlx::Error> {
    let types: &[PgTypeInfo] = match statement.parameters() {
        Some(Either::Left(types)) => types,
        _ => &[],
    };
    if types.len() != params.len() {
        return Err(sqlx::Error::Encode(
            format!(
                "statement expects {} parameters but {} were given",
                types.len(),
                params.len()
            )
            .into(),
        ));
    }

    let mut query = statement.query();
    for (position, (value, type_info)) in params.iter().zip(types).enumerate() {
        let param = to_param(value, type_info.name()).map_err(|message| {
            sqlx::Error::Encode(format!("parameter ${}: {message}", position + 1).into())
        })?;
        query = bind_param(query, param, type_info);
    }
    Ok(query)
}

/// A JSON value converted for one placeholder type
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PgParam {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Uuid(Uuid),
    Timestamptz(DateTime<Utc>),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Interval {
        months: i32,
        days: i32,
        microseconds: i64,
    },
    Bytea(Vec<u8>),
    BoolArray(Vec<Option<bool>>),
    Int2Array(Vec<Option<i16>>),
    Int4Array(Vec<Option<i32>>),
    Int8Array(Vec<Option<i64>>),
    Float4Array(Vec<Option<f32>>),
    Float8Array(Vec<Option<f64>>),
    NumericArray(Vec<Option<Decimal>>),
    TextArray(Vec<Option<String>>),
    UuidArray(Vec<Option<Uuid>>),
    /// Bytes already in the server's binary format for the placeholder type
    Raw(Vec<u8>),
}

/// Convert a JSON value for a placeholder of the given type
///
/// Strings are parsed into numbers, uuids and timestamps. Types without a
/// dedicated conversion (text, enums, domains) get the value's text form.
pub(crate) fn to_param(value: &Value, type_name: &str) -> Result<PgParam, String> {
    if value.is_null() {
        return Ok(PgParam::Null);
    }

    let param = match type_name {
        "BOOL" => PgParam::Bool(to_bool(value)?),
        "INT2" => PgParam::Int2(to_int(value)?),
        "INT4" => PgParam::Int4(to_int(value)?),
        "INT8" => PgParam::Int8(to_int(value)?),
        "FLOAT4" => PgParam::Float4(to_float(value)? as f32),
        "FLOAT8" => PgParam::Float8(to_float(value)?),
        "NUMERIC" => PgParam::Numeric(to_decimal(value)?),
        "UUID" => PgParam::Uuid(to_uuid(value)?),
        "TIMESTAMPTZ" => PgParam::Timestamptz(to_timestamptz(as_str(value)?)?),
        "TIMESTAMP" => PgParam::Timestamp(to_timestamp(as_str(value)?)?),
        "DATE" => PgParam::Date(to_date(as_str(value)?)?),
        "TIME" => PgParam::Time(to_time(as_str(value)?)?),
        "INTERVAL" => to_interval(value)?,
        "BYTEA" => PgParam::Bytea(to_bytes(value)?),
        "JSON" => PgParam::Raw(json_text(value).into_bytes()),
        "JSONB" => {
            // jsonb binary format: version byte, then the text
            let mut bytes = vec![1];
            bytes.extend(json_text(value).into_bytes());
            PgParam::Raw(bytes)
        }
        "INET" | "CIDR" => PgParam::Raw(encode_inet(&to_text(value), type_name == "CIDR")?),
        array if array.ends_with("[]") => to_array(value, array.trim_end_matches("[]"))?,
        _ => PgParam::Raw(to_text(value).into_bytes()),
    };
    Ok(param)
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: PgParam,
    type_info: &PgTypeInfo,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        PgParam::Null => query.bind(Resolved::new(None, type_info)),
        PgParam::Bool(v) => query.bind(v),
        PgParam::Int2(v) => query.bind(v),
        PgParam::Int4(v) => query.bind(v),
        PgParam::Int8(v) => query.bind(v),
        PgParam::Float4(v) => query.bind(v),
        PgParam::Float8(v) => query.bind(v),
        PgParam::Numeric(v) => query.bind(v),
        PgParam::Uuid(v) => query.bind(v),
        PgParam::Timestamptz(v) => query.bind(v),
        PgParam::Timestamp(v) => query.bind(v),
        PgParam::Date(v) => query.bind(v),
        PgParam::Time(v) => query.bind(v),
        PgParam::Interval {
            months,
            days,
            microseconds,
        } => query.bind(PgInterval {
            months,
            days,
            microseconds,
        }),
        PgParam::Bytea(v) => query.bind(v),
        PgParam::BoolArray(v) => query.bind(v),
        PgParam::Int2Array(v) => query.bind(v),
        PgParam::Int4Array(v) => query.bind(v),
        PgParam::Int8Array(v) => query.bind(v),
        PgParam::Float4Array(v) => query.bind(v),
        PgParam::Float8Array(v) => query.bind(v),
        PgParam::NumericArray(v) => query.bind(v),
        PgParam::TextArray(v) => query.bind(v),
        PgParam::UuidArray(v) => query.bind(v),
        PgParam::Raw(bytes) => query.bind(Resolved::new(Some(bytes), type_info)),
    }
}

/// Pre-encoded value sent with the placeholder's own type
struct Resolved {
    bytes: Option<Vec<u8>>,
    type_info: PgTypeInfo,
}

impl Resolved {
    fn new(bytes: Option<Vec<u8>>, type_info: &PgTypeInfo) -> Self {
        Self {
            bytes,
            type_info: type_info.clone(),
        }
    }
}

impl Type<Postgres> for Resolved {
    fn type_info() -> PgTypeInfo {
        // Unspecified; each value reports its type through `produces`
        PgTypeInfo::with_oid(Oid(0))
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'q> Encode<'q, Postgres> for Resolved {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        match &self.bytes {
            Some(bytes) => {
                buf.extend_from_slice(bytes);
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.type_info.clone())
    }
}

fn as_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{value} is not a string"))
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strings that already hold JSON are sent as is, anything else is serialized
fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) if serde_json::from_str::<Value>(s).is_ok() => s.clone(),
        other => other.to_string(),
    }
}

fn to_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other => Err(format!("{other} is not a boolean")),
    }
}

fn to_int<T: TryFrom<i64>>(value: &Value) -> Result<T, String> {
    let wide = match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("{n} is not an integer"))?,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("'{s}' is not an integer: {e}"))?,
        Value::Bool(b) => i64::from(*b),
        other => return Err(format!("{other} is not an integer")),
    };
    T::try_from(wide).map_err(|_| format!("{wide} is out of range"))
}

fn to_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("'{s}' is not a number: {e}")),
        other => Err(format!("{other} is not a number")),
    }
}

fn to_decimal(value: &Value) -> Result<Decimal, String> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("{other} is not a number")),
    };
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| format!("'{text}' is not a decimal: {e}"))
}

fn to_uuid(value: &Value) -> Result<Uuid, String> {
    let text = as_str(value)?;
    Uuid::parse_str(text.trim()).map_err(|e| format!("'{text}' is not a uuid: {e}"))
}

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// RFC 3339, or a timestamp without offset taken as UTC
fn to_timestamptz(text: &str) -> Result<DateTime<Utc>, String> {
    match DateTime::parse_from_rfc3339(text) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(_) => to_timestamp(text).map(|ts| Utc.from_utc_datetime(&ts)),
    }
}

fn to_timestamp(text: &str) -> Result<NaiveDateTime, String> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|ts| ts.naive_utc()))
        .ok_or_else(|| format!("'{text}' is not a timestamp"))
}

fn to_date(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| to_timestamp(text).map(|ts| ts.date()))
        .map_err(|_| format!("'{text}' is not a date"))
}

fn to_time(text: &str) -> Result<NaiveTime, String> {
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .ok_or_else(|| format!("'{text}' is not a time"))
}

/// Intervals travel as `{"months", "days", "microseconds"}`; missing parts are zero
fn to_interval(value: &Value) -> Result<PgParam, String> {
    let Value::Object(parts) = value else {
        return Err(format!("{value} is not an interval object"));
    };
    let months = parts.get("months").map(to_int::<i32>).transpose()?;
    let days = parts.get("days").map(to_int::<i32>).transpose()?;
    let microseconds = parts.get("microseconds").map(to_int::<i64>).transpose()?;
    Ok(PgParam::Interval {
        months: months.unwrap_or(0),
        days: days.unwrap_or(0),
        microseconds: microseconds.unwrap_or(0),
    })
}

/// Base64 text, or an array of byte values
fn to_bytes(value: &Value) -> Result<Vec<u8>, String> {
    match value {
        Value::String(s) => base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| format!("'{s}' is not base64: {e}")),
        Value::Array(items) => items.iter().map(to_int::<u8>).collect(),
        other => Err(format!("{other} is not binary data")),
    }
}

fn to_array(value: &Value, element_type: &str) -> Result<PgParam, String> {
    let Value::Array(items) = value else {
        return Err(format!("{value} is not an array"));
    };

    let param = match element_type {
        "BOOL" => PgParam::BoolArray(elements(items, to_bool)?),
        "INT2" => PgParam::Int2Array(elements(items, to_int::<i16>)?),
        "INT4" => PgParam::Int4Array(elements(items, to_int::<i32>)?),
        "INT8" => PgParam::Int8Array(elements(items, to_int::<i64>)?),
        "FLOAT4" => PgParam::Float4Array(elements(items, |v| to_float(v).map(|f| f as f32))?),
        "FLOAT8" => PgParam::Float8Array(elements(items, to_float)?),
        "NUMERIC" => PgParam::NumericArray(elements(items, to_decimal)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            PgParam::TextArray(elements(items, |v| Ok(to_text(v)))?)
        }
        "UUID" => PgParam::UuidArray(elements(items, to_uuid)?),
        other => return Err(format!("arrays of {other} are not supported")),
    };
    Ok(param)
}

fn elements<T>(
    items: &[Value],
    convert: impl Fn(&Value) -> Result<T, String>,
) -> Result<Vec<Option<T>>, String> {
    items
        .iter()
        .map(|item| match item {
            Value::Null => Ok(None),
            item => convert(item).map(Some),
        })
        .collect()
}

// inet/cidr binary format: family, prefix bits, cidr flag, address length, address
const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

fn encode_inet(text: &str, cidr: bool) -> Result<Vec<u8>, String> {
    let (address, bits) = match text.trim().split_once('/') {
        Some((address, bits)) => {
            let bits = bits
                .parse::<u8>()
                .map_err(|e| format!("'{bits}' is not a prefix length: {e}"))?;
            (address, Some(bits))
        }
        None => (text.trim(), None),
    };
    let address: IpAddr = address
        .parse()
        .map_err(|e| format!("'{address}' is not an IP address: {e}"))?;

    let (family, octets) = match address {
        IpAddr::V4(v4) => (PGSQL_AF_INET, v4.octets().to_vec()),
        IpAddr::V6(v6) => (PGSQL_AF_INET6, v6.octets().to_vec()),
    };
    let max_bits = (octets.len() * 8) as u8;
    let bits = bits.unwrap_or(max_bits);
    if bits > max_bits {
        return Err(format!("prefix length {bits} exceeds {max_bits}"));
    }

    let mut bytes = vec![family, bits, u8::from(cidr), octets.len() as u8];
    bytes.extend(octets);
    Ok(bytes)
}

fn decode_inet(bytes: &[u8]) -> Option<String> {
    let [family, bits, cidr, _, address @ ..] = bytes else {
        return None;
    };
    let address = match (*family, address.len()) {
        (PGSQL_AF_INET, 4) => IpAddr::from(<[u8; 4]>::try_from(address).ok()?),
        (PGSQL_AF_INET6, 16) => IpAddr::from(<[u8; 16]>::try_from(address).ok()?),
        _ => return None,
    };
    let max_bits = if address.is_ipv4() { 32 } else { 128 };
    if *cidr == 0 && *bits == max_bits {
        Some(address.to_string())
    } else {
        Some(format!("{address}/{bits}"))
    }
}

/// Text of a value with no dedicated decoding; base64 when not UTF-8
fn fallback_text(bytes: Vec<u8>) -> Value {
    String::from_utf8(bytes).map(Value::from).unwrap_or_else(|e| {
        Value::from(base64::engine::general_purpose::STANDARD.encode(e.into_bytes()))
    })
}

/// Convert a driver row into a JSON row, keeping column order
pub(crate) fn decode_row(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

fn nullable<'r, T>(row: &'r PgRow, index: usize) -> Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
}

fn array<'r, T>(
    row: &'r PgRow,
    index: usize,
    to_value: impl Fn(T) -> Value,
) -> Result<Option<Value>, sqlx::Error>
where
    Vec<Option<T>>: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    Ok(nullable::<Vec<Option<T>>>(row, index)?.map(|items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map(&to_value).unwrap_or(Value::Null))
                .collect(),
        )
    }))
}

/// Raw value bytes, whatever the column type
fn raw(row: &PgRow, index: usize) -> Result<Option<Vec<u8>>, sqlx::Error> {
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => nullable::<bool>(row, index)?.map(Value::from),
        "INT2" => nullable::<i16>(row, index)?.map(Value::from),
        "INT4" => nullable::<i32>(row, index)?.map(Value::from),
        "INT8" => nullable::<i64>(row, index)?.map(Value::from),
        "FLOAT4" => nullable::<f32>(row, index)?.map(|v| Value::from(f64::from(v))),
        "FLOAT8" => nullable::<f64>(row, index)?.map(Value::from),
        // Kept as text so no precision is lost
        "NUMERIC" => nullable::<Decimal>(row, index)?.map(|d| Value::from(d.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            nullable::<String>(row, index)?.map(Value::from)
        }
        "JSON" | "JSONB" => nullable::<Json<Value>>(row, index)?.map(|json| json.0),
        "UUID" => nullable::<Uuid>(row, index)?.map(|id| Value::from(id.to_string())),
        "TIMESTAMPTZ" => {
            nullable::<DateTime<Utc>>(row, index)?.map(|ts| Value::from(ts.to_rfc3339()))
        }
        "TIMESTAMP" => nullable::<NaiveDateTime>(row, index)?
            .map(|ts| Value::from(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => nullable::<NaiveDate>(row, index)?.map(|d| Value::from(d.to_string())),
        "TIME" => nullable::<NaiveTime>(row, index)?.map(|t| Value::from(t.to_string())),
        "INTERVAL" => nullable::<PgInterval>(row, index)?.map(|i| {
            json!({"months": i.months, "days": i.days, "microseconds": i.microseconds})
        }),
        "BYTEA" => nullable::<Vec<u8>>(row, index)?
            .map(|bytes| Value::from(base64::engine::general_purpose::STANDARD.encode(bytes))),
        "INET" | "CIDR" => raw(row, index)?.map(|bytes| match decode_inet(&bytes) {
            Some(text) => Value::from(text),
            None => fallback_text(bytes),
        }),
        "BOOL[]" => array::<bool>(row, index, Value::from)?,
        "INT2[]" => array::<i16>(row, index, Value::from)?,
        "INT4[]" => array::<i32>(row, index, Value::from)?,
        "INT8[]" => array::<i64>(row, index, Value::from)?,
        "FLOAT4[]" => array::<f32>(row, index, |v| Value::from(f64::from(v)))?,
        "FLOAT8[]" => array::<f64>(row, index, Value::from)?,
        "NUMERIC[]" => array::<Decimal>(row, index, |d| Value::from(d.to_string()))?,
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            array::<String>(row, index, Value::from)?
        }
        "UUID[]" => array::<Uuid>(row, index, |id| Value::from(id.to_string()))?,
        // Enums, domains over text and anything else: the value's own bytes
        _ => raw(row, index)?.map(fallback_text),
    };

    Ok(value.unwrap_or(Value::Null))
}
