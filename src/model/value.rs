//! Field values
//!
//! `Value` is the common currency between record types, the random generator
//! and the SQLite store. Owned complex values travel as nested [`Row`]s and are
//! persisted as JSON text.

use crate::error::SeedError;
use crate::model::entity::{Entity, FieldKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use uuid::Uuid;

/// Scalar column types understood by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Integer,
    Real,
    Text,
    Blob,
    Uuid,
    Timestamp,
    Date,
}

impl ValueType {
    /// SQLite column affinity used in generated DDL
    pub fn sql_type(&self) -> &'static str {
        match self {
            ValueType::Bool | ValueType::Integer => "INTEGER",
            ValueType::Real => "REAL",
            ValueType::Blob => "BLOB",
            ValueType::Text | ValueType::Uuid | ValueType::Timestamp | ValueType::Date => "TEXT",
        }
    }
}

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    /// Owned complex value, stored inline with its owner
    Owned(Row),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
            Value::Owned(_) => "owned row",
        }
    }

    /// Convert to JSON for inline storage of owned values
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Real(r) => serde_json::Number::from_f64(*r)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Text(s) => Json::String(s.clone()),
            Value::Blob(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            Value::Uuid(u) => Json::String(u.to_string()),
            Value::Timestamp(ts) => Json::String(ts.to_rfc3339()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::Owned(row) => row.to_json(),
        }
    }

    /// Read a JSON value back using the field kind as the type guide
    pub fn from_json(
        field: &str,
        json: &serde_json::Value,
        kind: &FieldKind,
    ) -> Result<Value, SeedError> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Ok(Value::Null);
        }

        match kind {
            FieldKind::Reference(_) | FieldKind::Collection(_) => Ok(Value::Null),
            FieldKind::Owned(target) => match json {
                Json::Object(_) => Ok(Value::Owned(Row::from_json(json, &target().fields)?)),
                other => Err(SeedError::record(
                    field,
                    format!("expected an object, found {}", other),
                )),
            },
            FieldKind::Scalar(value_type) => {
                let mismatch = || {
                    SeedError::record(field, format!("cannot read {:?} from {}", value_type, json))
                };
                match value_type {
                    ValueType::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
                    ValueType::Integer => json.as_i64().map(Value::Integer).ok_or_else(mismatch),
                    ValueType::Real => json.as_f64().map(Value::Real).ok_or_else(mismatch),
                    ValueType::Blob => json
                        .as_array()
                        .and_then(|items| {
                            items
                                .iter()
                                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                                .collect::<Option<Vec<u8>>>()
                        })
                        .map(Value::Blob)
                        .ok_or_else(mismatch),
                    ValueType::Text | ValueType::Uuid | ValueType::Timestamp | ValueType::Date => {
                        let text = json.as_str().ok_or_else(mismatch)?;
                        parse_text(field, text, *value_type)
                    }
                }
            }
        }
    }

    /// Read a SQLite column value using the field kind as the type guide
    pub fn from_sql(field: &str, value: ValueRef<'_>, kind: &FieldKind) -> Result<Value, SeedError> {
        let mismatch = |found: &str| {
            SeedError::record(field, format!("cannot read {:?} from {} column", kind, found))
        };

        match (kind, value) {
            (_, ValueRef::Null) => Ok(Value::Null),
            (FieldKind::Reference(_) | FieldKind::Collection(_), _) => Ok(Value::Null),
            (FieldKind::Owned(target), ValueRef::Text(bytes)) => {
                let json: serde_json::Value = serde_json::from_slice(bytes)
                    .map_err(|e| SeedError::record(field, format!("invalid JSON: {}", e)))?;
                Value::from_json(field, &json, &FieldKind::Owned(*target))
            }
            (FieldKind::Owned(_), _) => Err(mismatch("non-text")),
            (FieldKind::Scalar(value_type), value) => match (value_type, value) {
                (ValueType::Bool, ValueRef::Integer(i)) => Ok(Value::Bool(i != 0)),
                (ValueType::Integer, ValueRef::Integer(i)) => Ok(Value::Integer(i)),
                (ValueType::Real, ValueRef::Real(r)) => Ok(Value::Real(r)),
                (ValueType::Real, ValueRef::Integer(i)) => Ok(Value::Real(i as f64)),
                (ValueType::Blob, ValueRef::Blob(b)) => Ok(Value::Blob(b.to_vec())),
                (ValueType::Uuid, ValueRef::Blob(b)) => Uuid::from_slice(b)
                    .map(Value::Uuid)
                    .map_err(|e| SeedError::record(field, e.to_string())),
                (value_type, ValueRef::Text(bytes)) => {
                    let text = std::str::from_utf8(bytes)
                        .map_err(|e| SeedError::record(field, e.to_string()))?;
                    parse_text(field, text, *value_type)
                }
                (_, ValueRef::Integer(_)) => Err(mismatch("integer")),
                (_, ValueRef::Real(_)) => Err(mismatch("real")),
                (_, ValueRef::Blob(_)) => Err(mismatch("blob")),
                (_, ValueRef::Null) => Ok(Value::Null),
            },
        }
    }
}

fn parse_text(field: &str, text: &str, value_type: ValueType) -> Result<Value, SeedError> {
    match value_type {
        ValueType::Uuid => Uuid::parse_str(text)
            .map(Value::Uuid)
            .map_err(|e| SeedError::record(field, e.to_string())),
        ValueType::Timestamp => parse_timestamp(text)
            .map(Value::Timestamp)
            .ok_or_else(|| SeedError::record(field, format!("invalid timestamp '{}'", text))),
        ValueType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .or_else(|| parse_timestamp(text).map(|ts| ts.date_naive()))
            .map(Value::Date)
            .ok_or_else(|| SeedError::record(field, format!("invalid date '{}'", text))),
        ValueType::Text => Ok(Value::Text(text.to_string())),
        other => Err(SeedError::record(
            field,
            format!("cannot read {:?} from text column", other),
        )),
    }
}

/// Accepts RFC3339 as written by seedbed and `YYYY-MM-DD HH:MM:SS` as written
/// by SQLite's `datetime('now')`
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(Sql::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(Sql::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Uuid(u) => ToSqlOutput::Owned(Sql::Text(u.to_string())),
            Value::Timestamp(ts) => ToSqlOutput::Owned(Sql::Text(ts.to_rfc3339())),
            Value::Date(d) => ToSqlOutput::Owned(Sql::Text(d.format("%Y-%m-%d").to_string())),
            Value::Owned(row) => ToSqlOutput::Owned(Sql::Text(row.to_json().to_string())),
        })
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i64 => Integer,
    i32 => Integer,
    u32 => Integer,
    f64 => Real,
    String => Text,
    &str => Text,
    Vec<u8> => Blob,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
    NaiveDate => Date,
    Row => Owned,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Conversion out of a [`Value`], used by `Entity::from_row` implementations
pub trait FromValue: Sized {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError>;
}

fn unexpected<T>(field: &str, expected: &str, value: &Value) -> Result<T, SeedError> {
    Err(SeedError::record(
        field,
        format!("expected {}, found {}", expected, value.type_name()),
    ))
}

impl FromValue for bool {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Integer(i) => Ok(*i != 0),
            other => unexpected(field, "bool", other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Integer(i) => Ok(*i),
            other => unexpected(field, "integer", other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        let wide = i64::from_value(field, value)?;
        i32::try_from(wide).map_err(|e| SeedError::record(field, e.to_string()))
    }
}

impl FromValue for u32 {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        let wide = i64::from_value(field, value)?;
        u32::try_from(wide).map_err(|e| SeedError::record(field, e.to_string()))
    }
}

impl FromValue for f64 {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Real(r) => Ok(*r),
            Value::Integer(i) => Ok(*i as f64),
            other => unexpected(field, "real", other),
        }
    }
}

impl FromValue for String {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => unexpected(field, "text", other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            other => unexpected(field, "blob", other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::Text(s) => Uuid::parse_str(s).map_err(|e| SeedError::record(field, e.to_string())),
            other => unexpected(field, "uuid", other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            other => unexpected(field, "timestamp", other),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Date(d) => Ok(*d),
            other => unexpected(field, "date", other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(field: &str, value: &Value) -> Result<Self, SeedError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(field, other).map(Some),
        }
    }
}

/// Ordered set of named field values for one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Typed read; a missing field reads as `Null`
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T, SeedError> {
        T::from_value(name, self.get(name).unwrap_or(&Value::Null))
    }

    /// Read an owned complex value into its entity type
    pub fn owned<T: Entity>(&self, name: &str) -> Result<Option<T>, SeedError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Owned(row)) => T::from_row(row).map(Some),
            Some(other) => unexpected(name, "owned row", other),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .values
            .iter()
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Rebuild a row from JSON following the given field layout
    pub fn from_json(
        json: &serde_json::Value,
        fields: &[crate::model::entity::FieldDescriptor],
    ) -> Result<Row, SeedError> {
        let mut row = Row::new();
        for field in fields {
            let value = match json.get(field.name) {
                Some(v) => Value::from_json(field.name, v, &field.kind)?,
                None => Value::Null,
            };
            row.set(field.name, value);
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::{EntityDescriptor, FieldDescriptor};

    fn point() -> EntityDescriptor {
        EntityDescriptor::new("Point")
            .field(FieldDescriptor::scalar("X", ValueType::Integer))
            .field(FieldDescriptor::scalar("Label", ValueType::Text).nullable())
            .field(FieldDescriptor::scalar("Seen", ValueType::Timestamp))
    }

    #[test]
    fn test_row_set_replaces_existing() {
        let mut row = Row::new().with("A", 1i64);
        row.set("A", 2i64);
        assert_eq!(row.len(), 1);
        assert_eq!(row.get_as::<i64>("A").unwrap(), 2);
    }

    #[test]
    fn test_missing_field_reads_as_none() {
        let row = Row::new();
        assert_eq!(row.get_as::<Option<String>>("Missing").unwrap(), None);
        assert!(row.get_as::<String>("Missing").is_err());
    }

    #[test]
    fn test_owned_row_json_keeps_types() {
        let seen = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let row = Row::new()
            .with("X", 7i64)
            .with("Label", Option::<String>::None)
            .with("Seen", seen);

        let restored = Row::from_json(&row.to_json(), &point().fields).unwrap();
        assert_eq!(restored, row);
    }

    #[test]
    fn test_timestamp_accepts_sqlite_format() {
        let value = Value::from_sql(
            "Seen",
            ValueRef::Text(b"2024-05-01 10:00:00"),
            &FieldKind::Scalar(ValueType::Timestamp),
        )
        .unwrap();
        match value {
            Value::Timestamp(ts) => assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00+00:00"),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_date_accepts_sqlite_datetime() {
        let kind = FieldKind::Scalar(ValueType::Date);
        let expected = Value::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());

        let plain = Value::from_sql("Day", ValueRef::Text(b"2024-05-01"), &kind).unwrap();
        assert_eq!(plain, expected);

        // datetime('now') on a date column
        let stamped = Value::from_sql("Day", ValueRef::Text(b"2024-05-01 23:59:59"), &kind).unwrap();
        assert_eq!(stamped, expected);

        let err = Value::from_sql("Day", ValueRef::Text(b"May 1st"), &kind).unwrap_err();
        assert!(matches!(err, SeedError::Record { .. }));
    }

    #[test]
    fn test_type_mismatch_is_record_error() {
        let err = Value::from_sql(
            "X",
            ValueRef::Text(b"abc"),
            &FieldKind::Scalar(ValueType::Integer),
        )
        .unwrap_err();
        assert!(matches!(err, SeedError::Record { .. }));
    }
}
