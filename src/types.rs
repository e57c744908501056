//! Core data model types.
//!
//! CSV objects are read into an in-memory [`DataSet`] described by a [`Schema`] (a list of typed
//! [`Field`]s). Rows leave the pipeline as [`Record`]s, one per table item.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Logical data type for a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Exact decimal number.
    Decimal,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered list of fields describing the shape of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns `true` if a field with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// A single typed value in a [`DataSet`].
///
/// The serde representation is externally tagged so stored records keep their types; use
/// [`Value::to_json`] for the plain JSON shape used in notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Exact decimal.
    Decimal(Decimal),
}

impl Value {
    /// Shorthand for a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Utf8(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Plain JSON rendering. Decimals are emitted as strings so no digits are lost.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Int64(v) => serde_json::Value::from(*v),
            Self::Float64(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Utf8(s) => serde_json::Value::String(s.clone()),
            Self::Decimal(d) => serde_json::Value::String(d.to_string()),
        }
    }

    /// Hashable identity used for duplicate detection. NaN equals NaN, `-0.0` equals `0.0`.
    pub(crate) fn identity(&self) -> ValueKey {
        match self {
            Self::Null => ValueKey::Null,
            Self::Int64(v) => ValueKey::Int(*v),
            Self::Float64(v) => ValueKey::Float(float_bits(*v)),
            Self::Bool(v) => ValueKey::Bool(*v),
            Self::Utf8(s) => ValueKey::Text(s.clone()),
            Self::Decimal(d) => ValueKey::Decimal(*d),
        }
    }

    /// Hashable key used for equality joins.
    ///
    /// Returns `None` for values that never match anything (missing cells, NaN). Integral floats
    /// compare equal to the matching integer.
    pub(crate) fn join_key(&self) -> Option<ValueKey> {
        match self {
            Self::Null => None,
            Self::Float64(v) if v.is_nan() => None,
            Self::Float64(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Some(ValueKey::Int(*v as i64))
            }
            other => Some(other.identity()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Utf8(s) => f.write_str(s),
            Self::Decimal(d) => write!(f, "{d}"),
        }
    }
}

fn float_bits(v: f64) -> u64 {
    if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Null,
    Int(i64),
    Float(u64),
    Bool(bool),
    Text(String),
    Decimal(Decimal),
}

/// One row keyed by column name; the unit written to a key-value table.
pub type Record = BTreeMap<String, Value>;

/// Plain JSON object for a record (see [`Value::to_json`]).
pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// A dataset with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns in the dataset.
    pub fn column_count(&self) -> usize {
        self.schema.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row` in the column called `column`.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Append a column.
    ///
    /// # Panics
    ///
    /// Panics if `values.len()` differs from the row count.
    pub fn push_column(&mut self, field: Field, values: Vec<Value>) {
        assert!(
            values.len() == self.rows.len(),
            "column length {} does not match row count {}",
            values.len(),
            self.rows.len()
        );
        self.schema.fields.push(field);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Render every row as a [`Record`], in row order.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.rows.iter().map(|row| {
            self.schema
                .field_names()
                .zip(row.iter())
                .map(|(name, value)| (name.to_owned(), value.clone()))
                .collect()
        })
    }
}

/// A dataset tagged with the name of the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedDataSet {
    /// Source name (object key or file stem).
    pub name: String,
    pub data: DataSet,
}

impl NamedDataSet {
    pub fn new(name: impl Into<String>, data: DataSet) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn sample_dataset() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Utf8),
            Field::new("amount", DataType::Decimal),
        ]);
        DataSet::new(
            schema,
            vec![
                vec![Value::text("a"), Value::Decimal(Decimal::from_str("1.50").unwrap())],
                vec![Value::text("b"), Value::Null],
            ],
        )
    }

    #[test]
    fn schema_index_of_works() {
        let ds = sample_dataset();
        assert_eq!(ds.schema.index_of("id"), Some(0));
        assert_eq!(ds.schema.index_of("amount"), Some(1));
        assert_eq!(ds.schema.index_of("missing"), None);
    }

    #[test]
    fn records_follow_schema_order() {
        let ds = sample_dataset();
        let records: Vec<Record> = ds.records().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], Value::text("a"));
        assert_eq!(records[1]["amount"], Value::Null);
    }

    #[test]
    fn record_json_keeps_decimal_digits() {
        let ds = sample_dataset();
        let first = ds.records().next().unwrap();
        let json = record_to_json(&first);
        assert_eq!(json["amount"], serde_json::json!("1.50"));
        assert_eq!(json["id"], serde_json::json!("a"));
    }

    #[test]
    fn push_column_appends_to_every_row() {
        let mut ds = sample_dataset();
        ds.push_column(
            Field::new("flag", DataType::Bool),
            vec![Value::Bool(true), Value::Bool(false)],
        );
        assert_eq!(ds.column_count(), 3);
        assert_eq!(ds.value(1, "flag"), Some(&Value::Bool(false)));
    }

    #[test]
    #[should_panic(expected = "column length")]
    fn push_column_panics_on_wrong_length() {
        let mut ds = sample_dataset();
        ds.push_column(Field::new("flag", DataType::Bool), vec![Value::Bool(true)]);
    }

    #[test]
    fn join_key_matches_integral_floats_to_ints() {
        assert_eq!(Value::Float64(3.0).join_key(), Value::Int64(3).join_key());
        assert_ne!(Value::Float64(3.5).join_key(), Value::Int64(3).join_key());
        assert_eq!(Value::Null.join_key(), None);
        assert_eq!(Value::Float64(f64::NAN).join_key(), None);
    }

    #[test]
    fn identity_treats_nan_as_equal() {
        assert_eq!(
            Value::Float64(f64::NAN).identity(),
            Value::Float64(f64::NAN).identity()
        );
        assert_eq!(Value::Float64(-0.0).identity(), Value::Float64(0.0).identity());
    }

    #[test]
    fn display_renders_plain_text() {
        assert_eq!(Value::Int64(7).to_string(), "7");
        assert_eq!(Value::Float64(19.99).to_string(), "19.99");
        assert_eq!(Value::Null.to_string(), "");
    }
}
