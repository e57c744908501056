//! CSV ingestion implementation.
//!
//! Two entry styles:
//!
//! - schema-driven ([`ingest_csv_from_path`], [`ingest_csv_from_reader`]): every schema field must
//!   be present in the headers and each cell is parsed to the field type;
//! - inferred ([`read_csv_bytes`], [`read_csv_path`]): column types are guessed from the data
//!   first, then the schema-driven path does the parsing. This is how objects fetched from storage
//!   are read.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// Cell contents treated as missing, in addition to the empty string.
const NA_VALUES: &[&str] = &["NA", "N/A", "#N/A", "NaN", "nan", "NULL", "null", "None"];

/// Ingest a CSV file into an in-memory [`DataSet`].
///
/// Rules:
///
/// - CSV must have headers.
/// - Headers must contain all schema fields (order can differ).
/// - Each value is parsed according to the schema field type.
pub fn ingest_csv_from_path(path: impl AsRef<Path>, schema: &Schema) -> PipelineResult<DataSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    ingest_csv_from_reader(&mut rdr, schema)
}

/// Ingest CSV data from an existing CSV reader.
///
/// Repeated header names are addressed as `name`, `name.1`, `name.2`, ...
pub fn ingest_csv_from_reader<R: Read>(
    rdr: &mut csv::Reader<R>,
    schema: &Schema,
) -> PipelineResult<DataSet> {
    let headers = header_names(rdr.headers()?);

    // Map schema fields -> CSV column indexes (allows re-ordered CSV columns).
    let mut col_idxs = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        match headers.iter().position(|h| *h == field.name) {
            Some(idx) => col_idxs.push(idx),
            None => {
                return Err(PipelineError::schema(format!(
                    "missing required column '{field}'. headers={headers:?}",
                    field = field.name
                )));
            }
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (row_idx0, result) in rdr.records().enumerate() {
        // Report 1-based row number for users; +1 again because header is row 1.
        let user_row = row_idx0 + 2;
        let record = result?;

        let mut row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, &csv_idx) in schema.fields.iter().zip(col_idxs.iter()) {
            let raw = record.get(csv_idx).unwrap_or("");
            row.push(parse_typed_value(user_row, &field.name, &field.data_type, raw)?);
        }
        rows.push(row);
    }

    Ok(DataSet::new(schema.clone(), rows))
}

/// Infer a [`Schema`] by scanning every record of `rdr`.
///
/// A column is `Int64` if every non-missing cell parses as an integer, else `Float64` if every
/// cell parses as a float, else `Bool` if every cell is `true`/`false` (any case), else `Utf8`.
/// Columns with no values at all are `Utf8`.
pub fn infer_csv_schema<R: Read>(rdr: &mut csv::Reader<R>) -> PipelineResult<Schema> {
    let headers = header_names(rdr.headers()?);
    let mut guesses = vec![TypeGuess::default(); headers.len()];

    for result in rdr.records() {
        let record = result?;
        for (guess, raw) in guesses.iter_mut().zip(record.iter()) {
            guess.observe(raw.trim());
        }
    }

    Ok(Schema::new(
        headers
            .into_iter()
            .zip(guesses)
            .map(|(name, guess)| Field::new(name, guess.data_type()))
            .collect(),
    ))
}

/// Read CSV bytes with an inferred schema.
pub fn read_csv_bytes(bytes: &[u8]) -> PipelineResult<DataSet> {
    let schema = infer_csv_schema(&mut csv_reader(bytes))?;
    ingest_csv_from_reader(&mut csv_reader(bytes), &schema)
}

/// Read a local CSV file with an inferred schema.
pub fn read_csv_path(path: impl AsRef<Path>) -> PipelineResult<DataSet> {
    let bytes = std::fs::read(path)?;
    read_csv_bytes(&bytes)
}

fn csv_reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new().has_headers(true).from_reader(bytes)
}

fn header_names(headers: &csv::StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(headers.len());
    for h in headers.iter() {
        let base = h.trim();
        let mut name = base.to_owned();
        let mut n = 0;
        while seen.contains(&name) {
            n += 1;
            name = format!("{base}.{n}");
        }
        seen.insert(name.clone());
        out.push(name);
    }
    out
}

fn is_missing(trimmed: &str) -> bool {
    trimmed.is_empty() || NA_VALUES.contains(&trimmed)
}

#[derive(Debug, Clone, Copy)]
struct TypeGuess {
    seen: bool,
    int: bool,
    float: bool,
    boolean: bool,
}

impl Default for TypeGuess {
    fn default() -> Self {
        Self {
            seen: false,
            int: true,
            float: true,
            boolean: true,
        }
    }
}

impl TypeGuess {
    fn observe(&mut self, trimmed: &str) {
        if is_missing(trimmed) {
            return;
        }
        self.seen = true;
        self.int &= trimmed.parse::<i64>().is_ok();
        self.float &= trimmed.parse::<f64>().is_ok();
        self.boolean &=
            trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false");
    }

    fn data_type(self) -> DataType {
        match self {
            Self { seen: false, .. } => DataType::Utf8,
            Self { int: true, .. } => DataType::Int64,
            Self { float: true, .. } => DataType::Float64,
            Self { boolean: true, .. } => DataType::Bool,
            _ => DataType::Utf8,
        }
    }
}

fn parse_typed_value(
    row: usize,
    column: &str,
    data_type: &DataType,
    raw: &str,
) -> PipelineResult<Value> {
    let trimmed = raw.trim();
    if is_missing(trimmed) {
        return Ok(Value::Null);
    }

    let parse_error = |message: String| PipelineError::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message,
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Decimal => trimmed
            .parse::<rust_decimal::Decimal>()
            .map(Value::Decimal)
            .map_err(|e| parse_error(e.to_string())),
        DataType::Bool => parse_bool(trimmed).map(Value::Bool).map_err(parse_error),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}
