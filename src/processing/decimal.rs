//! Float → exact decimal conversion.

use rust_decimal::Decimal;

use crate::types::{DataSet, DataType, Value};

/// Exact decimal for `v`, built from its shortest round-trip text (`19.99` -> `"19.99"`).
///
/// `None` for NaN, infinities, and values a [`Decimal`] cannot hold without rounding (more than
/// 28 fractional digits, or out of range).
pub fn float_to_decimal(v: f64) -> Option<Decimal> {
    if !v.is_finite() {
        return None;
    }
    Decimal::from_str_exact(&v.to_string()).ok()
}

/// Convert every `Float64` column to `Decimal`.
///
/// Only `Float64` cells change; text (such as the empty text left by normalization) and
/// unrepresentable floats pass through as they are.
pub fn convert_floats_to_decimal(mut dataset: DataSet) -> DataSet {
    let float_cols: Vec<usize> = dataset
        .schema
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.data_type == DataType::Float64)
        .map(|(i, _)| i)
        .collect();

    for &idx in &float_cols {
        dataset.schema.fields[idx].data_type = DataType::Decimal;
    }
    for row in &mut dataset.rows {
        for &idx in &float_cols {
            let Some(&Value::Float64(v)) = row.get(idx) else {
                continue;
            };
            if let Some(d) = float_to_decimal(v) {
                row[idx] = Value::Decimal(d);
            }
        }
    }
    dataset
}
