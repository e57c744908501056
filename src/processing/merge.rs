//! Merging normalized datasets with an inner join on a shared key.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, Field, NamedDataSet, Schema, Value, ValueKey};

use super::decimal::convert_floats_to_decimal;
use super::normalize::{ensure_ids, normalize};

/// Join key used whenever both sides have it.
pub const PREFERRED_MERGE_KEY: &str = "customer_id";

/// Suffix for a left-hand column whose name also appears on the right.
pub const LEFT_SUFFIX: &str = "_x";
/// Suffix for a right-hand column whose name also appears on the left.
pub const RIGHT_SUFFIX: &str = "_y";

/// Choose the column to join `left` and `right` on.
///
/// `customer_id` if both have it, otherwise the lexicographically smallest shared column name.
pub fn select_merge_key(left: &NamedDataSet, right: &NamedDataSet) -> PipelineResult<String> {
    let left_cols: BTreeSet<&str> = left.data.schema.field_names().collect();
    let right_cols: BTreeSet<&str> = right.data.schema.field_names().collect();
    let mut shared = left_cols.intersection(&right_cols);

    if left_cols.contains(PREFERRED_MERGE_KEY) && right_cols.contains(PREFERRED_MERGE_KEY) {
        return Ok(PREFERRED_MERGE_KEY.to_owned());
    }
    shared
        .next()
        .map(|name| (*name).to_owned())
        .ok_or_else(|| PipelineError::NoCommonKey {
            left: left.name.clone(),
            right: right.name.clone(),
        })
}

/// Inner join of `left` and `right` on the column `key`.
///
/// Left row order is kept; each left row is followed by its matches in right order. Rows whose
/// key is missing never match. Output columns are the left columns, then the right columns
/// without `key`; other names present on both sides get `_x` / `_y` suffixes.
///
/// `key` must exist in both schemas; otherwise the result has no rows.
pub fn inner_join(left: &DataSet, right: &DataSet, key: &str) -> DataSet {
    let (Some(left_key), Some(right_key)) = (left.schema.index_of(key), right.schema.index_of(key))
    else {
        return DataSet::new(joined_schema(&left.schema, &right.schema, key), Vec::new());
    };

    let mut index: HashMap<ValueKey, Vec<usize>> = HashMap::new();
    for (pos, row) in right.rows.iter().enumerate() {
        if let Some(k) = row.get(right_key).and_then(Value::join_key) {
            index.entry(k).or_default().push(pos);
        }
    }

    let mut rows = Vec::new();
    for row in &left.rows {
        let Some(k) = row.get(left_key).and_then(Value::join_key) else {
            continue;
        };
        for &pos in index.get(&k).into_iter().flatten() {
            let mut out = row.clone();
            out.extend(
                right.rows[pos]
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != right_key)
                    .map(|(_, v)| v.clone()),
            );
            rows.push(out);
        }
    }

    DataSet::new(joined_schema(&left.schema, &right.schema, key), rows)
}

fn joined_schema(left: &Schema, right: &Schema, key: &str) -> Schema {
    let overlap: HashSet<&str> = left
        .field_names()
        .filter(|n| *n != key && right.contains(n))
        .collect();

    let right_fields = right.fields.iter().filter(|f| f.name != key);
    let mut taken: HashSet<String> = left
        .fields
        .iter()
        .chain(right_fields.clone())
        .filter(|f| !overlap.contains(f.name.as_str()))
        .map(|f| f.name.clone())
        .collect();

    let mut rename = |field: &Field, suffix: &str| -> Field {
        if !overlap.contains(field.name.as_str()) {
            return field.clone();
        }
        let mut name = format!("{}{suffix}", field.name);
        while taken.contains(&name) {
            name.push_str(suffix);
        }
        taken.insert(name.clone());
        Field::new(name, field.data_type.clone())
    };

    let mut fields: Vec<Field> = left.fields.iter().map(|f| rename(f, LEFT_SUFFIX)).collect();
    fields.extend(right_fields.map(|f| rename(f, RIGHT_SUFFIX)));
    Schema::new(fields)
}

/// Normalize and merge datasets into one.
///
/// - Every input is [`normalize`]d.
/// - No inputs: empty dataset. One input: that normalized dataset.
/// - Otherwise the first two are inner-joined on [`select_merge_key`], and each further input is
///   joined onto the accumulated result the same way.
/// - The joined result gets its `id` column re-checked (joins usually turn `id` into
///   `id_x`/`id_y`, so a fresh positional `id` is added) and every `Float64` column is converted
///   to exact decimals.
///
/// Returns an empty dataset when the join produced no rows.
pub fn merge(datasets: &[NamedDataSet]) -> PipelineResult<DataSet> {
    let mut normalized = datasets
        .iter()
        .map(|d| NamedDataSet::new(d.name.clone(), normalize(&d.data)));

    let Some(first) = normalized.next() else {
        info!("no datasets to merge");
        return Ok(DataSet::empty());
    };
    let Some(second) = normalized.next() else {
        info!(dataset = %first.name, "single dataset, nothing to merge");
        return Ok(first.data);
    };

    let mut acc = join_named(&first, &second)?;
    for next in normalized {
        acc = join_named(&acc, &next)?;
    }

    if acc.data.is_empty() {
        info!(datasets = %acc.name, "join produced no rows");
        return Ok(DataSet::empty());
    }

    Ok(convert_floats_to_decimal(ensure_ids(acc.data)))
}

fn join_named(left: &NamedDataSet, right: &NamedDataSet) -> PipelineResult<NamedDataSet> {
    let key = select_merge_key(left, right)?;
    let data = inner_join(&left.data, &right.data, &key);
    debug!(
        left = %left.name,
        right = %right.name,
        key = %key,
        rows = data.row_count(),
        "joined datasets"
    );
    Ok(NamedDataSet::new(format!("{}+{}", left.name, right.name), data))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::types::DataType;

    fn named(name: &str, fields: &[(&str, DataType)], rows: Vec<Vec<Value>>) -> NamedDataSet {
        let schema = Schema::new(
            fields
                .iter()
                .map(|(n, t)| Field::new(*n, t.clone()))
                .collect(),
        );
        NamedDataSet::new(name, DataSet::new(schema, rows))
    }

    fn customers() -> NamedDataSet {
        named(
            "customers",
            &[
                ("id", DataType::Int64),
                ("customer_id", DataType::Utf8),
                ("name", DataType::Utf8),
            ],
            vec![vec![Value::Int64(1), Value::text("c1"), Value::text("Al")]],
        )
    }

    fn orders() -> NamedDataSet {
        named(
            "orders",
            &[("customer_id", DataType::Utf8), ("amount", DataType::Float64)],
            vec![
                vec![Value::text("c1"), Value::Float64(9.5)],
                vec![Value::text("c2"), Value::Float64(3.0)],
            ],
        )
    }

    #[test]
    fn prefers_customer_id() {
        let a = named(
            "a",
            &[("customer_id", DataType::Utf8), ("aaa", DataType::Utf8)],
            vec![],
        );
        let b = named(
            "b",
            &[("aaa", DataType::Utf8), ("customer_id", DataType::Utf8)],
            vec![],
        );
        assert_eq!(select_merge_key(&a, &b).unwrap(), "customer_id");
    }

    #[test]
    fn falls_back_to_smallest_shared_name() {
        let a = named(
            "a",
            &[("zeta", DataType::Utf8), ("beta", DataType::Utf8), ("only_a", DataType::Utf8)],
            vec![],
        );
        let b = named(
            "b",
            &[("zeta", DataType::Utf8), ("beta", DataType::Utf8)],
            vec![],
        );
        assert_eq!(select_merge_key(&a, &b).unwrap(), "beta");
    }

    #[test]
    fn no_shared_column_is_an_error() {
        let a = named("a", &[("x", DataType::Utf8)], vec![]);
        let b = named("b", &[("y", DataType::Utf8)], vec![]);
        let err = select_merge_key(&a, &b).unwrap_err();
        assert!(matches!(err, PipelineError::NoCommonKey { .. }));
        assert_eq!(err.to_string(), "no common key between 'a' and 'b'");
    }

    #[test]
    fn merge_keeps_only_matching_rows() {
        let out = merge(&[customers(), orders()]).unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.value(0, "customer_id"), Some(&Value::text("c1")));
        assert_eq!(out.value(0, "name"), Some(&Value::text("Al")));
        assert_eq!(
            out.value(0, "amount"),
            Some(&Value::Decimal(Decimal::from_str("9.5").unwrap()))
        );
    }

    #[test]
    fn merge_renames_shared_columns_and_adds_fresh_id() {
        let out = merge(&[customers(), orders()]).unwrap();
        let names: Vec<_> = out.schema.field_names().collect();
        assert_eq!(
            names,
            vec!["id_x", "customer_id", "name", "amount", "id_y", "id"]
        );
        assert_eq!(out.value(0, "id_x"), Some(&Value::Int64(1)));
        assert_eq!(out.value(0, "id_y"), Some(&Value::text("0")));
        assert_eq!(out.value(0, "id"), Some(&Value::text("0")));
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        assert_eq!(merge(&[]).unwrap(), DataSet::empty());
    }

    #[test]
    fn merge_of_one_returns_it_normalized() {
        let one = customers();
        assert_eq!(merge(&[one.clone()]).unwrap(), normalize(&one.data));
    }

    #[test]
    fn merge_with_no_matches_is_empty() {
        let other = named(
            "other",
            &[("customer_id", DataType::Utf8)],
            vec![vec![Value::text("zzz")]],
        );
        assert_eq!(merge(&[customers(), other]).unwrap(), DataSet::empty());
    }

    #[test]
    fn merge_chains_a_third_dataset() {
        let regions = named(
            "regions",
            &[("name", DataType::Utf8), ("region", DataType::Utf8)],
            vec![vec![Value::text("Al"), Value::text("north")]],
        );
        let out = merge(&[customers(), orders(), regions]).unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(out.value(0, "region"), Some(&Value::text("north")));
        assert!(out.schema.contains("id"));
    }

    #[test]
    fn join_matches_duplicates_in_order() {
        let left = DataSet::new(
            Schema::new(vec![Field::new("k", DataType::Int64)]),
            vec![vec![Value::Int64(2)], vec![Value::Int64(1)]],
        );
        let right = DataSet::new(
            Schema::new(vec![
                Field::new("k", DataType::Float64),
                Field::new("v", DataType::Utf8),
            ]),
            vec![
                vec![Value::Float64(1.0), Value::text("a")],
                vec![Value::Float64(2.0), Value::text("b")],
                vec![Value::Float64(1.0), Value::text("c")],
            ],
        );
        let out = inner_join(&left, &right, "k");
        let vs: Vec<_> = out.rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(vs, vec![Value::text("b"), Value::text("a"), Value::text("c")]);
    }

    #[test]
    fn suffixes_avoid_existing_names() {
        let left = Schema::new(vec![
            Field::new("k", DataType::Utf8),
            Field::new("v", DataType::Utf8),
            Field::new("v_y", DataType::Utf8),
        ]);
        let right = Schema::new(vec![
            Field::new("k", DataType::Utf8),
            Field::new("v", DataType::Utf8),
        ]);
        let names: Vec<String> = joined_schema(&left, &right, "k")
            .fields
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["k", "v_x", "v_y", "v_y_y"]);
    }
}
