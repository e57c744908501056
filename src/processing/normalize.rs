//! Per-dataset cleaning: identifier column, duplicate rows, missing cells.

use std::collections::HashSet;

use tracing::warn;

use crate::types::{DataSet, DataType, Field, Value, ValueKey};

/// Name of the identifier column every normalized dataset carries.
pub const ID_COLUMN: &str = "id";

/// Normalize a dataset so it can be written to a key-value table.
///
/// In order:
///
/// 1. add an `id` column (row position as text) if there is none;
/// 2. fill missing `id` cells with the row position as text, keeping existing ids verbatim;
/// 3. replace every other missing cell with empty text;
/// 4. drop rows that repeat an earlier row exactly, keeping the first.
///
/// Duplicate detection looks at row content as read: an `id` produced in steps 1–2 does not by
/// itself make two rows different, and rows that end up identical after filling are dropped too.
/// Normalizing a normalized dataset returns it unchanged.
pub fn normalize(dataset: &DataSet) -> DataSet {
    let mut out = dataset.clone();
    let synthesized = fill_ids(&mut out);
    fill_missing(&mut out);
    drop_duplicate_rows(&mut out, &synthesized);
    // A synthesized id that collides with an explicit one can leave identical rows behind.
    drop_duplicate_rows(&mut out, &[]);
    out
}

/// Steps 1–2 of [`normalize`] only: make sure every row has an `id`.
pub fn ensure_ids(mut dataset: DataSet) -> DataSet {
    fill_ids(&mut dataset);
    dataset
}

/// Fills ids in place; returns, per row, whether the id was synthesized.
fn fill_ids(dataset: &mut DataSet) -> Vec<bool> {
    let Some(idx) = dataset.schema.index_of(ID_COLUMN) else {
        let ids = (0..dataset.row_count())
            .map(|pos| Value::Utf8(pos.to_string()))
            .collect();
        dataset.push_column(Field::new(ID_COLUMN, DataType::Utf8), ids);
        return vec![true; dataset.row_count()];
    };

    let explicit: HashSet<String> = dataset
        .rows
        .iter()
        .filter_map(|row| row.get(idx).filter(|v| !v.is_null()).map(Value::to_string))
        .collect();

    let mut synthesized = vec![false; dataset.row_count()];
    for (pos, row) in dataset.rows.iter_mut().enumerate() {
        if let Some(cell) = row.get_mut(idx) {
            if cell.is_null() {
                let id = pos.to_string();
                if explicit.contains(&id) {
                    warn!(id = %id, row = pos, "synthesized id collides with an existing id");
                }
                *cell = Value::Utf8(id);
                synthesized[pos] = true;
            }
        }
    }
    synthesized
}

fn fill_missing(dataset: &mut DataSet) {
    for cell in dataset.rows.iter_mut().flatten() {
        if cell.is_null() {
            *cell = Value::Utf8(String::new());
        }
    }
}

fn drop_duplicate_rows(dataset: &mut DataSet, synthesized: &[bool]) {
    let id_idx = dataset.schema.index_of(ID_COLUMN);
    let mut seen: HashSet<Vec<ValueKey>> = HashSet::with_capacity(dataset.row_count());
    let mut pos = 0;
    dataset.rows.retain(|row| {
        let masked = synthesized.get(pos).copied().unwrap_or(false);
        pos += 1;
        let key = row
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if masked && Some(i) == id_idx {
                    ValueKey::Null
                } else {
                    v.identity()
                }
            })
            .collect();
        seen.insert(key)
    });
}
