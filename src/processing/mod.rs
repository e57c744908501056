//! In-memory dataset transformations: the merge-and-clean pipeline.
//!
//! The processing layer operates on [`crate::types::DataSet`] values produced by ingestion and
//! does no I/O.
//!
//! - [`normalize()`]: `id` column, duplicate rows, missing cells
//! - [`select_merge_key()`] / [`inner_join()`]: key choice and the join itself
//! - [`merge()`]: normalize everything, join, re-check ids, convert floats to decimals
//!
//! ## Example
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use csv_table_sync::processing::merge;
//! use csv_table_sync::types::{DataSet, DataType, Field, NamedDataSet, Schema, Value};
//!
//! let customers = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("customer_id", DataType::Utf8),
//!         Field::new("name", DataType::Utf8),
//!     ]),
//!     vec![vec![Value::text("c1"), Value::text("Al")]],
//! );
//! let orders = DataSet::new(
//!     Schema::new(vec![
//!         Field::new("customer_id", DataType::Utf8),
//!         Field::new("amount", DataType::Float64),
//!     ]),
//!     vec![
//!         vec![Value::text("c1"), Value::Float64(19.99)],
//!         vec![Value::text("c2"), Value::Float64(3.0)],
//!     ],
//! );
//!
//! let merged = merge(&[
//!     NamedDataSet::new("customers", customers),
//!     NamedDataSet::new("orders", orders),
//! ])
//! .unwrap();
//!
//! assert_eq!(merged.row_count(), 1);
//! assert_eq!(
//!     merged.value(0, "amount"),
//!     Some(&Value::Decimal("19.99".parse::<Decimal>().unwrap()))
//! );
//! ```

pub mod decimal;
pub mod merge;
pub mod normalize;

pub use decimal::{convert_floats_to_decimal, float_to_decimal};
pub use merge::{PREFERRED_MERGE_KEY, inner_join, merge, select_merge_key};
pub use normalize::{ID_COLUMN, ensure_ids, normalize};
