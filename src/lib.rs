//! `csv-table-sync` moves CSV files through a small cloud pipeline: upload them to an object
//! store, read them back as in-memory [`types::DataSet`]s, merge and clean them, write every
//! merged row to a key-value table, and publish a change notification per row.
//!
//! The primary entrypoint is [`orchestrator::Orchestrator::run`]. The pieces it sequences are
//! usable on their own.
//!
//! ## What a run does
//!
//! 1. Ensure the storage container exists.
//! 2. Upload every `*.csv` file of the local raw folder as `raw/<file name>`.
//! 3. List the container and read each `.csv` object with inferred column types. A file that
//!    fails to read is reported and skipped.
//! 4. [`processing::merge()`] the datasets: add/complete an `id` column, drop duplicate rows,
//!    inner join on a shared column (`customer_id` when present), and turn float columns into
//!    exact decimals.
//! 5. Ensure the table (keyed by `id`), the topic, and the email subscription exist.
//! 6. Insert each merged row and publish an INSERT notification for it.
//!
//! **Value types:** [`types::DataType::Int64`], [`types::DataType::Float64`],
//! [`types::DataType::Bool`], [`types::DataType::Utf8`], [`types::DataType::Decimal`].
//! Empty cells and common NA markers (`NA`, `N/A`, `NULL`, ...) read as [`types::Value::Null`].
//!
//! ## Quick example: one run against in-memory backends
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use csv_table_sync::gateway::{CloudObjectStore, MemoryNotifier, MemoryTableStore};
//! use csv_table_sync::orchestrator::{Orchestrator, RunSettings};
//!
//! # fn main() -> Result<(), csv_table_sync::PipelineError> {
//! let settings = RunSettings {
//!     bucket: "raw-data".into(),
//!     table_name: "customers".into(),
//!     topic_name: "record_notifications".into(),
//!     subscriber_email: "ops@example.com".into(),
//!     raw_folder: "./raw".into(),
//! };
//! let orchestrator = Orchestrator::new(
//!     settings,
//!     Arc::new(CloudObjectStore::in_memory()?),
//!     Arc::new(MemoryTableStore::new()),
//!     Arc::new(MemoryNotifier::new()),
//! );
//! let summary = orchestrator.run()?;
//! println!("inserted={} notified={}", summary.inserted, summary.notified);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: CSV parsing, schema inference, local file discovery
//! - [`types`]: schema + in-memory dataset types
//! - [`processing`]: the merge-and-clean pipeline
//! - [`gateway`]: object store, key-value table, and notifier contracts with their backends
//! - [`orchestrator`]: run sequencing and progress observers
//! - [`config`]: settings from environment variables
//! - [`logging`]: `tracing` subscriber setup
//! - [`error`]: error types used across the crate

pub mod config;
pub mod error;
pub mod gateway;
pub mod ingestion;
pub mod logging;
pub mod orchestrator;
pub mod processing;
pub mod types;

pub use error::{PipelineError, PipelineResult};
