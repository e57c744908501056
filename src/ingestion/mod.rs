//! Ingestion: turning CSV bytes and local CSV files into [`crate::types::DataSet`]s.
//!
//! - [`csv`]: schema-driven parsing plus schema inference for objects fetched from storage
//! - [`local`]: discovering the local CSV files to upload

pub mod csv;
pub mod local;

pub use self::csv::{read_csv_bytes, read_csv_path};
pub use local::{csv_files_in_dir, dataset_name_for, object_key_for};
