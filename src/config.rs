//! Run settings read from the environment.

use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};
use crate::gateway::StorageBackend;

pub const DEFAULT_TOPIC_NAME: &str = "record_notifications";
pub const DEFAULT_STORAGE_ROOT: &str = "data";
pub const DEFAULT_OUTBOX_DIR: &str = "outbox";

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub region: String,
    /// Container holding raw CSV objects and the persisted table.
    pub bucket: String,
    pub table_name: String,
    /// Local directory whose `*.csv` files are uploaded.
    pub raw_folder: PathBuf,
    pub subscriber_email: String,
    pub topic_name: String,
    pub storage: StorageBackend,
    pub outbox_dir: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl PipelineConfig {
    /// Read settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> PipelineResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns a variable's value if set.
    ///
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PipelineResult<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str| {
            get(name).ok_or_else(|| {
                PipelineError::config(format!("missing required environment variable {name}"))
            })
        };

        let region = required("AWS_REGION")?;
        let bucket = required("AWS_BUCKET_NAME")?;
        let table_name = required("TABLE_NAME")?;
        let raw_folder = PathBuf::from(required("RAW_FOLDER_PATH")?);
        let subscriber_email = required("SUBSCRIBER_EMAIL")?;

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("s3") {
            "memory" => StorageBackend::Memory,
            "local" => StorageBackend::LocalFileSystem {
                root: PathBuf::from(
                    get("STORAGE_ROOT").unwrap_or_else(|| DEFAULT_STORAGE_ROOT.to_owned()),
                ),
            },
            #[cfg(feature = "aws")]
            "s3" => StorageBackend::S3 {
                region: region.clone(),
                endpoint: get("S3_ENDPOINT"),
            },
            other => {
                return Err(PipelineError::config(format!(
                    "unsupported STORAGE_BACKEND '{other}'"
                )));
            }
        };

        Ok(Self {
            region,
            bucket,
            table_name,
            raw_folder,
            subscriber_email,
            topic_name: get("TOPIC_NAME").unwrap_or_else(|| DEFAULT_TOPIC_NAME.to_owned()),
            storage,
            outbox_dir: PathBuf::from(
                get("OUTBOX_DIR").unwrap_or_else(|| DEFAULT_OUTBOX_DIR.to_owned()),
            ),
            log_file: get("PIPELINE_LOG_FILE").map(PathBuf::from),
        })
    }
}
