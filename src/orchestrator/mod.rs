//! End-to-end sequencing of one pipeline run.
//!
//! [`Orchestrator::run`] uploads the local CSV files, reads every CSV object back, merges and
//! cleans them, writes each merged row to the table, and publishes an INSERT notification per row.
//! Per-file and per-record failures are reported to the [`RunObserver`] and skipped; only
//! failures that leave nothing to do afterwards (no container, no table, no topic) end the run
//! with an error.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::gateway::{ChangeAction, KeyValueStore, Notifier, ObjectStoreGateway, TopicHandle};
use crate::ingestion::{csv_files_in_dir, dataset_name_for, object_key_for};
use crate::processing::{ID_COLUMN, merge};
use crate::types::{NamedDataSet, Record, Value};

pub mod observer;

pub use observer::{
    CompositeObserver, FileObserver, RunObserver, Severity, Step, StepContext, StepStats,
    TracingObserver, severity_for_error,
};

/// Names and locations a run works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub bucket: String,
    pub table_name: String,
    pub topic_name: String,
    pub subscriber_email: String,
    pub raw_folder: PathBuf,
}

impl From<&PipelineConfig> for RunSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            bucket: cfg.bucket.clone(),
            table_name: cfg.table_name.clone(),
            topic_name: cfg.topic_name.clone(),
            subscriber_email: cfg.subscriber_email.clone(),
            raw_folder: cfg.raw_folder.clone(),
        }
    }
}

/// Counters describing what a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Local files uploaded.
    pub uploaded: usize,
    /// CSV objects found in the container.
    pub listed: usize,
    /// CSV objects read into datasets.
    pub loaded: usize,
    /// Uploads and reads that failed.
    pub failed_files: usize,
    pub merged_rows: usize,
    pub inserted: usize,
    pub failed_records: usize,
    /// INSERT notifications published.
    pub notified: usize,
}

/// Drives the gateways through one run, or through single-record changes.
pub struct Orchestrator {
    settings: RunSettings,
    objects: Arc<dyn ObjectStoreGateway>,
    table: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    observer: Arc<dyn RunObserver>,
    alert_at_or_above: Severity,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator reporting to a [`TracingObserver`], alerting on `Critical` failures.
    pub fn new(
        settings: RunSettings,
        objects: Arc<dyn ObjectStoreGateway>,
        table: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            objects,
            table,
            notifier,
            observer: Arc::new(TracingObserver),
            alert_at_or_above: Severity::Critical,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Severity at which failures are also passed to [`RunObserver::on_alert`].
    pub fn with_alert_threshold(mut self, severity: Severity) -> Self {
        self.alert_at_or_above = severity;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Execute the full upload → merge → insert → notify sequence.
    pub fn run(&self) -> PipelineResult<RunSummary> {
        let mut summary = RunSummary::default();
        let bucket = self.settings.bucket.as_str();

        self.track(
            StepContext::new(Step::EnsureContainer, bucket),
            self.objects.ensure_container(bucket),
        )?;

        self.upload_local_files(&mut summary);

        let keys = self.track(
            StepContext::new(Step::List, bucket),
            self.objects.list_objects(bucket),
        )?;
        let csv_keys: Vec<String> = keys.into_iter().filter(|k| k.ends_with(".csv")).collect();
        summary.listed = csv_keys.len();

        let mut datasets = Vec::with_capacity(csv_keys.len());
        for key in &csv_keys {
            let ctx = StepContext::new(Step::Fetch, key.as_str());
            match self.objects.get_object_as_table(bucket, key) {
                Ok(ds) => {
                    self.observer.on_success(&ctx, StepStats { rows: ds.row_count() });
                    datasets.push(NamedDataSet::new(dataset_name_for(key), ds));
                    summary.loaded += 1;
                }
                Err(e) => {
                    self.report_failure(&ctx, &e);
                    summary.failed_files += 1;
                }
            }
        }

        if datasets.is_empty() {
            warn!(bucket, "no CSV objects could be loaded; nothing to insert");
            return Ok(summary);
        }

        let merge_ctx = StepContext::new(Step::Merge, format!("{} datasets", datasets.len()));
        let merged = match merge(&datasets) {
            Ok(ds) => {
                self.observer
                    .on_success(&merge_ctx, StepStats { rows: ds.row_count() });
                ds
            }
            Err(e) => {
                self.report_failure(&merge_ctx, &e);
                return Ok(summary);
            }
        };
        summary.merged_rows = merged.row_count();

        let table_name = self.settings.table_name.as_str();
        self.track(
            StepContext::new(Step::EnsureTable, table_name),
            self.table.ensure_table(table_name, ID_COLUMN),
        )?;
        let topic = self.ensure_topic()?;
        // A missing subscriber only loses the emails; the rows still go in.
        self.track(
            StepContext::new(Step::Subscribe, self.settings.subscriber_email.as_str()),
            self.notifier
                .ensure_subscription(&topic, &self.settings.subscriber_email),
        )
        .ok();

        for record in merged.records() {
            let id = record.get(ID_COLUMN).map(Value::to_string).unwrap_or_default();
            let ctx = StepContext::new(Step::Insert, id.as_str());
            if let Err(e) = self.table.put_record(table_name, &record) {
                self.report_failure(&ctx, &e);
                summary.failed_records += 1;
                continue;
            }
            self.observer.on_success(&ctx, StepStats { rows: 1 });
            summary.inserted += 1;

            let notify = StepContext::new(Step::Notify, id.as_str());
            if self
                .track(notify, self.notifier.publish(&topic, ChangeAction::Insert, &record))
                .is_ok()
            {
                summary.notified += 1;
            }
        }

        info!(?summary, "run complete");
        Ok(summary)
    }

    /// Set `updates` on record `id` and publish an UPDATE notification.
    ///
    /// The notification carries `id` plus the updated fields. Returns the stored record.
    pub fn update_record(&self, id: &str, updates: &Record) -> PipelineResult<Record> {
        let ctx = StepContext::new(Step::Update, id);
        let stored = self.track(
            ctx,
            self.table
                .update_record(&self.settings.table_name, id, updates),
        )?;

        let mut payload = Record::from([(ID_COLUMN.to_owned(), Value::text(id))]);
        payload.extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.notify(ChangeAction::Update, id, &payload)?;
        Ok(stored)
    }

    /// Remove record `id` and publish a DELETE notification carrying only the id.
    pub fn delete_record(&self, id: &str) -> PipelineResult<()> {
        self.track(
            StepContext::new(Step::Delete, id),
            self.table.delete_record(&self.settings.table_name, id),
        )?;

        let payload = Record::from([(ID_COLUMN.to_owned(), Value::text(id))]);
        self.notify(ChangeAction::Delete, id, &payload)?;
        Ok(())
    }

    fn upload_local_files(&self, summary: &mut RunSummary) {
        let folder = &self.settings.raw_folder;
        let files = match csv_files_in_dir(folder) {
            Ok(files) => files,
            Err(e) => {
                let ctx = StepContext::new(Step::Upload, folder.display().to_string());
                self.report_failure(&ctx, &e);
                return;
            }
        };

        for path in files {
            let Some(key) = object_key_for(&path) else {
                warn!(path = %path.display(), "skipping file without a usable name");
                continue;
            };
            let ctx = StepContext::new(Step::Upload, key.as_str());
            match self.objects.put_object(&self.settings.bucket, &path, &key) {
                Ok(()) => {
                    self.observer.on_success(&ctx, StepStats::default());
                    summary.uploaded += 1;
                }
                Err(e) => {
                    self.report_failure(&ctx, &e);
                    summary.failed_files += 1;
                }
            }
        }
    }

    fn ensure_topic(&self) -> PipelineResult<TopicHandle> {
        let (topic, _) = self.track(
            StepContext::new(Step::EnsureTopic, self.settings.topic_name.as_str()),
            self.notifier.ensure_topic(&self.settings.topic_name),
        )?;
        Ok(topic)
    }

    fn notify(&self, action: ChangeAction, id: &str, payload: &Record) -> PipelineResult<String> {
        let topic = self.ensure_topic()?;
        self.track(
            StepContext::new(Step::Notify, id),
            self.notifier.publish(&topic, action, payload),
        )
    }

    /// Report `result` to the observer and hand it back.
    fn track<T>(&self, ctx: StepContext, result: PipelineResult<T>) -> PipelineResult<T> {
        match &result {
            Ok(_) => self.observer.on_success(&ctx, StepStats::default()),
            Err(e) => self.report_failure(&ctx, e),
        }
        result
    }

    fn report_failure(&self, ctx: &StepContext, e: &PipelineError) {
        let sev = severity_for_error(e);
        self.observer.on_failure(ctx, sev, e);
        if sev >= self.alert_at_or_above {
            self.observer.on_alert(ctx, sev, e);
        }
    }
}
