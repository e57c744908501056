use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use csv_table_sync::PipelineResult;
use csv_table_sync::config::PipelineConfig;
use csv_table_sync::gateway::{
    CloudObjectStore, ObjectStoreGateway, ObjectTableStore, OutboxNotifier,
};
use csv_table_sync::logging::init_logging;
use csv_table_sync::orchestrator::{
    CompositeObserver, FileObserver, Orchestrator, RunObserver, RunSettings, TracingObserver,
};

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_logging();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("pipeline failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> PipelineResult<()> {
    let config = PipelineConfig::from_env()?;
    info!(
        region = %config.region,
        bucket = %config.bucket,
        table = %config.table_name,
        storage = ?config.storage,
        "starting pipeline"
    );

    let objects = Arc::new(CloudObjectStore::new(config.storage.clone())?);
    // The table lives next to the raw objects, so the container has to exist first.
    objects.ensure_container(&config.bucket)?;
    let table = Arc::new(ObjectTableStore::new(Arc::clone(&objects), config.bucket.clone()));
    let notifier = Arc::new(OutboxNotifier::new(&config.outbox_dir));

    let mut observers: Vec<Arc<dyn RunObserver>> = vec![Arc::new(TracingObserver)];
    if let Some(path) = &config.log_file {
        observers.push(Arc::new(FileObserver::new(path)));
    }

    let summary = Orchestrator::new(RunSettings::from(&config), objects, table, notifier)
        .with_observer(Arc::new(CompositeObserver::new(observers)))
        .run()?;

    info!(
        uploaded = summary.uploaded,
        loaded = summary.loaded,
        failed_files = summary.failed_files,
        merged_rows = summary.merged_rows,
        inserted = summary.inserted,
        failed_records = summary.failed_records,
        notified = summary.notified,
        "data processing complete"
    );
    Ok(())
}
