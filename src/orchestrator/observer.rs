use std::error::Error as StdError;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::logging::unix_ts;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (the step failed and was skipped).
    Error,
    /// Critical error (I/O or other infrastructure failures).
    Critical,
}

/// One unit of work inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsureContainer,
    Upload,
    List,
    Fetch,
    Merge,
    EnsureTable,
    EnsureTopic,
    Subscribe,
    Insert,
    Notify,
    Update,
    Delete,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnsureContainer => "ensure_container",
            Self::Upload => "upload",
            Self::List => "list",
            Self::Fetch => "fetch",
            Self::Merge => "merge",
            Self::EnsureTable => "ensure_table",
            Self::EnsureTopic => "ensure_topic",
            Self::Subscribe => "subscribe",
            Self::Insert => "insert",
            Self::Notify => "notify",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a callback is about: the step plus the thing it acted on (object key, record id, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub step: Step,
    pub subject: String,
}

impl StepContext {
    pub fn new(step: Step, subject: impl Into<String>) -> Self {
        Self {
            step,
            subject: subject.into(),
        }
    }
}

/// Stats reported on success. `rows` is zero for steps that do not touch rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub rows: usize,
}

/// Observer interface for run progress.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait RunObserver: Send + Sync {
    fn on_success(&self, _ctx: &StepContext, _stats: StepStats) {}

    fn on_failure(&self, _ctx: &StepContext, _severity: Severity, _error: &PipelineError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn RunObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn RunObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl RunObserver for CompositeObserver {
    fn on_success(&self, ctx: &StepContext, stats: StepStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits run events as `tracing` events. This is the orchestrator's default observer.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn on_success(&self, ctx: &StepContext, stats: StepStats) {
        info!(step = %ctx.step, subject = %ctx.subject, rows = stats.rows, "step ok");
    }

    fn on_failure(&self, ctx: &StepContext, severity: Severity, err: &PipelineError) {
        match severity {
            Severity::Info => info!(step = %ctx.step, subject = %ctx.subject, %err, "step failed"),
            Severity::Warning => {
                warn!(step = %ctx.step, subject = %ctx.subject, %err, "step failed")
            }
            Severity::Error | Severity::Critical => {
                error!(step = %ctx.step, subject = %ctx.subject, ?severity, %err, "step failed")
            }
        }
    }

    fn on_alert(&self, ctx: &StepContext, severity: Severity, err: &PipelineError) {
        error!(step = %ctx.step, subject = %ctx.subject, ?severity, %err, "ALERT");
    }
}

/// Appends run events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl RunObserver for FileObserver {
    fn on_success(&self, ctx: &StepContext, stats: StepStats) {
        self.append_line(&format!(
            "{} ok step={} subject={} rows={}",
            unix_ts(),
            ctx.step,
            ctx.subject,
            stats.rows
        ));
    }

    fn on_failure(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        self.append_line(&format!(
            "{} fail severity={severity:?} step={} subject={} err={error}",
            unix_ts(),
            ctx.step,
            ctx.subject,
        ));
    }

    fn on_alert(&self, ctx: &StepContext, severity: Severity, error: &PipelineError) {
        self.append_line(&format!(
            "{} ALERT severity={severity:?} step={} subject={} err={error}",
            unix_ts(),
            ctx.step,
            ctx.subject,
        ));
    }
}

/// I/O-rooted failures are `Critical`; everything else is `Error`.
pub fn severity_for_error(e: &PipelineError) -> Severity {
    match e {
        PipelineError::Io(_) => Severity::Critical,
        PipelineError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        PipelineError::ObjectStore(err) => {
            if error_chain_contains_io(err) {
                Severity::Critical
            } else {
                Severity::Error
            }
        }
        _ => Severity::Error,
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        events: Mutex<Vec<String>>,
    }

    impl RunObserver for Counting {
        fn on_success(&self, ctx: &StepContext, _stats: StepStats) {
            self.events.lock().unwrap().push(format!("ok:{}", ctx.step));
        }

        fn on_failure(&self, ctx: &StepContext, _severity: Severity, _error: &PipelineError) {
            self.events.lock().unwrap().push(format!("fail:{}", ctx.step));
        }
    }

    #[test]
    fn io_errors_are_critical() {
        let io = PipelineError::Io(std::io::Error::other("disk"));
        assert_eq!(severity_for_error(&io), Severity::Critical);
        let data = PipelineError::MissingKeyAttribute {
            attribute: "id".into(),
        };
        assert_eq!(severity_for_error(&data), Severity::Error);
    }

    #[test]
    fn composite_fans_out_and_alert_defaults_to_failure() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let composite = CompositeObserver::new(vec![a.clone(), b.clone()]);

        let ctx = StepContext::new(Step::Fetch, "raw/a.csv");
        composite.on_success(&ctx, StepStats { rows: 2 });
        let err = PipelineError::TableNotFound("t".into());
        composite.on_alert(&ctx, Severity::Error, &err);

        for o in [&a, &b] {
            assert_eq!(
                *o.events.lock().unwrap(),
                vec!["ok:fetch".to_owned(), "fail:fetch".to_owned()]
            );
        }
    }

    #[test]
    fn file_observer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let obs = FileObserver::new(&path);

        obs.on_success(&StepContext::new(Step::Insert, "0"), StepStats { rows: 1 });
        obs.on_alert(
            &StepContext::new(Step::Upload, "raw/x.csv"),
            Severity::Critical,
            &PipelineError::Io(std::io::Error::other("boom")),
        );

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("ok step=insert subject=0 rows=1"));
        assert!(lines[1].contains("ALERT severity=Critical step=upload"));
    }
}
