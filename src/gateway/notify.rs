//! [`Notifier`] backends.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::logging::unix_ts;
use crate::types::Record;

use super::{
    ChangeAction, Notifier, Provisioned, TopicHandle, notification_body, notification_subject,
    validate_name,
};

/// A message as handed to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub message_id: String,
    pub subject: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Default)]
struct MemoryTopic {
    subscribers: Vec<String>,
    messages: Vec<PublishedMessage>,
}

/// Topics held in process memory; lets tests inspect what was published.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    topics: Mutex<HashMap<String, MemoryTopic>>,
    next_id: AtomicU64,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published to `topic`, oldest first.
    pub fn messages(&self, topic: &str) -> Vec<PublishedMessage> {
        self.lock()
            .get(topic)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    pub fn subscribers(&self, topic: &str) -> Vec<String> {
        self.lock()
            .get(topic)
            .map(|t| t.subscribers.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryTopic>> {
        self.topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Notifier for MemoryNotifier {
    fn ensure_topic(&self, name: &str) -> PipelineResult<(TopicHandle, Provisioned)> {
        validate_name(name)?;
        let handle = TopicHandle {
            name: name.to_owned(),
            address: format!("memory:{name}"),
        };
        let mut topics = self.lock();
        if topics.contains_key(name) {
            return Ok((handle, Provisioned::AlreadyExists));
        }
        topics.insert(name.to_owned(), MemoryTopic::default());
        Ok((handle, Provisioned::Created))
    }

    fn ensure_subscription(&self, topic: &TopicHandle, email: &str) -> PipelineResult<Provisioned> {
        let mut topics = self.lock();
        let t = topics
            .get_mut(&topic.name)
            .ok_or_else(|| PipelineError::TopicNotFound(topic.name.clone()))?;
        if t.subscribers.iter().any(|s| s == email) {
            return Ok(Provisioned::AlreadyExists);
        }
        t.subscribers.push(email.to_owned());
        Ok(Provisioned::Created)
    }

    fn publish(
        &self,
        topic: &TopicHandle,
        action: ChangeAction,
        item: &Record,
    ) -> PipelineResult<String> {
        let mut topics = self.lock();
        let t = topics
            .get_mut(&topic.name)
            .ok_or_else(|| PipelineError::TopicNotFound(topic.name.clone()))?;
        let message_id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        t.messages.push(PublishedMessage {
            message_id: message_id.clone(),
            subject: notification_subject(action),
            body: notification_body(action, item),
        });
        Ok(message_id)
    }
}

/// Topics as append-only JSON-lines files in a local directory.
///
/// - `<dir>/<topic>.jsonl`: one published message per line
/// - `<dir>/<topic>.subscribers`: one subscribed address per line
///
/// A relay or a human picks messages up from there; delivery is not tracked.
#[derive(Debug)]
pub struct OutboxNotifier {
    dir: PathBuf,
    lock: Mutex<()>,
    next_id: AtomicU64,
}

impl OutboxNotifier {
    /// Outbox rooted at `dir`; the directory is created on the first `ensure_topic`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            lock: Mutex::new(()),
            next_id: AtomicU64::new(0),
        }
    }

    fn messages_path(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{topic}.jsonl"))
    }

    fn subscribers_path(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{topic}.subscribers"))
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn require_topic(&self, topic: &TopicHandle) -> PipelineResult<PathBuf> {
        validate_name(&topic.name)?;
        let path = self.messages_path(&topic.name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(PipelineError::TopicNotFound(topic.name.clone()))
        }
    }
}

fn append_line(path: &Path, line: &str) -> PipelineResult<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{line}")?;
    Ok(())
}

impl Notifier for OutboxNotifier {
    fn ensure_topic(&self, name: &str) -> PipelineResult<(TopicHandle, Provisioned)> {
        validate_name(name)?;
        let _guard = self.guard();
        let path = self.messages_path(name);
        let handle = TopicHandle {
            name: name.to_owned(),
            address: format!("outbox:{}", path.display()),
        };
        if path.is_file() {
            return Ok((handle, Provisioned::AlreadyExists));
        }
        fs::create_dir_all(&self.dir)?;
        OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "created outbox topic");
        Ok((handle, Provisioned::Created))
    }

    fn ensure_subscription(&self, topic: &TopicHandle, email: &str) -> PipelineResult<Provisioned> {
        self.require_topic(topic)?;
        let _guard = self.guard();
        let path = self.subscribers_path(&topic.name);
        if path.is_file() {
            let reader = BufReader::new(fs::File::open(&path)?);
            for line in reader.lines() {
                if line?.trim() == email {
                    return Ok(Provisioned::AlreadyExists);
                }
            }
        }
        append_line(&path, email)?;
        Ok(Provisioned::Created)
    }

    fn publish(
        &self,
        topic: &TopicHandle,
        action: ChangeAction,
        item: &Record,
    ) -> PipelineResult<String> {
        let path = self.require_topic(topic)?;
        let _guard = self.guard();
        let ts = unix_ts();
        let message_id = format!(
            "{ts}-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        let line = serde_json::json!({
            "message_id": message_id,
            "published_at": ts,
            "subject": notification_subject(action),
            "message": notification_body(action, item),
        });
        append_line(&path, &serde_json::to_string(&line)?)?;
        Ok(message_id)
    }
}
