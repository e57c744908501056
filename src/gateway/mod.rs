//! Collaborator contracts for storage and notifications, plus their backends.
//!
//! The orchestrator only talks to the three traits defined here, so tests can swap in the
//! in-memory backends:
//!
//! - [`ObjectStoreGateway`]: containers of CSV objects ([`CloudObjectStore`])
//! - [`KeyValueStore`]: tables of records keyed by one attribute ([`MemoryTableStore`],
//!   [`ObjectTableStore`])
//! - [`Notifier`]: topics, subscriptions, and change messages ([`MemoryNotifier`],
//!   [`OutboxNotifier`])
//!
//! All methods block until the backend answers.

use std::fmt;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::read_csv_bytes;
use crate::types::{DataSet, Record, Value, record_to_json};

pub mod buckets;
pub mod notify;
pub mod objects;
pub mod table;

#[cfg(feature = "aws")]
pub use buckets::S3Buckets;
pub use buckets::{BucketProvisioner, ensure_bucket};
pub use objects::{CloudObjectStore, StorageBackend};
pub use notify::{MemoryNotifier, OutboxNotifier, PublishedMessage};
pub use table::{MemoryTableStore, ObjectTableStore};

/// Outcome of an `ensure_*` call. An existing resource is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

/// Kind of record mutation a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a topic returned by [`Notifier::ensure_topic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    /// Topic name as requested.
    pub name: String,
    /// Backend-specific address of the topic.
    pub address: String,
}

/// Object storage: containers holding keyed objects.
pub trait ObjectStoreGateway: Send + Sync {
    /// Create the container unless it already exists.
    fn ensure_container(&self, name: &str) -> PipelineResult<Provisioned>;

    /// Keys of every object in the container, sorted.
    fn list_objects(&self, container: &str) -> PipelineResult<Vec<String>>;

    /// Raw contents of one object.
    fn get_object(&self, container: &str, key: &str) -> PipelineResult<Vec<u8>>;

    /// Upload a local file as `key`.
    fn put_object(&self, container: &str, local_path: &Path, key: &str) -> PipelineResult<()>;

    /// Remove an object. Removing a missing object succeeds.
    fn delete_object(&self, container: &str, key: &str) -> PipelineResult<()>;

    /// Read a CSV object into a dataset with inferred column types.
    fn get_object_as_table(&self, container: &str, key: &str) -> PipelineResult<DataSet> {
        read_csv_bytes(&self.get_object(container, key)?)
    }

    /// Write an object's contents to a local file.
    fn download_object(&self, container: &str, key: &str, local_path: &Path) -> PipelineResult<()> {
        let bytes = self.get_object(container, key)?;
        std::fs::write(local_path, bytes)?;
        Ok(())
    }
}

/// Key-value tables of [`Record`]s.
pub trait KeyValueStore: Send + Sync {
    /// Create the table, keyed by `key_attribute`, unless it already exists.
    fn ensure_table(&self, name: &str, key_attribute: &str) -> PipelineResult<Provisioned>;

    /// Insert or replace a record. Fails if the record has no usable key attribute.
    fn put_record(&self, table: &str, record: &Record) -> PipelineResult<()>;

    /// Set `updates` on the record `id`, creating it if absent. Returns the stored record.
    fn update_record(&self, table: &str, id: &str, updates: &Record) -> PipelineResult<Record>;

    /// Remove the record `id`. Removing a missing record succeeds.
    fn delete_record(&self, table: &str, id: &str) -> PipelineResult<()>;

    fn get_record(&self, table: &str, id: &str) -> PipelineResult<Option<Record>>;
}

/// Pub/sub topics carrying record change messages.
pub trait Notifier: Send + Sync {
    /// Create the topic unless it already exists.
    fn ensure_topic(&self, name: &str) -> PipelineResult<(TopicHandle, Provisioned)>;

    /// Subscribe an email address unless it already is.
    fn ensure_subscription(&self, topic: &TopicHandle, email: &str) -> PipelineResult<Provisioned>;

    /// Publish a change message; returns the message id.
    fn publish(
        &self,
        topic: &TopicHandle,
        action: ChangeAction,
        item: &Record,
    ) -> PipelineResult<String>;
}

/// Text key of `record` under `attribute`. Missing, null, and empty values are rejected.
pub fn record_key(record: &Record, attribute: &str) -> PipelineResult<String> {
    match record.get(attribute) {
        None | Some(Value::Null) => Err(missing_key(attribute)),
        Some(v) => {
            let key = v.to_string();
            if key.is_empty() {
                Err(missing_key(attribute))
            } else {
                Ok(key)
            }
        }
    }
}

fn missing_key(attribute: &str) -> PipelineError {
    PipelineError::MissingKeyAttribute {
        attribute: attribute.to_owned(),
    }
}

/// Apply `updates` on top of `existing` (or a fresh `{key_attribute: id}` record).
///
/// The key attribute itself cannot be updated, and an empty update is rejected.
pub(crate) fn apply_update(
    existing: Option<Record>,
    key_attribute: &str,
    id: &str,
    updates: &Record,
) -> PipelineResult<Record> {
    if updates.is_empty() {
        return Err(PipelineError::InvalidUpdate {
            message: "no fields to update".to_owned(),
        });
    }
    if updates.contains_key(key_attribute) {
        return Err(PipelineError::InvalidUpdate {
            message: format!("cannot update key attribute '{key_attribute}'"),
        });
    }
    let mut record = existing.unwrap_or_else(|| {
        Record::from([(key_attribute.to_owned(), Value::text(id))])
    });
    record.extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(record)
}

/// Message body published for a change: `{"action": "INSERT", "item": {...}}`.
pub fn notification_body(action: ChangeAction, item: &Record) -> serde_json::Value {
    serde_json::json!({
        "action": action.as_str(),
        "item": record_to_json(item),
    })
}

/// Subject line published for a change.
pub fn notification_subject(action: ChangeAction) -> String {
    format!("Table {action} Notification")
}

/// Names end up as object path segments and file names.
pub(crate) fn validate_name(name: &str) -> PipelineResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        Err(PipelineError::InvalidName(name.to_owned()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_rejects_missing_and_empty() {
        let mut r = Record::new();
        assert!(matches!(
            record_key(&r, "id"),
            Err(PipelineError::MissingKeyAttribute { .. })
        ));
        r.insert("id".into(), Value::Null);
        assert!(record_key(&r, "id").is_err());
        r.insert("id".into(), Value::text(""));
        assert!(record_key(&r, "id").is_err());
        r.insert("id".into(), Value::Int64(7));
        assert_eq!(record_key(&r, "id").unwrap(), "7");
    }

    #[test]
    fn update_cannot_touch_key() {
        let updates = Record::from([("id".to_owned(), Value::text("x"))]);
        let err = apply_update(None, "id", "1", &updates).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUpdate { .. }));
    }

    #[test]
    fn update_upserts_missing_record() {
        let updates = Record::from([("name".to_owned(), Value::text("Al"))]);
        let rec = apply_update(None, "id", "1", &updates).unwrap();
        assert_eq!(rec["id"], Value::text("1"));
        assert_eq!(rec["name"], Value::text("Al"));
    }

    #[test]
    fn body_is_tagged_with_action() {
        let item = Record::from([("id".to_owned(), Value::text("1"))]);
        let body = notification_body(ChangeAction::Delete, &item);
        assert_eq!(body, serde_json::json!({"action": "DELETE", "item": {"id": "1"}}));
        assert_eq!(notification_subject(ChangeAction::Insert), "Table INSERT Notification");
    }

    #[test]
    fn names_must_be_single_segments() {
        assert!(validate_name("raw-data").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
