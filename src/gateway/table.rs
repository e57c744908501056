//! [`KeyValueStore`] backends.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::types::Record;

use super::objects::CloudObjectStore;
use super::{
    KeyValueStore, ObjectStoreGateway, Provisioned, apply_update, record_key, validate_name,
};

#[derive(Debug, Default)]
struct MemoryTable {
    key_attribute: String,
    records: BTreeMap<String, Record>,
}

/// Tables held in process memory.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of `table`, ordered by key.
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.lock()
            .get(table)
            .map(|t| t.records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryTable>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut MemoryTable) -> PipelineResult<T>,
    ) -> PipelineResult<T> {
        let mut tables = self.lock();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| PipelineError::TableNotFound(table.to_owned()))?;
        f(t)
    }
}

impl KeyValueStore for MemoryTableStore {
    fn ensure_table(&self, name: &str, key_attribute: &str) -> PipelineResult<Provisioned> {
        validate_name(name)?;
        let mut tables = self.lock();
        if tables.contains_key(name) {
            return Ok(Provisioned::AlreadyExists);
        }
        tables.insert(
            name.to_owned(),
            MemoryTable {
                key_attribute: key_attribute.to_owned(),
                records: BTreeMap::new(),
            },
        );
        Ok(Provisioned::Created)
    }

    fn put_record(&self, table: &str, record: &Record) -> PipelineResult<()> {
        self.with_table(table, |t| {
            let key = record_key(record, &t.key_attribute)?;
            t.records.insert(key, record.clone());
            Ok(())
        })
    }

    fn update_record(&self, table: &str, id: &str, updates: &Record) -> PipelineResult<Record> {
        self.with_table(table, |t| {
            let updated = apply_update(t.records.get(id).cloned(), &t.key_attribute, id, updates)?;
            t.records.insert(id.to_owned(), updated.clone());
            Ok(updated)
        })
    }

    fn delete_record(&self, table: &str, id: &str) -> PipelineResult<()> {
        self.with_table(table, |t| {
            t.records.remove(id);
            Ok(())
        })
    }

    fn get_record(&self, table: &str, id: &str) -> PipelineResult<Option<Record>> {
        self.with_table(table, |t| Ok(t.records.get(id).cloned()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TableDescriptor {
    key_attribute: String,
}

/// Tables persisted as JSON objects inside an object-store container.
///
/// Layout under the container:
///
/// - `tables/<table>/_table.json`: descriptor with the key attribute
/// - `tables/<table>/items/<hex(key)>.json`: one object per record
///
/// Keys are hex-encoded so any id text maps to a valid object path.
#[derive(Debug)]
pub struct ObjectTableStore {
    objects: Arc<CloudObjectStore>,
    container: String,
}

impl ObjectTableStore {
    /// Store tables in `container`, which must already exist.
    pub fn new(objects: Arc<CloudObjectStore>, container: impl Into<String>) -> Self {
        Self {
            objects,
            container: container.into(),
        }
    }

    fn descriptor_key(table: &str) -> String {
        format!("tables/{table}/_table.json")
    }

    fn item_key(table: &str, id: &str) -> String {
        format!("tables/{table}/items/{}.json", hex::encode(id))
    }

    fn descriptor(&self, table: &str) -> PipelineResult<TableDescriptor> {
        validate_name(table)?;
        let bytes = self
            .objects
            .try_get(&self.container, &Self::descriptor_key(table))?
            .ok_or_else(|| PipelineError::TableNotFound(table.to_owned()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn read(&self, table: &str, id: &str) -> PipelineResult<Option<Record>> {
        self.objects
            .try_get(&self.container, &Self::item_key(table, id))?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(PipelineError::from)
    }

    fn write(&self, table: &str, id: &str, record: &Record) -> PipelineResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.objects
            .put_bytes(&self.container, &Self::item_key(table, id), bytes)
    }

    /// All records of `table`, ordered by hex-encoded key.
    pub fn records(&self, table: &str) -> PipelineResult<Vec<Record>> {
        self.descriptor(table)?;
        let prefix = format!("tables/{table}/items");
        let mut out = Vec::new();
        for key in self.objects.list_prefix(&self.container, Some(&prefix))? {
            if let Some(bytes) = self.objects.try_get(&self.container, &key)? {
                out.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(out)
    }
}

impl KeyValueStore for ObjectTableStore {
    fn ensure_table(&self, name: &str, key_attribute: &str) -> PipelineResult<Provisioned> {
        validate_name(name)?;
        let key = Self::descriptor_key(name);
        if self.objects.try_get(&self.container, &key)?.is_some() {
            return Ok(Provisioned::AlreadyExists);
        }
        let descriptor = TableDescriptor {
            key_attribute: key_attribute.to_owned(),
        };
        self.objects
            .put_bytes(&self.container, &key, serde_json::to_vec(&descriptor)?)?;
        debug!(table = name, key_attribute, "created table descriptor");
        Ok(Provisioned::Created)
    }

    fn put_record(&self, table: &str, record: &Record) -> PipelineResult<()> {
        let descriptor = self.descriptor(table)?;
        let id = record_key(record, &descriptor.key_attribute)?;
        self.write(table, &id, record)
    }

    fn update_record(&self, table: &str, id: &str, updates: &Record) -> PipelineResult<Record> {
        let descriptor = self.descriptor(table)?;
        let updated = apply_update(self.read(table, id)?, &descriptor.key_attribute, id, updates)?;
        self.write(table, id, &updated)?;
        Ok(updated)
    }

    fn delete_record(&self, table: &str, id: &str) -> PipelineResult<()> {
        self.descriptor(table)?;
        let key = Self::item_key(table, id);
        self.objects.delete_object(&self.container, &key)
    }

    fn get_record(&self, table: &str, id: &str) -> PipelineResult<Option<Record>> {
        self.descriptor(table)?;
        self.read(table, id)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::types::Value;

    fn sample() -> Record {
        Record::from([
            ("id".to_owned(), Value::text("a/1")),
            (
                "amount".to_owned(),
                Value::Decimal(Decimal::from_str("19.99").unwrap()),
            ),
        ])
    }

    fn exercise(store: &dyn KeyValueStore) {
        assert!(matches!(
            store.put_record("items", &sample()),
            Err(PipelineError::TableNotFound(_))
        ));
        assert_eq!(store.ensure_table("items", "id").unwrap(), Provisioned::Created);
        assert_eq!(
            store.ensure_table("items", "id").unwrap(),
            Provisioned::AlreadyExists
        );

        store.put_record("items", &sample()).unwrap();
        assert_eq!(store.get_record("items", "a/1").unwrap(), Some(sample()));

        let no_id = Record::from([("amount".to_owned(), Value::Int64(1))]);
        assert!(matches!(
            store.put_record("items", &no_id),
            Err(PipelineError::MissingKeyAttribute { .. })
        ));

        let updates = Record::from([("status".to_owned(), Value::text("paid"))]);
        let updated = store.update_record("items", "a/1", &updates).unwrap();
        assert_eq!(updated["status"], Value::text("paid"));
        assert_eq!(updated["amount"], sample()["amount"]);
        assert_eq!(store.get_record("items", "a/1").unwrap(), Some(updated));

        store.delete_record("items", "a/1").unwrap();
        assert_eq!(store.get_record("items", "a/1").unwrap(), None);
        store.delete_record("items", "a/1").unwrap();
    }

    #[test]
    fn memory_table_store_contract() {
        exercise(&MemoryTableStore::new());
    }

    #[test]
    fn object_table_store_contract() {
        let objects = Arc::new(CloudObjectStore::in_memory().unwrap());
        objects.ensure_container("bucket").unwrap();
        exercise(&ObjectTableStore::new(Arc::clone(&objects), "bucket"));
    }

    #[test]
    fn object_table_records_survive_reopen() {
        let objects = Arc::new(CloudObjectStore::in_memory().unwrap());
        objects.ensure_container("bucket").unwrap();
        let first = ObjectTableStore::new(Arc::clone(&objects), "bucket");
        first.ensure_table("items", "id").unwrap();
        first.put_record("items", &sample()).unwrap();

        let second = ObjectTableStore::new(objects, "bucket");
        assert_eq!(
            second.ensure_table("items", "id").unwrap(),
            Provisioned::AlreadyExists
        );
        assert_eq!(second.records("items").unwrap(), vec![sample()]);
    }
}
