//! [`ObjectStoreGateway`] backed by the `object_store` crate.
//!
//! The `object_store` client is async; [`CloudObjectStore`] owns a current-thread tokio runtime
//! and blocks on every call, so callers stay synchronous. Creating S3 buckets goes through a
//! [`BucketProvisioner`], since `object_store` only works inside existing buckets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

use super::buckets::BucketProvisioner;
use super::{ObjectStoreGateway, Provisioned, validate_name};

/// Where containers live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local storage for tests and dry runs.
    Memory,
    /// One sub-directory of `root` per container.
    LocalFileSystem { root: PathBuf },
    /// One S3 bucket per container, created when missing. Credentials come from the usual
    /// `AWS_*` variables.
    #[cfg(feature = "aws")]
    S3 {
        region: String,
        /// S3-compatible endpoint (MinIO, LocalStack, ...).
        endpoint: Option<String>,
    },
}

/// Blocking object storage over an `object_store` backend.
#[derive(Debug)]
pub struct CloudObjectStore {
    backend: StorageBackend,
    runtime: Arc<Runtime>,
    containers: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    buckets: Option<Arc<dyn BucketProvisioner>>,
}

impl CloudObjectStore {
    /// Create a gateway for `backend`. Nothing is contacted until the first call.
    pub fn new(backend: StorageBackend) -> PipelineResult<Self> {
        let runtime = Arc::new(
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?,
        );
        let buckets: Option<Arc<dyn BucketProvisioner>> = match &backend {
            #[cfg(feature = "aws")]
            StorageBackend::S3 { region, endpoint } => {
                let buckets =
                    super::buckets::S3Buckets::new(Arc::clone(&runtime), region, endpoint.clone());
                Some(Arc::new(buckets))
            }
            _ => None,
        };
        Ok(Self {
            backend,
            runtime,
            containers: Mutex::new(HashMap::new()),
            buckets,
        })
    }

    /// Replace the provisioner used to create missing buckets.
    pub fn with_bucket_provisioner(mut self, buckets: Arc<dyn BucketProvisioner>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    pub fn in_memory() -> PipelineResult<Self> {
        Self::new(StorageBackend::Memory)
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// Read an object, or `None` if it does not exist.
    pub fn try_get(&self, container: &str, key: &str) -> PipelineResult<Option<Vec<u8>>> {
        let store = self.container(container)?;
        let path = ObjectPath::from(key);
        let found = self.runtime.block_on(async {
            let result = match store.get(&path).await {
                Ok(result) => result,
                Err(object_store::Error::NotFound { .. }) => return Ok(None),
                Err(e) => return Err(e),
            };
            result.bytes().await.map(|b| Some(b.to_vec()))
        })?;
        Ok(found)
    }

    /// Write `bytes` as `key`, replacing any existing object.
    pub fn put_bytes(&self, container: &str, key: &str, bytes: Vec<u8>) -> PipelineResult<()> {
        let store = self.container(container)?;
        let path = ObjectPath::from(key);
        self.runtime
            .block_on(store.put(&path, PutPayload::from(bytes)))?;
        Ok(())
    }

    /// Keys under `prefix` (or all keys), sorted.
    pub fn list_prefix(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> PipelineResult<Vec<String>> {
        let store = self.container(container)?;
        let prefix = prefix.map(ObjectPath::from);
        let metas: Vec<ObjectMeta> = self
            .runtime
            .block_on(store.list(prefix.as_ref()).try_collect())?;
        let mut keys: Vec<String> = metas.into_iter().map(|m| m.location.to_string()).collect();
        keys.sort();
        Ok(keys)
    }

    fn container(&self, name: &str) -> PipelineResult<Arc<dyn ObjectStore>> {
        validate_name(name)?;
        let mut containers = self
            .containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(store) = containers.get(name) {
            return Ok(Arc::clone(store));
        }

        let store: Arc<dyn ObjectStore> = match &self.backend {
            StorageBackend::Memory => {
                return Err(PipelineError::ContainerNotFound(name.to_owned()));
            }
            StorageBackend::LocalFileSystem { root } => {
                let dir = root.join(name);
                if !dir.is_dir() {
                    return Err(PipelineError::ContainerNotFound(name.to_owned()));
                }
                Arc::new(LocalFileSystem::new_with_prefix(dir)?)
            }
            #[cfg(feature = "aws")]
            StorageBackend::S3 { region, endpoint } => {
                Arc::new(build_s3(name, region, endpoint.as_deref())?)
            }
        };
        containers.insert(name.to_owned(), Arc::clone(&store));
        Ok(store)
    }
}

#[cfg(feature = "aws")]
fn build_s3(
    bucket: &str,
    region: &str,
    endpoint: Option<&str>,
) -> PipelineResult<object_store::aws::AmazonS3> {
    let mut builder = object_store::aws::AmazonS3Builder::from_env()
        .with_region(region)
        .with_bucket_name(bucket);
    if let Some(endpoint) = endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"));
    }
    Ok(builder.build()?)
}

impl ObjectStoreGateway for CloudObjectStore {
    fn ensure_container(&self, name: &str) -> PipelineResult<Provisioned> {
        validate_name(name)?;
        match &self.backend {
            StorageBackend::Memory => {
                let mut containers = self
                    .containers
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if containers.contains_key(name) {
                    return Ok(Provisioned::AlreadyExists);
                }
                containers.insert(name.to_owned(), Arc::new(InMemory::new()));
                Ok(Provisioned::Created)
            }
            StorageBackend::LocalFileSystem { root } => {
                let dir = root.join(name);
                if dir.is_dir() {
                    return Ok(Provisioned::AlreadyExists);
                }
                std::fs::create_dir_all(&dir)?;
                debug!(dir = %dir.display(), "created container directory");
                Ok(Provisioned::Created)
            }
            #[cfg(feature = "aws")]
            StorageBackend::S3 { .. } => {
                let buckets = self
                    .buckets
                    .as_ref()
                    .ok_or_else(|| PipelineError::ContainerNotFound(name.to_owned()))?;
                super::buckets::ensure_bucket(buckets.as_ref(), name)
            }
        }
    }

    fn list_objects(&self, container: &str) -> PipelineResult<Vec<String>> {
        self.list_prefix(container, None)
    }

    fn get_object(&self, container: &str, key: &str) -> PipelineResult<Vec<u8>> {
        let store = self.container(container)?;
        let path = ObjectPath::from(key);
        let bytes = self.runtime.block_on(async {
            let result = store.get(&path).await?;
            result.bytes().await
        })?;
        Ok(bytes.to_vec())
    }

    fn put_object(&self, container: &str, local_path: &Path, key: &str) -> PipelineResult<()> {
        let bytes = std::fs::read(local_path)?;
        self.put_bytes(container, key, bytes)
    }

    fn delete_object(&self, container: &str, key: &str) -> PipelineResult<()> {
        let store = self.container(container)?;
        let path = ObjectPath::from(key);
        match self.runtime.block_on(store.delete(&path)) {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
