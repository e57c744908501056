//! Bucket provisioning, which the `object_store` client does not offer.

use std::fmt;

use tracing::info;

use crate::error::PipelineResult;

use super::Provisioned;

#[cfg(feature = "aws")]
pub use s3::S3Buckets;

/// Checks for and creates storage buckets.
pub trait BucketProvisioner: Send + Sync + fmt::Debug {
    fn bucket_exists(&self, bucket: &str) -> PipelineResult<bool>;

    /// Create the bucket. One that appeared in the meantime counts as `AlreadyExists`.
    fn create_bucket(&self, bucket: &str) -> PipelineResult<Provisioned>;
}

/// Create `bucket` unless it already exists.
pub fn ensure_bucket(
    provisioner: &dyn BucketProvisioner,
    bucket: &str,
) -> PipelineResult<Provisioned> {
    if provisioner.bucket_exists(bucket)? {
        return Ok(Provisioned::AlreadyExists);
    }
    let status = provisioner.create_bucket(bucket)?;
    info!(bucket, ?status, "provisioned bucket");
    Ok(status)
}

/// Location constraint to send with a create request.
///
/// `us-east-1` rejects an explicit constraint; every other region needs one.
pub fn location_constraint(region: &str) -> Option<&str> {
    (!region.is_empty() && region != "us-east-1").then_some(region)
}

#[cfg(feature = "aws")]
mod s3 {
    use std::sync::{Arc, OnceLock};

    use aws_sdk_s3::Client;
    use aws_sdk_s3::config::Region;
    use aws_sdk_s3::error::DisplayErrorContext;
    use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
    use tokio::runtime::Runtime;

    use super::{BucketProvisioner, location_constraint};
    use crate::error::{PipelineError, PipelineResult};
    use crate::gateway::Provisioned;

    /// S3 buckets through the AWS SDK. Credentials come from the usual `AWS_*` variables and
    /// profiles; the client is built on first use.
    #[derive(Debug)]
    pub struct S3Buckets {
        runtime: Arc<Runtime>,
        region: String,
        endpoint: Option<String>,
        client: OnceLock<Client>,
    }

    impl S3Buckets {
        pub fn new(
            runtime: Arc<Runtime>,
            region: impl Into<String>,
            endpoint: Option<String>,
        ) -> Self {
            Self {
                runtime,
                region: region.into(),
                endpoint,
                client: OnceLock::new(),
            }
        }

        fn client(&self) -> &Client {
            self.client.get_or_init(|| {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()));
                if let Some(endpoint) = &self.endpoint {
                    loader = loader.endpoint_url(endpoint.as_str());
                }
                let shared = self.runtime.block_on(loader.load());
                let config = aws_sdk_s3::config::Builder::from(&shared)
                    .force_path_style(self.endpoint.is_some())
                    .build();
                Client::from_conf(config)
            })
        }
    }

    fn bucket_error(bucket: &str, err: impl std::error::Error + 'static) -> PipelineError {
        PipelineError::Bucket {
            bucket: bucket.to_owned(),
            message: DisplayErrorContext(&err).to_string(),
        }
    }

    impl BucketProvisioner for S3Buckets {
        fn bucket_exists(&self, bucket: &str) -> PipelineResult<bool> {
            let client = self.client();
            match self.runtime.block_on(client.head_bucket().bucket(bucket).send()) {
                Ok(_) => Ok(true),
                Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => Ok(false),
                Err(e) => Err(bucket_error(bucket, e)),
            }
        }

        fn create_bucket(&self, bucket: &str) -> PipelineResult<Provisioned> {
            let client = self.client();
            let mut request = client.create_bucket().bucket(bucket);
            if let Some(region) = location_constraint(&self.region) {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region))
                        .build(),
                );
            }
            match self.runtime.block_on(request.send()) {
                Ok(_) => Ok(Provisioned::Created),
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|s| s.is_bucket_already_owned_by_you()) =>
                {
                    Ok(Provisioned::AlreadyExists)
                }
                Err(e) => Err(bucket_error(bucket, e)),
            }
        }
    }
}
