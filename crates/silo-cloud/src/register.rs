//! Registration of the object-store URL schemes
//!
//! | scheme          | store                                   | query parameters            |
//! |-----------------|-----------------------------------------|-----------------------------|
//! | `s3`            | Amazon S3, bucket = host                | `sse`, `endpoint`           |
//! | `gs`            | Google Cloud Storage, bucket = host     | `credentialsfile`           |
//! | `az`            | Azure Blob Storage, container = host    |                             |
//! | `memory-bucket` | [`MemoryBucket`], fresh per open        |                             |
//!
//! Credentials and regions come from the environment, as `object_store`'s
//! `from_env` builders read them.

use crate::adapter::ObjectStoreBackend;
use crate::bucket::MemoryBucket;
use crate::error::CloudError;
use crate::store::ObjectStreamStore;
use object_store::aws::{AmazonS3Builder, AmazonS3ConfigKey};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::ObjectStore;
use silo_core::{Registry, Result, SiloConfig, StoreError, StreamStore};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Add `s3`, `gs`, `az` and `memory-bucket` to `registry`.
pub fn register_backends(registry: &mut Registry) -> Result<()> {
    registry.register("s3", |url, config| {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket_of(url)?);
        if let Some(sse) = query_value(url, "sse") {
            let key: AmazonS3ConfigKey = "aws_server_side_encryption"
                .parse()
                .map_err(CloudError::from)?;
            builder = builder.with_config(key, sse);
        }
        if let Some(endpoint) = query_value(url, "endpoint") {
            // Custom endpoints (MinIO and friends) are usually plain HTTP and path-style.
            builder = builder
                .with_allow_http(endpoint.starts_with("http://"))
                .with_virtual_hosted_style_request(false)
                .with_endpoint(endpoint);
        }
        let store = builder.build().map_err(CloudError::from)?;
        Ok(object_store_backed(store, config))
    })?;

    registry.register("gs", |url, config| {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket_of(url)?);
        if let Some(path) = query_value(url, "credentialsfile") {
            builder = builder.with_service_account_path(path);
        }
        let store = builder.build().map_err(CloudError::from)?;
        Ok(object_store_backed(store, config))
    })?;

    registry.register("az", |url, config| {
        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(bucket_of(url)?)
            .build()
            .map_err(CloudError::from)?;
        Ok(object_store_backed(store, config))
    })?;

    registry.register("memory-bucket", |_, config| {
        let bucket = MemoryBucket::with_page_size(config.listing.page_size);
        Ok(Box::new(ObjectStreamStore::with_config(bucket, config)))
    })?;

    Ok(())
}

fn object_store_backed<S: ObjectStore>(store: S, config: &SiloConfig) -> Box<dyn StreamStore> {
    debug!(store = %store, "opened object store");
    let backend = ObjectStoreBackend::with_transfer(Arc::new(store), &config.transfer);
    Box::new(ObjectStreamStore::with_config(backend, config))
}

fn bucket_of(url: &Url) -> Result<String> {
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(StoreError::InvalidUrl(format!("{url}: missing bucket name"))),
    }
}

fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::{read_file, write_file};

    #[test]
    fn test_registers_every_scheme_once() {
        let mut registry = Registry::with_defaults().unwrap();
        register_backends(&mut registry).unwrap();
        assert_eq!(
            registry.schemes(),
            vec!["az", "file", "gs", "mem", "memory-bucket", "s3"]
        );

        let err = register_backends(&mut registry).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateScheme(s) if s == "s3"));
    }

    #[test]
    fn test_memory_bucket_uses_configured_page_size() {
        let mut config = SiloConfig::default();
        config.listing.page_size = 3;
        let mut registry = Registry::with_config(config);
        register_backends(&mut registry).unwrap();

        let store = registry.open("memory-bucket://scratch").unwrap();
        for i in 0..10 {
            write_file(&store, &format!("/f{i}"), b"x").unwrap();
        }
        assert_eq!(store.readdir("/").unwrap().len(), 10);
        assert_eq!(read_file(&store, "/f7").unwrap(), b"x");
    }

    #[test]
    fn test_bucket_name_required() {
        let mut registry = Registry::new();
        register_backends(&mut registry).unwrap();
        assert!(matches!(
            registry.open("s3:///key").err().unwrap(),
            StoreError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_query_value() {
        let url = Url::parse("s3://bucket?sse=aws:kms&endpoint=http://localhost:9000").unwrap();
        assert_eq!(query_value(&url, "sse").as_deref(), Some("aws:kms"));
        assert_eq!(
            query_value(&url, "endpoint").as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(query_value(&url, "credentialsfile"), None);
    }
}
