//! OpenDAL Operator factory for gridmount storage backends

use anyhow::{Context, Result};
use gridmount_core::config::Backend;
use opendal::Operator;

/// Minimal config needed to build an operator
/// (full config lives in gridmount-core's StorageConfig)
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: Backend,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for the configured backend.
///
/// S3 uses path-style addressing (default in opendal 0.55), which is what
/// MinIO and SeaweedFS expect.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    if cfg.backend == Backend::Memory {
        return memory_operator();
    }

    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Process-local operator; everything is lost when it is dropped.
pub fn memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// Build an operator from gridmount-core config + credentials.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_from_core_config(
    storage: &gridmount_core::config::StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    if storage.backend == Backend::S3 && storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    build_operator(&StorageConfig {
        backend: storage.backend,
        endpoint: storage.endpoint.clone(),
        region: storage.region.clone(),
        bucket: storage.bucket.clone(),
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
    })
}
