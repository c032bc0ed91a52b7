//! Daemon lifecycle: storage connect, health check, mount, systemd notify

use anyhow::{Context, Result};
use gridmount_core::config::{Backend, GridConfig};
use gridmount_fuse::{FsOptions, GridFs};
use gridmount_storage::GridStore;
use opendal::Operator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(config: GridConfig, mountpoint: PathBuf) -> Result<()> {
    info!("daemon starting");

    let op = connect(&config)?;
    let store = GridStore::new(op.clone(), &config.store.prefix);
    match gridmount_storage::check_health(&op, store.prefix()).await {
        Ok(()) => info!(
            endpoint = %config.storage.endpoint,
            prefix = store.prefix(),
            "storage: connected"
        ),
        // Keep going: the operator retries per call
        Err(e) => warn!(endpoint = %config.storage.endpoint, "storage: {e}"),
    }

    let options = FsOptions::from_config(&config);
    info!(
        chunk_size = options.default_chunk_size,
        commit = ?options.commit_strategy,
        namespace = ?options.namespace,
        "filesystem ready"
    );
    let fs = GridFs::new(Arc::new(store), options);

    mount(fs, &config, mountpoint).await
}

/// Build the storage operator, taking S3 credentials from the environment.
fn connect(config: &GridConfig) -> Result<Operator> {
    let (key, secret) = match config.storage.backend {
        Backend::Memory => {
            warn!("memory backend: stored files vanish on unmount");
            (String::new(), String::new())
        }
        Backend::S3 => {
            let key = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
            let secret = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
            if key.is_empty() || secret.is_empty() {
                warn!("no S3 credentials in AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY");
            }
            (key, secret)
        }
    };
    gridmount_storage::operator::build_from_core_config(&config.storage, &key, &secret)
        .context("building storage operator")
}

#[cfg(feature = "fuse")]
async fn mount(fs: GridFs, config: &GridConfig, mountpoint: PathBuf) -> Result<()> {
    let cfg = gridmount_fuse::MountConfig {
        fs,
        mountpoint: mountpoint.clone(),
        attr_ttl: std::time::Duration::from_secs(config.mount.attr_ttl_secs),
        allow_other: config.mount.allow_other,
        fs_name: config.mount.fs_name.clone(),
    };

    let session = tokio::spawn(gridmount_fuse::mount(cfg));
    notify_ready();
    session
        .await
        .context("mount task panicked")?
        .with_context(|| format!("mounting {}", mountpoint.display()))?;

    info!(mountpoint = %mountpoint.display(), "unmounted");
    Ok(())
}

#[cfg(not(feature = "fuse"))]
async fn mount(_fs: GridFs, _config: &GridConfig, _mountpoint: PathBuf) -> Result<()> {
    anyhow::bail!("mounting requires the fuse feature: cargo build --features fuse")
}

#[cfg_attr(not(feature = "fuse"), allow(dead_code))]
fn notify_ready() {
    // sd_notify(READY=1) via $NOTIFY_SOCKET; no-op outside systemd
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
