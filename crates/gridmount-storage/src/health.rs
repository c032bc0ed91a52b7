//! Storage health check

use anyhow::Result;
use opendal::Operator;

/// Verify the storage endpoint is reachable by listing the object prefix
pub async fn check_health(op: &Operator, prefix: &str) -> Result<()> {
    let dir = format!("{}/", prefix.trim_matches('/'));
    op.list(&dir)
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("storage health check failed: {e}"))
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub async fn is_healthy(op: &Operator, prefix: &str) -> bool {
    check_health(op, prefix).await.is_ok()
}
