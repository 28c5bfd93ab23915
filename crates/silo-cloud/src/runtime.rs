//! Tokio runtime management for synchronous operations

use crate::error::{CloudError, Result};
use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get or create the shared Tokio runtime used for blocking operations
pub(crate) fn get_runtime() -> Result<&'static Runtime> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("silo-cloud-worker")
        .build()
        .map_err(|e| CloudError::Runtime(format!("Failed to create Tokio runtime: {}", e)))?;

    // A racing thread may have won; its runtime is kept and ours is dropped.
    Ok(RUNTIME.get_or_init(|| runtime))
}

/// Run `future` to completion on the shared runtime.
///
/// Must not be called from inside an async context.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    Ok(get_runtime()?.block_on(future))
}
