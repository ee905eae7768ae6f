//! Deadline propagation for downstream calls.

use std::future::Future;

use tokio::time::{timeout_at, Instant};

/// The deadline passed before the future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

/// Runs `fut` to completion, or until `deadline` if one is set.
pub async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Result<F::Output, Elapsed> {
    match deadline {
        Some(at) => timeout_at(at, fut).await.map_err(|_| Elapsed),
        None => Ok(fut.await),
    }
}
