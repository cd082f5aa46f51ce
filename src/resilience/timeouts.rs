//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream calls with a deadline
//! - Cancel the call cleanly when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other dispatch errors
//! - The breaker records a timed-out call as slow

use std::future::Future;
use std::time::Duration;

use crate::dispatch::DispatchError;

/// Run `call`, failing with [`DispatchError::Timeout`] once `limit` elapses.
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, DispatchError>
where
    F: Future<Output = Result<T, DispatchError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout(limit)),
    }
}
