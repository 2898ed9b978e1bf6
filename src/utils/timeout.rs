// src/utils/timeout.rs
// Timeout utilities

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

use crate::domain::{DomainError, DomainResult};

/// Execute an operation with a timeout
pub async fn with_timeout<F, T>(duration: Duration, operation: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "{} timed out after {:?}",
            operation_name,
            duration
        )),
    }
}

/// The `DomainResult` counterpart, for wrapping persistence calls (a 5 s
/// budget) where the operation already returns `DomainError` rather than
/// `anyhow::Error`.
pub async fn with_domain_timeout<F, T>(duration: Duration, operation: F) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::Internal(format!("persistence operation timed out after {duration:?}"))),
    }
}
