//! Bounded retries around request-path database work.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::manager::DatabaseError;

/// How often, and how patiently, a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before retry `n` is `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, backoff: Duration::from_millis(25) }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, backoff: Duration::ZERO }
    }
}

/// Errors that can tell whether a retry might help.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for DatabaseError {
    fn is_transient(&self) -> bool {
        DatabaseError::is_transient(self)
    }
}

impl Retryable for sqlx::Error {
    fn is_transient(&self) -> bool {
        is_transient_sqlx(self)
    }
}

pub fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

/// Connection exceptions, serialization failures, deadlocks and admin shutdowns.
pub fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03")
}

/// Run `op`, retrying transient failures up to `policy.max_retries` times.
/// The last error is returned once attempts are exhausted; permanent errors return immediately.
pub async fn retry_on_transient_error<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                warn!("Retry query for {} ({}): {}", label, attempt, e);
                if !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}
