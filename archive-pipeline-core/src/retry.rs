//! Bounded retry with exponential backoff around the uploader.
//!
//! Upload is the only network-bound step of a run, so it is the only call
//! wrapped here. Parse and serialize failures are never retried.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::contract::{Destination, UploadError, UploadReceipt, Uploader};
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    /// Limit for a single attempt; an attempt that runs over counts as transient.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2,
            attempt_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no timeout.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
            attempt_timeout: None,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// An accepted upload and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub receipt: UploadReceipt,
    pub attempts: u32,
}

pub async fn upload_with_retry<U>(
    uploader: &U,
    json_path: &Path,
    destination: Destination,
    overwrite: bool,
    policy: &RetryPolicy,
) -> Result<Uploaded, PipelineError>
where
    U: Uploader + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let call = uploader.upload(json_path, destination, overwrite);
        let result = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(UploadError::Transient(format!(
                    "upload timed out after {}s",
                    limit.as_secs_f64()
                ))),
            },
            None => call.await,
        };

        match result {
            Ok(receipt) => {
                info!(
                    json_path = %json_path.display(),
                    %destination,
                    attempt,
                    record_id = receipt.record_id.as_deref().unwrap_or("-"),
                    "[UPLOAD] Upload accepted"
                );
                return Ok(Uploaded {
                    receipt,
                    attempts: attempt,
                });
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    json_path = %json_path.display(),
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "[UPLOAD] Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                error!(
                    json_path = %json_path.display(),
                    attempt,
                    error = %source,
                    "[UPLOAD][ERROR] Upload failed"
                );
                return Err(PipelineError::Upload {
                    json_path: json_path.to_path_buf(),
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}
