// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff for fallible remote calls.
//!
//! Provider calls (classification, embedding) are retried a small fixed
//! number of times; on exhaustion the last error is returned and the
//! caller degrades to its conservative default. Validation and storage
//! errors are never retried.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::MnemaError;

/// Default number of attempts for provider-backed calls.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default base delay; doubles per attempt (100ms, 200ms, 400ms, ...).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Run `op` up to `attempts` times, sleeping `base_delay * 2^n` between
/// attempts. Only retryable errors (provider failures, timeouts) trigger
/// another attempt; anything else is returned immediately.
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, MnemaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MnemaError>>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!("{label} failed (attempt {attempt}/{attempts}), retrying in {delay:?}: {err}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    // Unreachable: the loop always returns on the final attempt.
    Err(MnemaError::Internal(format!("{label}: retry loop exhausted")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_attempt_without_sleeping() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = with_backoff("test", 3, Duration::from_millis(100), move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, MnemaError>(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_provider_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = with_backoff("test", 3, Duration::from_millis(10), move || {
            let calls = calls2.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(MnemaError::Provider {
                        message: "rate limited".to_string(),
                        source: None,
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, _> =
            with_backoff("test", 3, Duration::from_millis(10), move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(MnemaError::Provider {
                        message: "down".to_string(),
                        source: None,
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(MnemaError::Provider { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, _> =
            with_backoff("test", 3, Duration::from_millis(10), move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(MnemaError::Validation("bad scope".to_string()))
                }
            })
            .await;
        assert!(matches!(result, Err(MnemaError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
