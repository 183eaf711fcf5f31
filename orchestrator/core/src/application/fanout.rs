// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded fan-out shared by the generator and rollout levels.
//!
//! Both strategies return results in input order, so a caller that keys
//! work items by `(generator, rollout index)` gets the same output whether
//! the items ran one at a time or concurrently.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;

pub use crate::domain::config::ExecutionMode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FanOutError {
    #[error("work item timed out after {0:?}")]
    Timeout(Duration),
}

/// Run `f` over `items` and return the outputs in input order
pub async fn fan_out<T, R, F, Fut>(mode: ExecutionMode, items: Vec<T>, f: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    match mode {
        ExecutionMode::Serial => {
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                results.push(f(item).await);
            }
            results
        }
        ExecutionMode::Parallel { .. } => {
            stream::iter(items)
                .map(f)
                .buffered(mode.concurrency())
                .collect()
                .await
        }
    }
}

/// [`fan_out`] with a deadline on every item; a late item becomes an error
/// in its own slot and does not affect the others.
pub async fn fan_out_with_timeout<T, R, F, Fut>(
    mode: ExecutionMode,
    items: Vec<T>,
    timeout: Duration,
    f: F,
) -> Vec<Result<R, FanOutError>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    fan_out(mode, items, |item| {
        let work = f(item);
        async move {
            tokio::time::timeout(timeout, work)
                .await
                .map_err(|_| FanOutError::Timeout(timeout))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        async fn run(&self, delay_ms: u64) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_parallel_preserves_input_order() {
        // Later items finish first
        let delays = vec![40u64, 30, 20, 10, 0];
        let results = fan_out(ExecutionMode::Parallel { max_concurrency: 5 }, delays.clone(), |d| async move {
            tokio::time::sleep(Duration::from_millis(d)).await;
            d
        })
        .await;
        assert_eq!(results, delays);
    }

    #[tokio::test]
    async fn test_serial_and_parallel_agree() {
        let items: Vec<u32> = (0..8).collect();
        let serial = fan_out(ExecutionMode::Serial, items.clone(), |i| async move { i * i }).await;
        let parallel = fan_out(ExecutionMode::Parallel { max_concurrency: 3 }, items, |i| async move { i * i }).await;
        assert_eq!(serial, parallel);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let tracker = InFlight::new();
        let t = tracker.clone();
        fan_out(ExecutionMode::Parallel { max_concurrency: 2 }, vec![5u64; 6], move |d| {
            let t = t.clone();
            async move { t.run(d).await }
        })
        .await;
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 2);

        let serial = InFlight::new();
        let s = serial.clone();
        fan_out(ExecutionMode::Serial, vec![1u64; 4], move |d| {
            let s = s.clone();
            async move { s.run(d).await }
        })
        .await;
        assert_eq!(serial.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_only_affects_late_items() {
        let results = fan_out_with_timeout(
            ExecutionMode::Parallel { max_concurrency: 4 },
            vec![0u64, 500, 0],
            Duration::from_millis(50),
            |d| async move {
                tokio::time::sleep(Duration::from_millis(d)).await;
                d
            },
        )
        .await;
        assert_eq!(results[0], Ok(0));
        assert_eq!(results[1], Err(FanOutError::Timeout(Duration::from_millis(50))));
        assert_eq!(results[2], Ok(0));
    }
}
