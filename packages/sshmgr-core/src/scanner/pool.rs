//! Bounded fan-out/fan-in of independent probes.
//!
//! Every item gets its own tokio task, but a task is only spawned once one of
//! `concurrency` permits is free. Results are slotted back by input position,
//! so `output[i]` always belongs to `items[i]` regardless of completion order.
//!
//! There is no overall deadline: each worker is expected to bound itself with
//! its own timeout. A worker that never finishes holds its permit forever.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run `worker` over `items` with at most `concurrency` running at once.
///
/// A `concurrency` of zero is treated as one. A panicking worker resumes its
/// panic in the caller.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, concurrency: usize, worker: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let limit = Arc::new(Semaphore::new(concurrency.max(1)));
    let worker = Arc::new(worker);
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        // The semaphore is never closed, so this only waits for a free slot.
        let permit = limit.clone().acquire_owned().await.ok();
        let worker = worker.clone();
        handles.push(tokio::spawn(async move {
            let result = worker(item).await;
            drop(permit);
            result
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => match e.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                Err(e) => panic!("probe task {} did not complete: {}", index, e),
            },
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, sleep};

    #[tokio::test]
    async fn test_preserves_input_order() {
        // Later items finish first
        let items: Vec<u64> = (0..12).collect();
        for concurrency in [1, 3, 12, 50] {
            let out = run_bounded(items.clone(), concurrency, |n| async move {
                sleep(Duration::from_millis(24 - 2 * n)).await;
                n * 10
            })
            .await;
            assert_eq!(out, items.iter().map(|n| n * 10).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_never_exceeds_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (active.clone(), peak.clone());
        let out = run_bounded((0..40).collect::<Vec<u32>>(), 4, move |n| {
            let (active, peak) = (a.clone(), p.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                n
            }
        })
        .await;

        assert_eq!(out.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let out = run_bounded(vec!["a", "b"], 0, |s| async move { s.to_uppercase() }).await;
        assert_eq!(out, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let out: Vec<u8> = run_bounded(Vec::<u8>::new(), 8, |n| async move { n }).await;
        assert!(out.is_empty());
    }
}
