//! Fan-out aggregation — dedup, bounded dispatch, merge by identity
//!
//! Shared by per-keyword synonym expansion, per-query document discovery,
//! and per-document scoring. The input collection is deduplicated by item
//! identity before dispatch (a keyword appearing in two categories is
//! expanded once), per-item calls run concurrently under a semaphore, and
//! results merge keyed by item — completion order never affects the
//! outcome. Per-item failures are the caller's concern: the per-item
//! operation returns its own degraded value. If the run is cancelled
//! while a batch is in flight, the whole batch is abandoned and nothing
//! reaches the pipeline state.

use crate::cancel::CancellationToken;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Deduplicate by value, preserving first-occurrence order.
pub fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Dispatch `op` once per distinct item, at most `concurrency` in flight.
///
/// Returns item/result pairs in input order, or `None` when the token was
/// cancelled before the batch could be committed — the caller must not
/// advance the pipeline state in that case.
pub async fn run_batch<V, F, Fut>(
    items: Vec<String>,
    concurrency: usize,
    cancel: &CancellationToken,
    op: F,
) -> Option<Vec<(String, V)>>
where
    V: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = V> + Send + 'static,
{
    let deduped = dedup_preserving_order(items);
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, item) in deduped.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let fut = op(item.clone());
        tasks.spawn(async move {
            // The semaphore is never closed; a failed acquire can only
            // mean shutdown, in which case running unthrottled is moot.
            let _permit = semaphore.acquire_owned().await.ok();
            (index, item, fut.await)
        });
    }

    let mut collected = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => collected.push(entry),
            Err(err) => warn!(error = %err, "fan-out task did not complete"),
        }
    }

    if cancel.is_cancelled() {
        warn!("fan-out batch abandoned by cancellation");
        return None;
    }

    collected.sort_by_key(|(index, _, _)| *index);
    Some(
        collected
            .into_iter()
            .map(|(_, item, value)| (item, value))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dedup_keeps_first_occurrence() {
        let deduped = dedup_preserving_order(vec![
            "sensors".to_string(),
            "irrigation".to_string(),
            "sensors".to_string(),
        ]);
        assert_eq!(deduped, vec!["sensors", "irrigation"]);
    }

    #[tokio::test]
    async fn batch_dispatches_each_distinct_item_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let results = run_batch(
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
            2,
            &cancel,
            {
                let calls = calls.clone();
                move |item: String| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        item.to_uppercase()
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            results,
            vec![
                ("a".to_string(), "A".to_string()),
                ("b".to_string(), "B".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn batch_respects_concurrency_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let items: Vec<String> = (0..8).map(|n| format!("item-{}", n)).collect();
        run_batch(items, 2, &cancel, {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            move |_item: String| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancelled_batch_is_abandoned_wholesale() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run_batch(
            vec!["a".to_string(), "b".to_string()],
            2,
            &cancel,
            |item: String| async move { item },
        )
        .await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn results_merge_in_input_order() {
        let cancel = CancellationToken::new();
        // Earlier items sleep longer, so completion order inverts input
        // order; the merged output must not.
        let items: Vec<String> = (0..4).map(|n| format!("{}", n)).collect();
        let results = run_batch(items, 4, &cancel, |item: String| async move {
            let rank: u64 = item.parse().unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(40 - rank * 10)).await;
            rank
        })
        .await
        .unwrap();

        let order: Vec<u64> = results.iter().map(|(_, v)| *v).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
