//! Bounded-concurrency helpers for source fetching.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Runs `processor` over `items` with at most `concurrency` futures in flight,
/// returning results in input order.
///
/// Ordering matters to callers: entries from earlier sources must precede
/// entries from later ones for deduplication to be stable.
///
/// # Examples
///
/// ```no_run
/// # use core_smap::resolve::batch::process_ordered;
/// # async fn example() {
/// let sources = vec!["/api/a", "/api/b"];
/// let sizes = process_ordered(sources, |source, _index| async move { source.len() }, 4).await;
/// # }
/// ```
pub async fn process_ordered<T, F, Fut, R>(items: Vec<T>, processor: F, concurrency: usize) -> Vec<R>
where
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| processor(item, index))
        .buffered(concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let items = vec![30u64, 1, 20, 5];
        let results = process_ordered(
            items,
            |delay, index| async move {
                sleep(Duration::from_millis(delay)).await;
                (index, delay)
            },
            4,
        )
        .await;

        assert_eq!(results, vec![(0, 30), (1, 1), (2, 20), (3, 5)]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let concurrent_count = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let results = process_ordered(
            (1..=8).collect::<Vec<_>>(),
            |item, _index| {
                let concurrent_count = concurrent_count.clone();
                let max_concurrent = max_concurrent.clone();
                async move {
                    let current = concurrent_count.fetch_add(1, Ordering::SeqCst) + 1;
                    max_concurrent.fetch_max(current, Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                    concurrent_count.fetch_sub(1, Ordering::SeqCst);
                    item
                }
            },
            3,
        )
        .await;

        assert_eq!(results, (1..=8).collect::<Vec<_>>());
        let max = max_concurrent.load(Ordering::SeqCst);
        assert!(max <= 3, "Max concurrent was {}, expected <= 3", max);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_progresses() {
        let results = process_ordered(vec![1, 2], |item, _| async move { item * 2 }, 0).await;
        assert_eq!(results, vec![2, 4]);
    }
}
