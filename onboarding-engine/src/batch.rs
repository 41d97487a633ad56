//! Concurrent per-item execution with failure isolation.

use futures::{stream::FuturesUnordered, Future, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Context provided to each item in a batch
#[derive(Debug, Clone, Copy)]
pub struct ItemContext {
    /// Position in the input (1-indexed for display)
    pub item_number: usize,
    pub total_items: usize,
}

/// What happened to one input item
#[derive(Debug)]
pub enum ItemOutcome<R> {
    Done(R),
    /// Cancellation was requested before the item started
    Cancelled,
}

/// Run `executor` over `items` with at most `concurrency` in flight.
///
/// Unlike a fail-fast batch, every item runs to its own result: the executor
/// decides how a failure is represented in `R`. Outcomes come back in input
/// order. Once `cancel` fires, items that have not started yet are reported
/// as [`ItemOutcome::Cancelled`]; items already running finish normally.
pub async fn execute_isolated<T, F, Fut, R>(
    items: Vec<T>,
    concurrency: usize,
    cancel: CancellationToken,
    executor: F,
) -> Vec<ItemOutcome<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T, ItemContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let executor = Arc::new(executor);
    let mut tasks = FuturesUnordered::new();

    for (idx, item) in items.into_iter().enumerate() {
        let sem = sem.clone();
        let executor = executor.clone();
        let cancel = cancel.clone();

        let ctx = ItemContext {
            item_number: idx + 1,
            total_items: total,
        };

        tasks.push(async move {
            // Acquire permit (waits while `concurrency` items are running)
            let _permit = match sem.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (idx, ItemOutcome::Cancelled),
            };
            if cancel.is_cancelled() {
                return (idx, ItemOutcome::Cancelled);
            }

            (idx, ItemOutcome::Done(executor(item, ctx).await))
        });
    }

    let mut slots: Vec<Option<ItemOutcome<R>>> = (0..total).map(|_| None).collect();
    while let Some((idx, outcome)) = tasks.next().await {
        slots[idx] = Some(outcome);
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(ItemOutcome::Cancelled))
        .collect()
}
