//! The single-consumer FIFO execution queue.
//!
//! This is the only queue; every budget-gated spend goes through it, and its
//! single background worker is what makes the check-then-insert in
//! [`ExecutionQueue::tracked_spend`] linearizable.

use std::any::Any;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use crate::budget::current_cycle;
use crate::error::Error;
use crate::store::{SpendRecord, Store};

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}

type BoxedResult = Box<dyn Any + Send>;
type BoxedAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<BoxedResult, Error>> + Send>;

/// The outcome of a spend attempt, before the caller's concrete result type
/// is recovered.
enum SpendOutcome {
    /// Admission failed: one or more budgets would be exceeded.
    OverBudget,
    /// `action` ran and produced a value.
    Completed(BoxedResult),
}

struct Job {
    pubkey: String,
    amount_msats: u64,
    action: BoxedAction,
    reply: oneshot::Sender<Result<SpendOutcome, Error>>,
}

/// Process-wide FIFO queue. Cloning shares the same worker and channel.
#[derive(Clone)]
pub struct ExecutionQueue {
    sender: mpsc::Sender<Job>,
}

impl ExecutionQueue {
    /// Spawn the single consumer task backed by `store`, with a channel of
    /// `capacity` pending jobs.
    pub fn spawn(store: Arc<dyn Store>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        tokio::spawn(run_worker(store, receiver));
        Self { sender }
    }

    /// Enqueue `action` as a budget-gated spend of `amount_msats` against
    /// `pubkey`'s budgets. Returns:
    /// - `Ok(None)` if one or more budgets would be exceeded (caller should
    ///   surface `QUOTA_EXCEEDED`);
    /// - `Ok(Some(result))` if `action` ran and succeeded;
    /// - `Err(e)` if `action` itself failed, or the queue could not accept
    ///   the job.
    pub async fn tracked_spend<F, R>(
        &self,
        pubkey: impl Into<String>,
        amount_msats: u64,
        action: F,
    ) -> Result<Option<R>, Error>
    where
        F: FnOnce() -> BoxFuture<'static, Result<R, Error>> + Send + 'static,
        R: Send + 'static,
    {
        let boxed_action: BoxedAction = Box::new(move || {
            Box::pin(async move { action().await.map(|r| Box::new(r) as BoxedResult) })
        });
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            pubkey: pubkey.into(),
            amount_msats,
            action: boxed_action,
            reply: reply_tx,
        };
        self.sender.send(job).await.map_err(|_| Error::QueueClosed)?;

        match reply_rx.await.map_err(|_| Error::QueueClosed)?? {
            SpendOutcome::OverBudget => Ok(None),
            SpendOutcome::Completed(value) => {
                let value = *value
                    .downcast::<R>()
                    .expect("tracked_spend result type must match the action's return type");
                Ok(Some(value))
            }
        }
    }
}

async fn run_worker(store: Arc<dyn Store>, mut receiver: mpsc::Receiver<Job>) {
    while let Some(job) = receiver.recv().await {
        let outcome = process(&*store, &job.pubkey, job.amount_msats, job.action).await;
        let _ = job.reply.send(outcome);
    }
}

async fn process(
    store: &dyn Store,
    pubkey: &str,
    amount_msats: u64,
    action: BoxedAction,
) -> Result<SpendOutcome, Error> {
    let now = now();
    let budgets = store.budgets_for(pubkey).await?;
    for budget in &budgets {
        let cycle = current_cycle(budget, now);
        let window_end = cycle.end.min(now + 1);
        let spent = store
            .sum_spend_in_window(pubkey, cycle.start, window_end)
            .await?;
        if spent + amount_msats > budget.budget_msats {
            return Ok(SpendOutcome::OverBudget);
        }
    }

    let result = action().await?;

    store
        .insert_spend(SpendRecord {
            id: String::new(),
            pubkey: pubkey.to_string(),
            amount_msats,
            created_at: now,
        })
        .await?;

    Ok(SpendOutcome::Completed(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::Budget;

    #[tokio::test]
    async fn spend_within_budget_succeeds_and_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_budget(Budget {
                id: String::new(),
                pubkey: "abc".into(),
                budget_msats: 100_000,
                refresh_window: 3_600,
                created_at: now(),
            })
            .await
            .unwrap();
        let queue = ExecutionQueue::spawn(store.clone(), 8);

        let result = queue
            .tracked_spend("abc", 99_000, || Box::pin(async { Ok::<_, Error>(42u32) }))
            .await
            .unwrap();
        assert_eq!(result, Some(42));

        let spent = store.sum_spend_in_window("abc", 0, u64::MAX).await.unwrap();
        assert_eq!(spent, 99_000);
    }

    #[tokio::test]
    async fn spend_over_budget_is_rejected_without_calling_action() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_budget(Budget {
                id: String::new(),
                pubkey: "abc".into(),
                budget_msats: 100_000,
                refresh_window: 3_600,
                created_at: now(),
            })
            .await
            .unwrap();
        let queue = ExecutionQueue::spawn(store.clone(), 8);

        queue
            .tracked_spend("abc", 99_000, || Box::pin(async { Ok::<_, Error>(()) }))
            .await
            .unwrap();

        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called2 = called.clone();
        let result = queue
            .tracked_spend("abc", 2_000, move || {
                Box::pin(async move {
                    called2.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, Error>(())
                })
            })
            .await
            .unwrap();

        assert_eq!(result, None);
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }
}
