//! Transactional unit-of-work execution.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::errors::{Result, WorkflowError};
use crate::store::WorkflowStore;

/// Bounds the retry loop for transient write conflicts. Nothing else is ever
/// retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Runs a unit of work inside exactly one store transaction per attempt.
///
/// The work callback is invoked with a transaction-scoped handle; on success
/// the transaction is committed, on error it is aborted. Abort failures are
/// logged and never mask the work's own error. `Conflict` results (from the
/// work or from the commit) are retried under the [`RetryPolicy`]; everything
/// else propagates unmodified.
pub struct TransactionCoordinator<S: WorkflowStore> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: WorkflowStore> TransactionCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn run<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: for<'tx> Fn(&'tx mut S::Tx) -> BoxFuture<'tx, Result<T>> + Send,
    {
        let mut attempt = 1;
        loop {
            let mut tx = self.store.begin().await?;

            match work(&mut tx).await {
                Ok(value) => match self.store.commit(tx).await {
                    Ok(()) => return Ok(value),
                    Err(WorkflowError::Conflict) if attempt < self.retry.max_attempts => {
                        warn!(attempt, "transaction commit hit a transient conflict, retrying");
                    }
                    Err(err) => return Err(err),
                },
                Err(err) => {
                    if let Err(abort_err) = self.store.abort(tx).await {
                        warn!(error = %abort_err, "failed to abort transaction");
                    }
                    if err == WorkflowError::Conflict && attempt < self.retry.max_attempts {
                        warn!(attempt, "transaction hit a transient conflict, retrying");
                    } else {
                        return Err(err);
                    }
                }
            }

            tokio::time::sleep(self.retry.backoff * attempt).await;
            attempt += 1;
            debug!(attempt, "restarting transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, NewWorkflow, Task, TaskChanges, Workflow};
    use crate::store::MemoryWorkflowStore;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn coordinator(store: &Arc<MemoryWorkflowStore>) -> TransactionCoordinator<MemoryWorkflowStore> {
        TransactionCoordinator::with_retry(
            Arc::clone(store),
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn commits_successful_work() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let id = store
            .create(NewWorkflow {
                name: "Launch".to_string(),
                owner: "alice".to_string(),
            })
            .await
            .unwrap();

        let store_for_work = Arc::clone(&store);
        let renamed = coordinator(&store)
            .run(move |tx| {
                let store = Arc::clone(&store_for_work);
                let id = id.clone();
                async move { store.rename(tx, &id, "Launch v2").await }.boxed()
            })
            .await
            .unwrap();

        assert_eq!(renamed.name, "Launch v2");
    }

    #[tokio::test]
    async fn aborts_on_error_and_propagates_it_unmodified() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let id = store
            .create(NewWorkflow {
                name: "Launch".to_string(),
                owner: "alice".to_string(),
            })
            .await
            .unwrap();

        let store_for_work = Arc::clone(&store);
        let id_for_work = id.clone();
        let err = coordinator(&store)
            .run(move |tx| {
                let store = Arc::clone(&store_for_work);
                let id = id_for_work.clone();
                async move {
                    store.rename(tx, &id, "half-applied").await?;
                    Err::<(), _>(WorkflowError::Inconsistency("boom".to_string()))
                }
                .boxed()
            })
            .await
            .unwrap_err();

        assert_eq!(err, WorkflowError::Inconsistency("boom".to_string()));
        // The rename inside the aborted transaction must not be visible.
        assert_eq!(store.find_by_id(&id).await.unwrap().name, "Launch");
    }

    #[tokio::test]
    async fn retries_transient_conflicts_until_one_attempt_succeeds() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let calls = Arc::new(AtomicU32::new(0));

        let calls_for_work = Arc::clone(&calls);
        let value = coordinator(&store)
            .run(move |_tx| {
                let calls = Arc::clone(&calls_for_work);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(WorkflowError::Conflict)
                    } else {
                        Ok(42)
                    }
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_cap() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let calls = Arc::new(AtomicU32::new(0));

        let calls_for_work = Arc::clone(&calls);
        let err = coordinator(&store)
            .run(move |_tx| {
                let calls = Arc::clone(&calls_for_work);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(WorkflowError::Conflict)
                }
                .boxed()
            })
            .await
            .unwrap_err();

        assert_eq!(err, WorkflowError::Conflict);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Store whose commit always fails without a transient label, the way a
    /// commit whose outcome is unknown surfaces. Only begin/commit/abort are
    /// reachable from the test.
    struct UnknownCommitStore {
        commits: AtomicU32,
    }

    #[async_trait]
    impl WorkflowStore for UnknownCommitStore {
        type Tx = ();

        async fn begin(&self) -> Result<()> {
            Ok(())
        }

        async fn commit(&self, _tx: ()) -> Result<()> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Err(WorkflowError::WriteFailure(
                "transaction commit outcome is unknown".to_string(),
            ))
        }

        async fn abort(&self, _tx: ()) -> Result<()> {
            Ok(())
        }

        async fn find_by_owner(&self, _owner: &str) -> Result<Vec<Workflow>> {
            unreachable!()
        }

        async fn find_by_id(&self, _id: &str) -> Result<Workflow> {
            unreachable!()
        }

        async fn find_by_id_in(&self, _tx: &mut (), _id: &str) -> Result<Workflow> {
            unreachable!()
        }

        async fn create(&self, _new: NewWorkflow) -> Result<String> {
            unreachable!()
        }

        async fn rename(&self, _tx: &mut (), _id: &str, _name: &str) -> Result<Workflow> {
            unreachable!()
        }

        async fn delete(&self, _tx: &mut (), _id: &str) -> Result<()> {
            unreachable!()
        }

        async fn transfer(&self, _tx: &mut (), _id: &str, _new_owner: &str) -> Result<Workflow> {
            unreachable!()
        }

        async fn list_tasks(&self, _id: &str) -> Result<Vec<Task>> {
            unreachable!()
        }

        async fn find_task(&self, _id: &str, _task_id: &str) -> Result<Task> {
            unreachable!()
        }

        async fn max_task_order(&self, _tx: &mut (), _id: &str) -> Result<Option<u32>> {
            unreachable!()
        }

        async fn append_task(&self, _tx: &mut (), _id: &str, _task: NewTask) -> Result<String> {
            unreachable!()
        }

        async fn update_task(
            &self,
            _tx: &mut (),
            _id: &str,
            _task_id: &str,
            _changes: TaskChanges,
        ) -> Result<Task> {
            unreachable!()
        }

        async fn delete_task(&self, _tx: &mut (), _id: &str, _task_id: &str) -> Result<()> {
            unreachable!()
        }
    }

    // A commit whose outcome is unknown may have landed server-side, so the
    // coordinator must not re-run the work for it. Only `Conflict` restarts
    // the transaction.
    #[tokio::test]
    async fn non_conflict_commit_failures_are_not_retried() {
        let store = Arc::new(UnknownCommitStore {
            commits: AtomicU32::new(0),
        });
        let work_runs = Arc::new(AtomicU32::new(0));

        let runs_for_work = Arc::clone(&work_runs);
        let err = TransactionCoordinator::with_retry(
            Arc::clone(&store),
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::ZERO,
            },
        )
        .run(move |_tx| {
            let runs = Arc::clone(&runs_for_work);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

        assert_eq!(
            err,
            WorkflowError::WriteFailure("transaction commit outcome is unknown".to_string())
        );
        assert_eq!(work_runs.load(Ordering::SeqCst), 1);
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    }
}
