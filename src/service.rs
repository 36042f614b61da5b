//! Use-case orchestration over the store, the ordering policy and the access
//! policy.
//!
//! Every mutation runs as one transaction: the workflow is re-read inside it,
//! the access check is evaluated against that snapshot, and the write follows
//! in the same transaction. Reads run standalone and may observe any
//! committed state.

use std::sync::Arc;

use futures::FutureExt;
use tracing::debug;

use crate::access::{AccessControlPolicy, Principal, WorkflowAction};
use crate::errors::Result;
use crate::models::{NewTask, NewWorkflow, Task, TaskChanges, TaskStatus, Workflow};
use crate::ordering::TaskOrderingPolicy;
use crate::requests::{CreateTask, CreateWorkflow, EditTask, EditWorkflow};
use crate::store::WorkflowStore;
use crate::transaction::{RetryPolicy, TransactionCoordinator};

pub struct WorkflowMutationService<S: WorkflowStore> {
    store: Arc<S>,
    coordinator: TransactionCoordinator<S>,
}

impl<S: WorkflowStore> WorkflowMutationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn with_retry(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            coordinator: TransactionCoordinator::with_retry(Arc::clone(&store), retry),
            store,
        }
    }

    pub async fn list_workflows(&self, principal: &Principal) -> Result<Vec<Workflow>> {
        self.store.find_by_owner(&principal.username).await
    }

    pub async fn get_workflow(&self, id: &str) -> Result<Workflow> {
        self.store.find_by_id(id).await
    }

    pub async fn list_tasks(&self, id: &str) -> Result<Vec<Task>> {
        self.store.list_tasks(id).await
    }

    pub async fn get_task(&self, id: &str, task_id: &str) -> Result<Task> {
        self.store.find_task(id, task_id).await
    }

    /// The principal becomes the owner of the new workflow.
    pub async fn create_workflow(&self, principal: &Principal, req: CreateWorkflow) -> Result<String> {
        debug!(owner = %principal.username, name = %req.name, "creating workflow");
        self.store
            .create(NewWorkflow {
                name: req.name,
                owner: principal.username.clone(),
            })
            .await
    }

    pub async fn edit_workflow(
        &self,
        principal: &Principal,
        id: &str,
        req: EditWorkflow,
    ) -> Result<Workflow> {
        let store = Arc::clone(&self.store);
        let principal = principal.clone();
        let id = id.to_string();
        self.coordinator
            .run(move |tx| {
                let store = Arc::clone(&store);
                let principal = principal.clone();
                let id = id.clone();
                let name = req.name.clone();
                async move {
                    let workflow = store.find_by_id_in(tx, &id).await?;
                    AccessControlPolicy::authorize(&principal, &workflow, WorkflowAction::Edit)?;
                    store.rename(tx, &id, &name).await
                }
                .boxed()
            })
            .await
    }

    /// Deleting the workflow destroys its embedded tasks with it.
    pub async fn delete_workflow(&self, principal: &Principal, id: &str) -> Result<()> {
        let store = Arc::clone(&self.store);
        let principal = principal.clone();
        let id = id.to_string();
        self.coordinator
            .run(move |tx| {
                let store = Arc::clone(&store);
                let principal = principal.clone();
                let id = id.clone();
                async move {
                    let workflow = store.find_by_id_in(tx, &id).await?;
                    AccessControlPolicy::authorize(&principal, &workflow, WorkflowAction::Delete)?;
                    store.delete(tx, &id).await
                }
                .boxed()
            })
            .await
    }

    pub async fn transfer_workflow(
        &self,
        principal: &Principal,
        id: &str,
        new_owner: &str,
    ) -> Result<Workflow> {
        let store = Arc::clone(&self.store);
        let principal = principal.clone();
        let id = id.to_string();
        let new_owner = new_owner.to_string();
        self.coordinator
            .run(move |tx| {
                let store = Arc::clone(&store);
                let principal = principal.clone();
                let id = id.clone();
                let new_owner = new_owner.clone();
                async move {
                    let workflow = store.find_by_id_in(tx, &id).await?;
                    AccessControlPolicy::authorize(&principal, &workflow, WorkflowAction::Transfer)?;
                    store.transfer(tx, &id, &new_owner).await
                }
                .boxed()
            })
            .await
    }

    /// Order assignment and the append happen in the same transaction, so two
    /// concurrent creations cannot both observe the same maximum.
    pub async fn create_task(
        &self,
        principal: &Principal,
        id: &str,
        req: CreateTask,
    ) -> Result<String> {
        let store = Arc::clone(&self.store);
        let principal = principal.clone();
        let id = id.to_string();
        self.coordinator
            .run(move |tx| {
                let store = Arc::clone(&store);
                let principal = principal.clone();
                let id = id.clone();
                let req = req.clone();
                async move {
                    let workflow = store.find_by_id_in(tx, &id).await?;
                    AccessControlPolicy::authorize(&principal, &workflow, WorkflowAction::Edit)?;

                    let max = store.max_task_order(tx, &id).await?;
                    let order = TaskOrderingPolicy::next_order(max)?;
                    store
                        .append_task(
                            tx,
                            &id,
                            NewTask {
                                name: req.name,
                                description: req.description,
                                status: TaskStatus::Pending,
                                order,
                            },
                        )
                        .await
                }
                .boxed()
            })
            .await
    }

    pub async fn edit_task(
        &self,
        principal: &Principal,
        id: &str,
        task_id: &str,
        req: EditTask,
    ) -> Result<Task> {
        let store = Arc::clone(&self.store);
        let principal = principal.clone();
        let id = id.to_string();
        let task_id = task_id.to_string();
        self.coordinator
            .run(move |tx| {
                let store = Arc::clone(&store);
                let principal = principal.clone();
                let id = id.clone();
                let task_id = task_id.clone();
                let req = req.clone();
                async move {
                    let workflow = store.find_by_id_in(tx, &id).await?;
                    AccessControlPolicy::authorize(&principal, &workflow, WorkflowAction::Edit)?;
                    store
                        .update_task(
                            tx,
                            &id,
                            &task_id,
                            TaskChanges {
                                name: req.name,
                                description: req.description,
                                status: req.status,
                                order: req.order,
                            },
                        )
                        .await
                }
                .boxed()
            })
            .await
    }

    pub async fn delete_task(&self, principal: &Principal, id: &str, task_id: &str) -> Result<()> {
        let store = Arc::clone(&self.store);
        let principal = principal.clone();
        let id = id.to_string();
        let task_id = task_id.to_string();
        self.coordinator
            .run(move |tx| {
                let store = Arc::clone(&store);
                let principal = principal.clone();
                let id = id.clone();
                let task_id = task_id.clone();
                async move {
                    let workflow = store.find_by_id_in(tx, &id).await?;
                    AccessControlPolicy::authorize(&principal, &workflow, WorkflowAction::Edit)?;
                    store.delete_task(tx, &id, &task_id).await
                }
                .boxed()
            })
            .await
    }
}
