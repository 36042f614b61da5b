//! In-memory implementation of [`WorkflowStore`] for unit and scenario tests.
//!
//! Transactions hold the store's single write lock for their whole lifetime
//! and keep a pre-transaction snapshot; abort restores the snapshot, commit
//! drops the guard. That gives tests real commit/abort semantics without a
//! running server.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ids, WorkflowStore};
use crate::errors::{Entity, Result, WorkflowError};
use crate::models::{NewTask, NewWorkflow, Task, TaskChanges, Workflow};

#[derive(Debug, Clone, Default)]
struct State {
    workflows: Vec<Workflow>,
}

#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    state: Arc<Mutex<State>>,
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    snapshot: State,
}

impl MemoryWorkflowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn workflow_mut<'a>(state: &'a mut State, oid: &ObjectId) -> Option<&'a mut Workflow> {
    state.workflows.iter_mut().find(|workflow| workflow.id == *oid)
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemoryTx { guard, snapshot })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        drop(tx);
        Ok(())
    }

    async fn abort(&self, tx: MemoryTx) -> Result<()> {
        let MemoryTx { mut guard, snapshot } = tx;
        *guard = snapshot;
        Ok(())
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<Workflow>> {
        let state = self.state.lock().await;
        Ok(state
            .workflows
            .iter()
            .filter(|workflow| workflow.owner == owner)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Workflow> {
        let oid = ids::parse_id(id)?;
        let state = self.state.lock().await;
        state
            .workflows
            .iter()
            .find(|workflow| workflow.id == oid)
            .cloned()
            .ok_or(WorkflowError::NotFound(Entity::Workflow))
    }

    async fn find_by_id_in(&self, tx: &mut MemoryTx, id: &str) -> Result<Workflow> {
        let oid = ids::parse_id(id)?;
        tx.guard
            .workflows
            .iter()
            .find(|workflow| workflow.id == oid)
            .cloned()
            .ok_or(WorkflowError::NotFound(Entity::Workflow))
    }

    async fn create(&self, new: NewWorkflow) -> Result<String> {
        let now = Utc::now();
        let workflow = Workflow {
            id: ObjectId::new(),
            name: new.name,
            owner: new.owner,
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let id = workflow.id.to_hex();

        let mut state = self.state.lock().await;
        state.workflows.push(workflow);
        Ok(id)
    }

    async fn rename(&self, tx: &mut MemoryTx, id: &str, name: &str) -> Result<Workflow> {
        let oid = ids::parse_id(id)?;
        let workflow =
            workflow_mut(&mut tx.guard, &oid).ok_or(WorkflowError::NotFound(Entity::Workflow))?;
        workflow.name = name.to_string();
        workflow.updated_at = Utc::now();
        Ok(workflow.clone())
    }

    async fn delete(&self, tx: &mut MemoryTx, id: &str) -> Result<()> {
        let oid = ids::parse_id(id)?;
        tx.guard.workflows.retain(|workflow| workflow.id != oid);
        Ok(())
    }

    async fn transfer(&self, tx: &mut MemoryTx, id: &str, new_owner: &str) -> Result<Workflow> {
        let oid = ids::parse_id(id)?;
        let workflow =
            workflow_mut(&mut tx.guard, &oid).ok_or(WorkflowError::NotFound(Entity::Workflow))?;
        workflow.owner = new_owner.to_string();
        workflow.updated_at = Utc::now();
        Ok(workflow.clone())
    }

    async fn list_tasks(&self, id: &str) -> Result<Vec<Task>> {
        let oid = ids::parse_id(id)?;
        let state = self.state.lock().await;
        let workflow = state
            .workflows
            .iter()
            .find(|workflow| workflow.id == oid)
            .ok_or(WorkflowError::NotFound(Entity::Workflow))?;

        let mut tasks = workflow.tasks.clone();
        tasks.sort_by_key(|task| task.order);
        Ok(tasks)
    }

    async fn find_task(&self, id: &str, task_id: &str) -> Result<Task> {
        let task_oid = ids::parse_id(task_id)?;
        let workflow = self.find_by_id(id).await?;
        workflow
            .tasks
            .into_iter()
            .find(|task| task.id == task_oid)
            .ok_or(WorkflowError::NotFound(Entity::Task))
    }

    async fn max_task_order(&self, tx: &mut MemoryTx, id: &str) -> Result<Option<u32>> {
        let oid = ids::parse_id(id)?;
        Ok(tx
            .guard
            .workflows
            .iter()
            .find(|workflow| workflow.id == oid)
            .and_then(|workflow| workflow.tasks.iter().map(|task| task.order).max()))
    }

    async fn append_task(&self, tx: &mut MemoryTx, id: &str, task: NewTask) -> Result<String> {
        let oid = ids::parse_id(id)?;
        let workflow =
            workflow_mut(&mut tx.guard, &oid).ok_or(WorkflowError::NotFound(Entity::Workflow))?;

        let now = Utc::now();
        workflow.tasks.push(Task {
            id: ObjectId::new(),
            name: task.name,
            description: task.description,
            status: task.status,
            order: task.order,
            created_at: now,
            updated_at: now,
        });
        workflow.updated_at = now;

        // Mirror the re-read discipline of the real store.
        workflow
            .tasks
            .last()
            .map(|task| task.id.to_hex())
            .ok_or_else(|| {
                WorkflowError::Inconsistency("appended task is missing on re-read".to_string())
            })
    }

    async fn update_task(
        &self,
        tx: &mut MemoryTx,
        id: &str,
        task_id: &str,
        changes: TaskChanges,
    ) -> Result<Task> {
        let oid = ids::parse_id(id)?;
        let task_oid = ids::parse_id(task_id)?;

        let workflow =
            workflow_mut(&mut tx.guard, &oid).ok_or(WorkflowError::NotFound(Entity::Task))?;
        let now = Utc::now();
        let task = workflow
            .tasks
            .iter_mut()
            .find(|task| task.id == task_oid)
            .ok_or(WorkflowError::NotFound(Entity::Task))?;

        task.name = changes.name;
        task.description = changes.description;
        task.status = changes.status;
        task.order = changes.order;
        task.updated_at = now;
        let task = task.clone();
        workflow.updated_at = now;
        Ok(task)
    }

    async fn delete_task(&self, tx: &mut MemoryTx, id: &str, task_id: &str) -> Result<()> {
        let oid = ids::parse_id(id)?;
        let task_oid = ids::parse_id(task_id)?;

        let workflow =
            workflow_mut(&mut tx.guard, &oid).ok_or(WorkflowError::NotFound(Entity::Task))?;
        let before = workflow.tasks.len();
        workflow.tasks.retain(|task| task.id != task_oid);
        if workflow.tasks.len() == before {
            return Err(WorkflowError::NotFound(Entity::Task));
        }
        workflow.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    fn new_workflow(name: &str) -> NewWorkflow {
        NewWorkflow {
            name: name.to_string(),
            owner: "alice".to_string(),
        }
    }

    fn new_task(name: &str, order: u32) -> NewTask {
        NewTask {
            name: name.to_string(),
            description: None,
            status: TaskStatus::Pending,
            order,
        }
    }

    #[tokio::test]
    async fn commit_makes_transactional_writes_visible() {
        let store = MemoryWorkflowStore::new();
        let id = store.create(new_workflow("Launch")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.rename(&mut tx, &id, "Launch v2").await.unwrap();
        store.commit(tx).await.unwrap();

        assert_eq!(store.find_by_id(&id).await.unwrap().name, "Launch v2");
    }

    #[tokio::test]
    async fn abort_restores_the_pre_transaction_state() {
        let store = MemoryWorkflowStore::new();
        let id = store.create(new_workflow("Launch")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.rename(&mut tx, &id, "Launch v2").await.unwrap();
        store.append_task(&mut tx, &id, new_task("Design", 1)).await.unwrap();
        store.abort(tx).await.unwrap();

        let workflow = store.find_by_id(&id).await.unwrap();
        assert_eq!(workflow.name, "Launch");
        assert!(workflow.tasks.is_empty());
    }

    #[tokio::test]
    async fn deleting_an_absent_task_is_not_found() {
        let store = MemoryWorkflowStore::new();
        let id = store.create(new_workflow("Launch")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = store
            .delete_task(&mut tx, &id, &ObjectId::new().to_hex())
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::NotFound(Entity::Task));
        store.abort(tx).await.unwrap();
    }

    #[tokio::test]
    async fn workflow_delete_is_idempotent() {
        let store = MemoryWorkflowStore::new();
        let id = store.create(new_workflow("Launch")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.delete(&mut tx, &id).await.unwrap();
        store.delete(&mut tx, &id).await.unwrap();
        store.commit(tx).await.unwrap();

        assert_eq!(
            store.find_by_id(&id).await.unwrap_err(),
            WorkflowError::NotFound(Entity::Workflow)
        );
    }
}
