//! Workflow persistence.
//!
//! `WorkflowStore` is the seam between the mutation engine and the backing
//! document store. Two implementations exist: the MongoDB-backed store used
//! in production and an in-memory store with real commit/abort semantics for
//! tests.

pub mod ids;
pub mod memory;
pub mod mongo;

pub use memory::MemoryWorkflowStore;
pub use mongo::MongoWorkflowStore;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{NewTask, NewWorkflow, Task, TaskChanges, Workflow};

/// CRUD and query operations against the workflow collection, including
/// nested-array mutations of tasks.
///
/// Reads (`find_by_owner`, `find_by_id`, `list_tasks`, `find_task`) run
/// standalone and may observe any committed state. Methods taking a
/// `&mut Self::Tx` are scoped to a transaction obtained from `begin` and
/// take effect only on `commit`.
#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    /// Handle for an open session with an active transaction. Dropping it
    /// releases the session on every exit path.
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> Result<()>;
    async fn abort(&self, tx: Self::Tx) -> Result<()>;

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<Workflow>>;

    async fn find_by_id(&self, id: &str) -> Result<Workflow>;

    /// `find_by_id` against the transaction snapshot, so access checks and
    /// the subsequent write observe the same state.
    async fn find_by_id_in(&self, tx: &mut Self::Tx, id: &str) -> Result<Workflow>;

    /// Stamps timestamps, inserts, and returns the generated identifier.
    async fn create(&self, new: NewWorkflow) -> Result<String>;

    /// Field-level update restricted to the mutable field (`name`), plus the
    /// `updated_at` stamp. Returns the re-read entity.
    async fn rename(&self, tx: &mut Self::Tx, id: &str, name: &str) -> Result<Workflow>;

    /// Removes the document. Does not distinguish "already absent" from
    /// "removed".
    async fn delete(&self, tx: &mut Self::Tx, id: &str) -> Result<()>;

    /// Atomically re-homes the workflow to `new_owner`. Returns the re-read
    /// entity.
    async fn transfer(&self, tx: &mut Self::Tx, id: &str, new_owner: &str) -> Result<Workflow>;

    /// Tasks sorted ascending by `order`. A workflow that exists but has no
    /// tasks yields an empty vec; `NotFound` means the workflow is absent.
    async fn list_tasks(&self, id: &str) -> Result<Vec<Task>>;

    async fn find_task(&self, id: &str, task_id: &str) -> Result<Task>;

    /// Maximum `order` among the workflow's tasks; `None` when there are
    /// none.
    async fn max_task_order(&self, tx: &mut Self::Tx, id: &str) -> Result<Option<u32>>;

    /// Assigns a fresh task identifier and timestamps, appends, and returns
    /// the identifier recovered from a post-write re-read.
    async fn append_task(&self, tx: &mut Self::Tx, id: &str, task: NewTask) -> Result<String>;

    /// Positional update of one embedded task. Returns the re-read task.
    async fn update_task(
        &self,
        tx: &mut Self::Tx,
        id: &str,
        task_id: &str,
        changes: TaskChanges,
    ) -> Result<Task>;

    /// Pulls the task from the array. Removing an absent task is `NotFound`,
    /// not a silent success.
    async fn delete_task(&self, tx: &mut Self::Tx, id: &str, task_id: &str) -> Result<()>;
}
