//! MongoDB-backed implementation of [`WorkflowStore`].
//!
//! Driver errors are logged here in full and surfaced to callers as the
//! generic `WriteFailure`/`ReadFailure`/`QueryFailure` kinds. Errors the
//! server labels as transient map to `Conflict` so the transaction
//! coordinator can retry them.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::error::{
    Error as DriverError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT,
};
use mongodb::{Client, ClientSession, Collection};
use serde::Deserialize;
use tracing::{error, warn};

use super::{ids, WorkflowStore};
use crate::errors::{Entity, Result, WorkflowError};
use crate::models::{NewTask, NewWorkflow, Task, TaskChanges, Workflow};

const COLLECTION: &str = "workflows";

/// Upper bound on same-session commit re-attempts after an unknown commit
/// result.
const MAX_COMMIT_RETRIES: u32 = 3;

pub struct MongoWorkflowStore {
    client: Client,
    workflows: Collection<Workflow>,
}

impl MongoWorkflowStore {
    pub fn new(client: Client, database: &str) -> Self {
        let workflows = client.database(database).collection::<Workflow>(COLLECTION);
        Self { client, workflows }
    }

    fn documents(&self) -> Collection<Document> {
        self.workflows.clone_with_type()
    }
}

fn write_failure(err: DriverError, message: &str) -> WorkflowError {
    error!(error = %err, "{}", message);
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        WorkflowError::Conflict
    } else {
        WorkflowError::WriteFailure(message.to_string())
    }
}

fn read_failure(err: DriverError, message: &str) -> WorkflowError {
    error!(error = %err, "{}", message);
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        WorkflowError::Conflict
    } else {
        WorkflowError::ReadFailure(message.to_string())
    }
}

fn query_failure(err: DriverError, message: &str) -> WorkflowError {
    error!(error = %err, "{}", message);
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        WorkflowError::Conflict
    } else {
        WorkflowError::QueryFailure(message.to_string())
    }
}

/// Shape of the group-collect stage in the task listing pipeline.
#[derive(Deserialize)]
struct TaskRows {
    tasks: Vec<Task>,
}

#[async_trait]
impl WorkflowStore for MongoWorkflowStore {
    type Tx = ClientSession;

    async fn begin(&self) -> Result<ClientSession> {
        let mut session = self
            .client
            .start_session(None)
            .await
            .map_err(|err| write_failure(err, "failed to start a store session"))?;
        session
            .start_transaction(None)
            .await
            .map_err(|err| write_failure(err, "failed to start a transaction"))?;
        Ok(session)
    }

    async fn commit(&self, mut tx: ClientSession) -> Result<()> {
        // An unknown commit result means the commit may have already taken
        // effect server-side, so the unit of work must never be re-run for
        // it; the recovery is to re-issue the commit on the same session.
        // Only a transient transaction error surfaces as `Conflict` and
        // restarts the whole transaction.
        let mut attempts = 0;
        loop {
            match tx.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempts < MAX_COMMIT_RETRIES =>
                {
                    attempts += 1;
                    warn!(error = %err, attempts, "commit result unknown, retrying the commit");
                }
                Err(err) => {
                    error!(error = %err, "transaction commit failed");
                    return Err(if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) {
                        WorkflowError::WriteFailure(
                            "transaction commit outcome is unknown".to_string(),
                        )
                    } else if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
                        WorkflowError::Conflict
                    } else {
                        WorkflowError::WriteFailure("transaction commit failed".to_string())
                    });
                }
            }
        }
    }

    async fn abort(&self, mut tx: ClientSession) -> Result<()> {
        tx.abort_transaction()
            .await
            .map_err(|err| write_failure(err, "transaction abort failed"))
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<Workflow>> {
        let mut cursor = self
            .workflows
            .find(doc! { "owner": owner }, None)
            .await
            .map_err(|err| query_failure(err, "failed to retrieve workflows"))?;

        let mut workflows = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|err| query_failure(err, "failed to retrieve workflows"))?
        {
            workflows.push(
                cursor
                    .deserialize_current()
                    .map_err(|err| query_failure(err, "failed to decode workflows"))?,
            );
        }
        Ok(workflows)
    }

    async fn find_by_id(&self, id: &str) -> Result<Workflow> {
        let oid = ids::parse_id(id)?;
        self.workflows
            .find_one(doc! { "_id": oid }, None)
            .await
            .map_err(|err| read_failure(err, "failed to retrieve workflow"))?
            .ok_or(WorkflowError::NotFound(Entity::Workflow))
    }

    async fn find_by_id_in(&self, tx: &mut ClientSession, id: &str) -> Result<Workflow> {
        let oid = ids::parse_id(id)?;
        self.workflows
            .find_one_with_session(doc! { "_id": oid }, None, tx)
            .await
            .map_err(|err| read_failure(err, "failed to retrieve workflow"))?
            .ok_or(WorkflowError::NotFound(Entity::Workflow))
    }

    async fn create(&self, new: NewWorkflow) -> Result<String> {
        let now = DateTime::now();
        let document = doc! {
            "name": &new.name,
            "owner": &new.owner,
            "tasks": [],
            "created_at": now,
            "updated_at": now,
        };

        let inserted = self
            .documents()
            .insert_one(document, None)
            .await
            .map_err(|err| write_failure(err, "failed to create workflow"))?;

        match inserted.inserted_id.as_object_id() {
            Some(oid) => Ok(oid.to_hex()),
            None => {
                error!(inserted_id = %inserted.inserted_id, "inserted workflow id is not an ObjectId");
                Err(WorkflowError::WriteFailure(
                    "failed to recover the new workflow identifier".to_string(),
                ))
            }
        }
    }

    async fn rename(&self, tx: &mut ClientSession, id: &str, name: &str) -> Result<Workflow> {
        let oid = ids::parse_id(id)?;
        let filter = doc! { "_id": oid };
        let update = doc! { "$set": { "name": name, "updated_at": DateTime::now() } };

        let result = self
            .documents()
            .update_one_with_session(filter.clone(), update, None, tx)
            .await
            .map_err(|err| write_failure(err, "failed to update workflow"))?;
        if result.matched_count == 0 {
            return Err(WorkflowError::NotFound(Entity::Workflow));
        }

        self.workflows
            .find_one_with_session(filter, None, tx)
            .await
            .map_err(|err| read_failure(err, "failed to retrieve the updated workflow"))?
            .ok_or_else(|| {
                WorkflowError::ReadFailure("failed to retrieve the updated workflow".to_string())
            })
    }

    async fn delete(&self, tx: &mut ClientSession, id: &str) -> Result<()> {
        let oid = ids::parse_id(id)?;
        self.documents()
            .delete_one_with_session(doc! { "_id": oid }, None, tx)
            .await
            .map_err(|err| write_failure(err, "failed to delete workflow"))?;
        Ok(())
    }

    async fn transfer(&self, tx: &mut ClientSession, id: &str, new_owner: &str) -> Result<Workflow> {
        let oid = ids::parse_id(id)?;
        let filter = doc! { "_id": oid };
        let update = doc! { "$set": { "owner": new_owner, "updated_at": DateTime::now() } };

        let result = self
            .documents()
            .update_one_with_session(filter.clone(), update, None, tx)
            .await
            .map_err(|err| write_failure(err, "failed to transfer workflow"))?;
        if result.matched_count == 0 {
            return Err(WorkflowError::NotFound(Entity::Workflow));
        }

        self.workflows
            .find_one_with_session(filter, None, tx)
            .await
            .map_err(|err| read_failure(err, "failed to retrieve the updated workflow"))?
            .ok_or_else(|| {
                WorkflowError::ReadFailure("failed to retrieve the updated workflow".to_string())
            })
    }

    async fn list_tasks(&self, id: &str) -> Result<Vec<Task>> {
        let oid = ids::parse_id(id)?;
        let pipeline = vec![
            doc! { "$match": { "_id": oid } },
            doc! { "$unwind": { "path": "$tasks", "preserveNullAndEmptyArrays": false } },
            doc! { "$sort": { "tasks.order": 1 } },
            doc! { "$group": { "_id": "$_id", "tasks": { "$push": "$tasks" } } },
        ];

        let mut cursor = self
            .workflows
            .aggregate(pipeline, None)
            .await
            .map_err(|err| query_failure(err, "failed to aggregate tasks"))?;

        let mut rows: Vec<Document> = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|err| query_failure(err, "failed to aggregate tasks"))?
        {
            rows.push(
                cursor
                    .deserialize_current()
                    .map_err(|err| query_failure(err, "failed to decode tasks"))?,
            );
        }

        // The unwind drops workflows with an empty task array, so an empty
        // result is ambiguous: distinguish "no tasks" from "no workflow".
        let Some(row) = rows.into_iter().next() else {
            return match self
                .workflows
                .find_one(doc! { "_id": oid }, None)
                .await
                .map_err(|err| read_failure(err, "failed to retrieve workflow"))?
            {
                Some(_) => Ok(Vec::new()),
                None => Err(WorkflowError::NotFound(Entity::Workflow)),
            };
        };

        let collected: TaskRows = mongodb::bson::from_document(row).map_err(|err| {
            error!(error = %err, "failed to decode aggregated tasks");
            WorkflowError::QueryFailure("failed to decode tasks".to_string())
        })?;
        Ok(collected.tasks)
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

    async fn max_task_order(&self, tx: &mut ClientSession, id: &str) -> Result<Option<u32>> {
        let oid = ids::parse_id(id)?;
        let pipeline = vec![
            doc! { "$match": { "_id": oid } },
            doc! { "$unwind": { "path": "$tasks", "preserveNullAndEmptyArrays": false } },
            doc! { "$group": { "_id": "$_id", "maxOrder": { "$max": "$tasks.order" } } },
        ];

        let mut cursor = self
            .documents()
            .aggregate_with_session(pipeline, None, tx)
            .await
            .map_err(|err| query_failure(err, "failed to aggregate the maximum task order"))?;

        let mut rows: Vec<Document> = Vec::new();
        while cursor
            .advance(tx)
            .await
            .map_err(|err| query_failure(err, "failed to aggregate the maximum task order"))?
        {
            rows.push(
                cursor
                    .deserialize_current()
                    .map_err(|err| query_failure(err, "failed to decode the maximum task order"))?,
            );
        }

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        match row.get("maxOrder") {
            Some(Bson::Int32(max)) => Ok(Some(*max as u32)),
            Some(Bson::Int64(max)) => Ok(Some(*max as u32)),
            other => {
                error!(?other, "unexpected maximum task order shape");
                Err(WorkflowError::QueryFailure(
                    "failed to decode the maximum task order".to_string(),
                ))
            }
        }
    }

    async fn append_task(&self, tx: &mut ClientSession, id: &str, task: NewTask) -> Result<String> {
        let oid = ids::parse_id(id)?;
        let now = chrono::Utc::now();
        let task = Task {
            id: ObjectId::new(),
            name: task.name,
            description: task.description,
            status: task.status,
            order: task.order,
            created_at: now,
            updated_at: now,
        };
        let task_bson = mongodb::bson::to_bson(&task).map_err(|err| {
            error!(error = %err, "failed to encode task");
            WorkflowError::WriteFailure("failed to create task".to_string())
        })?;

        let filter = doc! { "_id": oid };
        let update = doc! {
            "$push": { "tasks": task_bson },
            "$set": { "updated_at": DateTime::now() },
        };
        let result = self
            .documents()
            .update_one_with_session(filter.clone(), update, None, tx)
            .await
            .map_err(|err| write_failure(err, "failed to create task"))?;
        if result.matched_count == 0 {
            return Err(WorkflowError::NotFound(Entity::Workflow));
        }

        let updated = self
            .workflows
            .find_one_with_session(filter, None, tx)
            .await
            .map_err(|err| read_failure(err, "failed to retrieve the updated workflow"))?
            .ok_or_else(|| {
                WorkflowError::ReadFailure("failed to retrieve the updated workflow".to_string())
            })?;

        match updated.tasks.last() {
            Some(last) => Ok(last.id.to_hex()),
            None => {
                error!(workflow = id, "task push reported success but the re-read shows no tasks");
                Err(WorkflowError::Inconsistency(
                    "appended task is missing on re-read".to_string(),
                ))
            }
        }
    }

    async fn update_task(
        &self,
        tx: &mut ClientSession,
        id: &str,
        task_id: &str,
        changes: TaskChanges,
    ) -> Result<Task> {
        let oid = ids::parse_id(id)?;
        let task_oid = ids::parse_id(task_id)?;

        let description = match &changes.description {
            Some(description) => Bson::String(description.clone()),
            None => Bson::Null,
        };
        let status = mongodb::bson::to_bson(&changes.status).map_err(|err| {
            error!(error = %err, "failed to encode task status");
            WorkflowError::WriteFailure("failed to update task".to_string())
        })?;

        let filter = doc! { "_id": oid, "tasks._id": task_oid };
        let update = doc! { "$set": {
            "tasks.$.name": &changes.name,
            "tasks.$.description": description,
            "tasks.$.status": status,
            "tasks.$.order": changes.order,
            "tasks.$.updated_at": DateTime::now(),
            "updated_at": DateTime::now(),
        } };

        let result = self
            .documents()
            .update_one_with_session(filter.clone(), update, None, tx)
            .await
            .map_err(|err| write_failure(err, "failed to update task"))?;
        if result.matched_count == 0 {
            return Err(WorkflowError::NotFound(Entity::Task));
        }

        let updated = self
            .workflows
            .find_one_with_session(filter, None, tx)
            .await
            .map_err(|err| read_failure(err, "failed to retrieve the updated workflow"))?
            .ok_or_else(|| {
                WorkflowError::ReadFailure("failed to retrieve the updated workflow".to_string())
            })?;

        updated
            .tasks
            .into_iter()
            .find(|task| task.id == task_oid)
            .ok_or_else(|| {
                error!(workflow = id, task = task_id, "updated task is missing on re-read");
                WorkflowError::Inconsistency("updated task is missing on re-read".to_string())
            })
    }

    async fn delete_task(&self, tx: &mut ClientSession, id: &str, task_id: &str) -> Result<()> {
        let oid = ids::parse_id(id)?;
        let task_oid = ids::parse_id(task_id)?;

        // Matching the nested task id too makes a no-op pull report NotFound
        // instead of silent success.
        let filter = doc! { "_id": oid, "tasks._id": task_oid };
        let update = doc! {
            "$pull": { "tasks": { "_id": task_oid } },
            "$set": { "updated_at": DateTime::now() },
        };

        let result = self
            .documents()
            .update_one_with_session(filter, update, None, tx)
            .await
            .map_err(|err| write_failure(err, "failed to delete task"))?;
        if result.matched_count == 0 {
            return Err(WorkflowError::NotFound(Entity::Task));
        }
        Ok(())
    }
}
