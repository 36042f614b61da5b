use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task. The wire form matches the stored documents
/// ("In Progress" with a space).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

/// A child entity embedded in a workflow. Tasks have no independent
/// lifecycle; they are created, mutated and destroyed only through their
/// parent's mutation operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Position among siblings. Assigned monotonically on creation and never
    /// renumbered on delete, so values need not stay contiguous.
    pub order: u32,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// The parent aggregate: a named unit of work owned by a user, holding an
/// ordered collection of embedded tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Field set for inserting a workflow; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub name: String,
    pub owner: String,
}

/// Field set for appending a task; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub order: u32,
}

/// Mutable task fields applied by a positional update.
#[derive(Debug, Clone)]
pub struct TaskChanges {
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub order: u32,
}
