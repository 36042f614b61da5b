//! Request payloads consumed by the mutation service.
//!
//! These arrive pre-validated (required fields, 3-100 char name lengths) from
//! the surrounding service; the engine does not re-validate them.

use serde::Deserialize;

use crate::models::TaskStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflow {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditWorkflow {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditTask {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub order: u32,
}
