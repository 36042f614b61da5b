//! Ownership- and role-based access decisions.
//!
//! The policy is pure: it looks only at the principal and a snapshot of the
//! workflow. The mutation service evaluates it against a snapshot read inside
//! the same transaction as the write, so a concurrent transfer cannot slip
//! between the check and the mutation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{Result, WorkflowError};
use crate::models::Workflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

/// The authenticated actor making a request. Authentication itself happens
/// upstream; the engine trusts what it is handed.
#[derive(Debug, Clone)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAction {
    Edit,
    Delete,
    Transfer,
}

impl std::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowAction::Edit => write!(f, "edit"),
            WorkflowAction::Delete => write!(f, "delete"),
            WorkflowAction::Transfer => write!(f, "transfer"),
        }
    }
}

pub struct AccessControlPolicy;

impl AccessControlPolicy {
    /// Decides whether `principal` may perform `action` on `workflow`.
    ///
    /// The owner may do anything. For everyone else: transfer and edit are
    /// denied, delete is allowed for admins only.
    #[must_use]
    pub fn can_perform(principal: &Principal, workflow: &Workflow, action: WorkflowAction) -> bool {
        if principal.username == workflow.owner {
            return true;
        }

        match action {
            WorkflowAction::Transfer => false,
            WorkflowAction::Delete => principal.role == Role::Admin,
            WorkflowAction::Edit => false,
        }
    }

    /// `can_perform` lifted into a `Result`, logging the denial.
    pub fn authorize(principal: &Principal, workflow: &Workflow, action: WorkflowAction) -> Result<()> {
        if Self::can_perform(principal, workflow, action) {
            Ok(())
        } else {
            warn!(
                username = %principal.username,
                workflow = %workflow.id,
                %action,
                "access denied"
            );
            Err(WorkflowError::Unauthorized(action))
        }
    }
}
