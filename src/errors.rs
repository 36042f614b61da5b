use thiserror::Error;

use crate::access::WorkflowAction;

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Workflow,
    Task,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Workflow => write!(f, "workflow"),
            Entity::Task => write!(f, "task"),
        }
    }
}

/// Typed failures of the mutation engine.
///
/// Store-level failures (`WriteFailure`, `ReadFailure`, `QueryFailure`,
/// `Inconsistency`) carry only a generic message; the full driver error is
/// logged at the point of detection and never crosses this boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// A supplied identifier does not parse to the store's identifier format.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The target entity does not exist, or a write matched zero documents.
    #[error("{0} does not exist")]
    NotFound(Entity),

    /// The principal may not perform the requested action on this workflow.
    #[error("not authorized to {0} this workflow")]
    Unauthorized(WorkflowAction),

    /// Transient write conflict; the transaction coordinator retries these.
    #[error("write conflict, operation was not applied")]
    Conflict,

    #[error("{0}")]
    WriteFailure(String),

    #[error("{0}")]
    ReadFailure(String),

    #[error("{0}")]
    QueryFailure(String),

    /// A write reported success but the post-write re-read did not find the
    /// expected state.
    #[error("storage inconsistency: {0}")]
    Inconsistency(String),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
