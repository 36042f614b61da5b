// Flowdeck - transactional workflow/task mutation engine over a document store
// This exposes the core components for testing and integration

pub mod access;
pub mod config;
pub mod errors;
pub mod models;
pub mod ordering;
pub mod requests;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod transaction;

// Re-export key types for easy access
pub use access::{AccessControlPolicy, Principal, Role, WorkflowAction};
pub use config::FlowdeckConfig;
pub use errors::{Entity, WorkflowError};
pub use models::{Task, TaskStatus, Workflow};
pub use ordering::TaskOrderingPolicy;
pub use requests::{CreateTask, CreateWorkflow, EditTask, EditWorkflow};
pub use service::WorkflowMutationService;
pub use store::{MemoryWorkflowStore, MongoWorkflowStore, WorkflowStore};
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use transaction::{RetryPolicy, TransactionCoordinator};
