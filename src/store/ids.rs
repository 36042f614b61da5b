//! Conversion between external string identifiers and the store's id type.

use mongodb::bson::oid::ObjectId;
use tracing::debug;

use crate::errors::{Result, WorkflowError};

/// Parses an external identifier, failing fast on malformed input.
pub fn parse_id(raw: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|err| {
        debug!(raw, error = %err, "rejected malformed identifier");
        WorkflowError::InvalidIdentifier(raw.to_string())
    })
}
