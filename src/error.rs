//! Errors for the fallible edges of the planner: loading snapshots and
//! configuration, and committing proposals to a store.
//!
//! Planning and validation themselves never fail; they report problems
//! inside their results.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot or configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("constraint {id} is invalid: {reason}")]
    InvalidConstraint { id: String, reason: String },

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("rake {rake_id} references unknown route {route_id}")]
    UnknownRoute { rake_id: String, route_id: String },

    #[error("commit rejected, rake {rake_id}: {reason}")]
    CommitConflict { rake_id: String, reason: String },
}
