use thiserror::Error;

use crate::types::ObjectKind;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid object name: {0}")]
    InvalidName(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: ObjectKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: ObjectKind, name: String },

    #[error("downtime '{0}' has no trigger time but was reported in effect")]
    DowntimeNotTriggered(String),
}
