//! Error types for patch application

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("Invalid JSON pointer: {0}")]
    InvalidPointer(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Invalid array index in path: {0}")]
    InvalidIndex(String),

    #[error("Cannot apply patch at path: {0}")]
    InvalidTarget(String),

    #[error("Patch at {0} is missing its value")]
    MissingValue(String),
}
