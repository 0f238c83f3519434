//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid values patch: {message}")]
    PatchParse { message: String },

    #[error("unsupported patch operation '{op}': '{operation}'")]
    UnsupportedOp { op: String, operation: String },

    #[error("unacceptable patch operation path '{segment}' (only '{scope_key}' accepted): '{operation}'")]
    ScopeViolation {
        segment: String,
        scope_key: String,
        operation: String,
    },

    #[error("invalid patch path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("test operation failed at '{path}'")]
    TestFailed { path: String },

    #[error("expected a mapping at key '{key}'")]
    NotAMapping { key: String },

    #[error("Values merge error: {message}")]
    ValuesMerge { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
